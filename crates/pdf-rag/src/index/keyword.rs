//! SQLite FTS5 keyword index for one document generation

use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags};
use std::path::{Path, PathBuf};
use unicode_segmentation::UnicodeSegmentation;

use crate::error::{Error, Result};
use crate::types::{Chunk, ChunkId};

/// Lexical hit; lower bm25 is better, `score` is the negated bm25 value
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordHit {
    pub chunk_id: ChunkId,
    pub score: f64,
}

/// Read connections kept open between searches
const MAX_IDLE_CONNECTIONS: usize = 4;

/// Ranked lexical search over a document's chunks
///
/// Searches check out their own read-only connection, so concurrent queries on
/// one document only contend for the pool bookkeeping.
pub struct KeywordIndex {
    path: PathBuf,
    idle: Mutex<Vec<Connection>>,
}

impl KeywordIndex {
    /// Create a fresh database at `path` holding every chunk
    pub fn build(path: &Path, chunks: &[Chunk]) -> Result<Self> {
        let mut conn = Connection::open(path)?;

        conn.execute_batch(
            r#"
            PRAGMA journal_mode=DELETE;
            PRAGMA synchronous=NORMAL;

            CREATE TABLE chunks (
                chunk_id INTEGER PRIMARY KEY,
                page INTEGER NOT NULL,
                text TEXT NOT NULL
            );

            CREATE VIRTUAL TABLE chunks_fts USING fts5(
                text,
                content='chunks',
                content_rowid='chunk_id',
                tokenize='unicode61 remove_diacritics 2'
            );

            CREATE TRIGGER chunks_ai AFTER INSERT ON chunks BEGIN
                INSERT INTO chunks_fts(rowid, text) VALUES (NEW.chunk_id, NEW.text);
            END;
            "#,
        )?;

        {
            let tx = conn.transaction()?;
            {
                let mut stmt =
                    tx.prepare("INSERT INTO chunks (chunk_id, page, text) VALUES (?1, ?2, ?3)")?;
                for chunk in chunks {
                    stmt.execute(params![chunk.chunk_id as i64, chunk.page as i64, chunk.text])?;
                }
            }
            tx.commit()?;
        }

        tracing::debug!(path = %path.display(), rows = chunks.len(), "keyword index built");

        Ok(Self {
            path: path.to_path_buf(),
            idle: Mutex::new(vec![conn]),
        })
    }

    /// Open an existing database read-only
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::internal(format!(
                "keyword database missing: {}",
                path.display()
            )));
        }
        let conn = open_read_only(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            idle: Mutex::new(vec![conn]),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn checkout(&self) -> Result<Connection> {
        let pooled = self.idle.lock().pop();
        match pooled {
            Some(conn) => Ok(conn),
            None => open_read_only(&self.path),
        }
    }

    fn checkin(&self, conn: Connection) {
        let mut idle = self.idle.lock();
        if idle.len() < MAX_IDLE_CONNECTIONS {
            idle.push(conn);
        }
    }

    /// Number of indexed rows
    pub fn row_count(&self) -> Result<u32> {
        let conn = self.checkout()?;
        let count = conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get::<_, i64>(0));
        self.checkin(conn);
        Ok(count? as u32)
    }

    /// Top-k chunks by bm25; ties go to the lower chunk id
    pub fn search(&self, question: &str, k: usize) -> Result<Vec<KeywordHit>> {
        let Some(query) = fts_query(question) else {
            return Ok(Vec::new());
        };
        if k == 0 {
            return Ok(Vec::new());
        }

        let conn = self.checkout()?;
        let hits = run_search(&conn, &query, k);
        self.checkin(conn);
        hits
    }
}

fn open_read_only(path: &Path) -> Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    Ok(conn)
}

fn run_search(conn: &Connection, query: &str, k: usize) -> Result<Vec<KeywordHit>> {
    let mut stmt = conn.prepare_cached(
        r#"
        SELECT rowid, bm25(chunks_fts) AS score
        FROM chunks_fts
        WHERE chunks_fts MATCH ?1
        ORDER BY score ASC, rowid ASC
        LIMIT ?2
        "#,
    )?;

    let hits = stmt
        .query_map(params![query, k as i64], |row| {
            let chunk_id: i64 = row.get(0)?;
            let score: f64 = row.get(1)?;
            Ok(KeywordHit {
                chunk_id: chunk_id as ChunkId,
                score: -score,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(hits)
}

/// Turn free text into an FTS5 OR-query of quoted terms
///
/// Quoting every term keeps operators and punctuation in the question from
/// being parsed as FTS5 syntax. Returns `None` when nothing searchable remains.
pub fn fts_query(question: &str) -> Option<String> {
    let mut terms: Vec<String> = Vec::new();
    for word in question.unicode_words() {
        let term = word.to_lowercase().replace('"', "\"\"");
        if !terms.contains(&term) {
            terms.push(term);
        }
    }

    if terms.is_empty() {
        return None;
    }
    Some(
        terms
            .iter()
            .map(|t| format!("\"{}\"", t))
            .collect::<Vec<_>>()
            .join(" OR "),
    )
}
