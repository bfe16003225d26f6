//! Per-document index registry with generation swapping
//!
//! Each successful ingestion writes a complete generation directory
//!
//! ```text
//! <documents>/<doc_id>/CURRENT            -> "gen-000003"
//! <documents>/<doc_id>/gen-000003/source.pdf
//!                                 vectors.bin
//!                                 keyword.db
//!                                 metadata.json
//! ```
//!
//! and publishes it by rewriting `CURRENT`. Readers hold an
//! `Arc<IndexGeneration>`, so a query keeps the generation it started with even
//! if a newer one is swapped in. Retired generations remove their directory when
//! the last reader lets go.

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use super::keyword::KeywordIndex;
use super::vector::VectorIndex;
use crate::error::{Error, Result};
use crate::ingestion::ParsedDocument;
use crate::types::{ArtifactSizes, Chunk, ChunkId, DocumentRecord, DocumentStats, Page};

const POINTER_FILE: &str = "CURRENT";
const SOURCE_FILE: &str = "source.pdf";
const VECTORS_FILE: &str = "vectors.bin";
const KEYWORD_FILE: &str = "keyword.db";
const METADATA_FILE: &str = "metadata.json";
const GENERATION_PREFIX: &str = "gen-";
const STAGING_PREFIX: &str = "staging-";

/// Reject anything that is not `[A-Za-z0-9_-]+`; doc ids become directory names
pub fn validate_doc_id(doc_id: &str) -> Result<()> {
    let valid = !doc_id.is_empty()
        && doc_id.len() <= 128
        && doc_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidRequest(format!(
            "doc_id '{}' must match [A-Za-z0-9_-]+",
            doc_id
        )))
    }
}

/// Everything an ingestion produced, ready to be indexed
pub struct BuildInput {
    pub doc_id: String,
    pub source: Arc<[u8]>,
    pub parsed: ParsedDocument,
    pub chunks: Vec<Chunk>,
    pub embeddings: Vec<Vec<f32>>,
    pub dimensions: usize,
}

#[derive(Serialize)]
struct MetadataRef<'a> {
    record: &'a DocumentRecord,
    pages: &'a [Page],
    chunks: &'a [Chunk],
}

#[derive(Deserialize)]
struct MetadataSnapshot {
    record: DocumentRecord,
    pages: Vec<Page>,
    chunks: Vec<Chunk>,
}

/// Directory of one generation; removed on drop once retired
struct GenerationDir {
    path: PathBuf,
    retired: AtomicBool,
}

impl Drop for GenerationDir {
    fn drop(&mut self) {
        if self.retired.load(Ordering::Acquire) {
            match std::fs::remove_dir_all(&self.path) {
                Ok(()) => {
                    tracing::debug!(path = %self.path.display(), "retired generation removed")
                }
                Err(e) => tracing::warn!(
                    path = %self.path.display(),
                    "failed to remove retired generation: {}",
                    e
                ),
            }
        }
    }
}

/// Immutable snapshot of a document's vector index, keyword index and chunk table
pub struct IndexGeneration {
    record: DocumentRecord,
    pages: Vec<Page>,
    chunks: Vec<Chunk>,
    vectors: VectorIndex,
    keyword: KeywordIndex,
    sizes: ArtifactSizes,
    // Declared last so the SQLite handle closes before the directory goes
    dir: GenerationDir,
}

impl IndexGeneration {
    pub fn doc_id(&self) -> &str {
        &self.record.doc_id
    }

    pub fn generation(&self) -> u64 {
        self.record.generation
    }

    pub fn record(&self) -> &DocumentRecord {
        &self.record
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn chunk(&self, chunk_id: ChunkId) -> Option<&Chunk> {
        self.chunks
            .binary_search_by_key(&chunk_id, |c| c.chunk_id)
            .ok()
            .map(|i| &self.chunks[i])
    }

    pub fn vectors(&self) -> &VectorIndex {
        &self.vectors
    }

    pub fn keyword(&self) -> &KeywordIndex {
        &self.keyword
    }

    pub fn sizes(&self) -> &ArtifactSizes {
        &self.sizes
    }

    pub fn path(&self) -> &Path {
        &self.dir.path
    }

    fn retire(&self) {
        self.dir.retired.store(true, Ordering::Release);
    }

    fn open(dir: PathBuf) -> Result<Self> {
        let metadata_bytes = std::fs::read(dir.join(METADATA_FILE))?;
        let snapshot: MetadataSnapshot = serde_json::from_slice(&metadata_bytes)?;
        let vectors = VectorIndex::load(&dir.join(VECTORS_FILE))?;
        let keyword = KeywordIndex::open(&dir.join(KEYWORD_FILE))?;

        let doc_id = snapshot.record.doc_id.clone();
        if vectors.len() != snapshot.chunks.len() {
            return Err(Error::index(
                doc_id,
                format!(
                    "{} vectors for {} chunks in {}",
                    vectors.len(),
                    snapshot.chunks.len(),
                    dir.display()
                ),
            ));
        }

        Ok(Self {
            record: snapshot.record,
            pages: snapshot.pages,
            chunks: snapshot.chunks,
            vectors,
            keyword,
            sizes: artifact_sizes(&dir),
            dir: GenerationDir {
                path: dir,
                retired: AtomicBool::new(false),
            },
        })
    }
}

#[derive(Default)]
struct DocSlot {
    current: RwLock<Option<Arc<IndexGeneration>>>,
    ingesting: AtomicBool,
}

type Slots = Arc<DashMap<String, Arc<DocSlot>>>;

/// Proof of exclusive write access to one doc_id; released on drop
pub struct IngestPermit {
    doc_id: String,
    slot: Arc<DocSlot>,
    slots: Slots,
}

impl IngestPermit {
    pub fn doc_id(&self) -> &str {
        &self.doc_id
    }
}

impl Drop for IngestPermit {
    fn drop(&mut self) {
        self.slot.ingesting.store(false, Ordering::Release);
        // A doc_id with nothing published keeps no registry entry
        self.slots.remove_if(&self.doc_id, |_, slot| {
            Arc::ptr_eq(slot, &self.slot)
                && !slot.ingesting.load(Ordering::Acquire)
                && slot.current.read().is_none()
        });
    }
}

/// Owns the index generations of every document
pub struct IndexManager {
    root: PathBuf,
    slots: Slots,
}

impl IndexManager {
    /// Create a manager rooted at the documents directory
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            slots: Arc::new(DashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn slot(&self, doc_id: &str) -> Arc<DocSlot> {
        self.slots.entry(doc_id.to_string()).or_default().clone()
    }

    fn doc_dir(&self, doc_id: &str) -> PathBuf {
        self.root.join(doc_id)
    }

    /// Claim the single writer slot for `doc_id`
    pub fn begin_ingest(&self, doc_id: &str) -> Result<IngestPermit> {
        validate_doc_id(doc_id)?;
        // Claimed under the entry lock so a dropping permit cannot unregister the slot in between
        let entry = self.slots.entry(doc_id.to_string()).or_default();
        if entry
            .ingesting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::DocumentBusy(doc_id.to_string()));
        }
        let slot = entry.clone();
        drop(entry);
        Ok(IngestPermit {
            doc_id: doc_id.to_string(),
            slot,
            slots: self.slots.clone(),
        })
    }

    /// Build a fresh generation and swap it in
    ///
    /// Blocking: writes every artifact to disk. Nothing becomes visible to
    /// readers until all artifacts are written and the pointer is updated.
    pub fn build(&self, permit: &IngestPermit, input: BuildInput) -> Result<Arc<IndexGeneration>> {
        if permit.doc_id != input.doc_id {
            return Err(Error::internal(format!(
                "permit for '{}' used to build '{}'",
                permit.doc_id, input.doc_id
            )));
        }
        let doc_id = input.doc_id.clone();
        let doc_dir = self.doc_dir(&doc_id);
        std::fs::create_dir_all(&doc_dir)?;

        // Missing or unreadable predecessors only lose created_at
        let previous = match self.load(&doc_id) {
            Ok(generation) => Some(generation),
            Err(Error::DocumentNotFound(_)) => None,
            Err(e) => {
                tracing::warn!(doc_id = %doc_id, "previous generation unreadable: {}", e);
                None
            }
        };
        let generation = next_generation_number(&doc_dir)?;

        let now = Utc::now();
        let record = DocumentRecord {
            doc_id: doc_id.clone(),
            page_count: input.parsed.pages.len() as u32,
            chunk_count: input.chunks.len() as u32,
            file_size: input.source.len() as u64,
            content_hash: input.parsed.content_hash.clone(),
            title: input.parsed.title.clone(),
            author: input.parsed.author.clone(),
            created_at: previous.as_ref().map_or(now, |p| p.record.created_at),
            last_ingested: now,
            generation,
        };

        let staging = doc_dir.join(format!("{}{}", STAGING_PREFIX, Uuid::new_v4()));
        std::fs::create_dir(&staging)?;

        let written = write_artifacts(&staging, &record, &input).map_err(|e| {
            let _ = std::fs::remove_dir_all(&staging);
            Error::index(&doc_id, format!("failed to write artifacts: {}", e))
        })?;
        let (vectors, keyword) = written;
        // The build connection must close before the directory is renamed
        drop(keyword);

        let final_dir = doc_dir.join(generation_dir_name(generation));
        if let Err(e) = std::fs::rename(&staging, &final_dir) {
            let _ = std::fs::remove_dir_all(&staging);
            return Err(Error::index(&doc_id, format!("failed to publish generation: {}", e)));
        }

        let keyword = KeywordIndex::open(&final_dir.join(KEYWORD_FILE))?;

        // Readers that would open from disk wait on this lock until the swap is
        // done, so none of them can cache the generation being published
        let mut current = permit.slot.current.write();
        write_pointer(&doc_dir, generation)?;

        let built = Arc::new(IndexGeneration {
            record,
            pages: input.parsed.pages,
            chunks: input.chunks,
            vectors,
            keyword,
            sizes: artifact_sizes(&final_dir),
            dir: GenerationDir {
                path: final_dir,
                retired: AtomicBool::new(false),
            },
        });

        let replaced = current.replace(built.clone());
        drop(current);
        if let Some(old) = replaced {
            if old.path() != built.path() {
                old.retire();
            }
        }
        drop(previous);

        tracing::info!(
            doc_id = %doc_id,
            generation,
            chunks = built.chunks.len(),
            "index generation swapped in"
        );
        Ok(built)
    }

    /// Current generation for `doc_id`, opening it from disk on first use
    pub fn load(&self, doc_id: &str) -> Result<Arc<IndexGeneration>> {
        validate_doc_id(doc_id)?;
        let slot = match self.slots.get(doc_id) {
            Some(slot) => slot.clone(),
            None => {
                if !self.doc_dir(doc_id).join(POINTER_FILE).exists() {
                    return Err(Error::DocumentNotFound(doc_id.to_string()));
                }
                self.slot(doc_id)
            }
        };

        if let Some(current) = slot.current.read().as_ref() {
            return Ok(current.clone());
        }

        let mut guard = slot.current.write();
        if let Some(current) = guard.as_ref() {
            return Ok(current.clone());
        }

        let doc_dir = self.doc_dir(doc_id);
        let Some(name) = read_pointer(&doc_dir)? else {
            return Err(Error::DocumentNotFound(doc_id.to_string()));
        };

        let generation = IndexGeneration::open(doc_dir.join(&name))
            .map_err(|e| Error::index(doc_id, format!("failed to open {}: {}", name, e)))?;
        // Nothing else from this doc_id is in memory yet, so leftovers are safe to sweep
        sweep_stale(&doc_dir, &name);

        tracing::debug!(
            doc_id,
            generation = generation.generation(),
            "generation loaded from disk"
        );
        let generation = Arc::new(generation);
        *guard = Some(generation.clone());
        Ok(generation)
    }

    /// Counts and artifact sizes for `doc_id`
    pub fn stats(&self, doc_id: &str) -> Result<DocumentStats> {
        let generation = self.load(doc_id)?;
        let record = generation.record();
        Ok(DocumentStats {
            doc_id: record.doc_id.clone(),
            pages_count: record.page_count,
            empty_pages: generation.pages.iter().filter(|p| p.is_empty()).count() as u32,
            chunks_count: record.chunk_count,
            vectors_count: generation.vectors.len() as u32,
            keyword_rows: generation.keyword.row_count()?,
            generation: record.generation,
            created_at: record.created_at,
            last_ingested: record.last_ingested,
            sizes: generation.sizes.clone(),
        })
    }

    /// Records of every ingested document, sorted by doc_id
    pub fn list(&self) -> Result<Vec<DocumentRecord>> {
        let mut records = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Some(doc_id) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if validate_doc_id(&doc_id).is_err() {
                continue;
            }
            match self.load(&doc_id) {
                Ok(generation) => records.push(generation.record().clone()),
                Err(Error::DocumentNotFound(_)) => {}
                Err(e) => tracing::warn!(doc_id = %doc_id, "skipping unreadable document: {}", e),
            }
        }
        records.sort_by(|a, b| a.doc_id.cmp(&b.doc_id));
        Ok(records)
    }

    /// Remove a document; in-flight readers finish against their snapshot
    pub fn delete(&self, doc_id: &str) -> Result<()> {
        let permit = self.begin_ingest(doc_id)?;
        let current = self.load(doc_id)?;

        let doc_dir = self.doc_dir(doc_id);
        match std::fs::remove_file(doc_dir.join(POINTER_FILE)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        permit.slot.current.write().take();
        current.retire();
        drop(current);
        sweep_stale(&doc_dir, "");
        // Only succeeds once no reader holds a retired generation
        let _ = std::fs::remove_dir(&doc_dir);

        tracing::info!(doc_id, "document deleted");
        Ok(())
    }
}

fn write_artifacts(
    dir: &Path,
    record: &DocumentRecord,
    input: &BuildInput,
) -> Result<(VectorIndex, KeywordIndex)> {
    std::fs::write(dir.join(SOURCE_FILE), &input.source)?;

    let ids: Vec<ChunkId> = input.chunks.iter().map(|c| c.chunk_id).collect();
    let vectors = VectorIndex::build(input.dimensions, &ids, &input.embeddings)?;
    vectors.save(&dir.join(VECTORS_FILE))?;

    let keyword = KeywordIndex::build(&dir.join(KEYWORD_FILE), &input.chunks)?;

    let metadata = MetadataRef {
        record,
        pages: &input.parsed.pages,
        chunks: &input.chunks,
    };
    std::fs::write(dir.join(METADATA_FILE), serde_json::to_vec(&metadata)?)?;

    Ok((vectors, keyword))
}

fn generation_dir_name(generation: u64) -> String {
    format!("{}{:06}", GENERATION_PREFIX, generation)
}

fn parse_generation(name: &str) -> Option<u64> {
    name.strip_prefix(GENERATION_PREFIX)?.parse().ok()
}

/// One past the highest generation on disk, so a retired directory still in
/// use is never reused
fn next_generation_number(doc_dir: &Path) -> Result<u64> {
    let mut highest = 0;
    for entry in std::fs::read_dir(doc_dir)? {
        let entry = entry?;
        if let Some(n) = entry.file_name().to_str().and_then(parse_generation) {
            highest = highest.max(n);
        }
    }
    Ok(highest + 1)
}

fn read_pointer(doc_dir: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(doc_dir.join(POINTER_FILE)) {
        Ok(name) => {
            let name = name.trim().to_string();
            if parse_generation(&name).is_none() {
                return Err(Error::internal(format!(
                    "corrupt pointer in {}: '{}'",
                    doc_dir.display(),
                    name
                )));
            }
            Ok(Some(name))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Replace the pointer with a rename so readers never see a partial write
fn write_pointer(doc_dir: &Path, generation: u64) -> Result<()> {
    let tmp = doc_dir.join(format!("{}.tmp", POINTER_FILE));
    std::fs::write(&tmp, generation_dir_name(generation))?;
    std::fs::rename(&tmp, doc_dir.join(POINTER_FILE))?;
    Ok(())
}

/// Remove staging leftovers and generations other than `keep`
fn sweep_stale(doc_dir: &Path, keep: &str) {
    let Ok(entries) = std::fs::read_dir(doc_dir) else {
        return;
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let stale = name.starts_with(STAGING_PREFIX)
            || (parse_generation(name).is_some() && name != keep);
        if stale {
            if let Err(e) = std::fs::remove_dir_all(entry.path()) {
                tracing::warn!(path = %entry.path().display(), "failed to sweep: {}", e);
            }
        }
    }
}

fn artifact_sizes(dir: &Path) -> ArtifactSizes {
    let size = |name: &str| std::fs::metadata(dir.join(name)).map(|m| m.len()).unwrap_or(0);
    ArtifactSizes {
        source_bytes: size(SOURCE_FILE),
        vector_index_bytes: size(VECTORS_FILE),
        keyword_db_bytes: size(KEYWORD_FILE),
        metadata_bytes: size(METADATA_FILE),
    }
}
