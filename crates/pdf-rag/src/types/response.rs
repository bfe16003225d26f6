//! Result types returned by ingest, query and stats

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::document::{Chunk, ChunkId};

/// Pointer into a chunk; never a copy of its text
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Citation {
    pub doc_id: String,
    pub page: u32,
    pub chunk_id: ChunkId,
    pub char_start: usize,
    pub char_end: usize,
}

impl Citation {
    pub fn from_chunk(chunk: &Chunk) -> Self {
        Self {
            doc_id: chunk.doc_id.clone(),
            page: chunk.page,
            chunk_id: chunk.chunk_id,
            char_start: chunk.char_start,
            char_end: chunk.char_end,
        }
    }

    /// Inline marker form used in prompts and answers
    pub fn format_inline(&self) -> String {
        format!("[Doc: p. {}]", self.page)
    }
}

/// Supporting excerpt shown next to an answer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snippet {
    pub page: u32,
    pub chunk_id: ChunkId,
    pub text: String,
    /// Rerank (or degraded fallback) score of the passage
    pub score: f32,
}

/// Stage timings for one query, in milliseconds
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryTimings {
    pub embed_ms: u64,
    pub retrieval_ms: u64,
    pub rerank_ms: u64,
    pub generation_ms: u64,
    pub total_ms: u64,
}

/// Answer to one question against one document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub snippets: Vec<Snippet>,
    /// True only when the answer is backed by at least one resolved citation
    pub found: bool,
    /// Advisory, derived from the top rerank score, in [0,1]
    pub confidence: f32,
    pub timings: QueryTimings,
    /// Index generation the query ran against
    pub generation: u64,
    /// Reranker was unavailable and fused order was used
    pub rerank_degraded: bool,
}

/// Outcome of a successful ingestion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    pub doc_id: String,
    pub pages_count: u32,
    pub chunks_count: u32,
    /// Wall-clock processing time in seconds
    pub processing_time: f64,
    pub generation: u64,
}

/// On-disk sizes of a document's artifacts, in bytes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtifactSizes {
    pub source_bytes: u64,
    pub vector_index_bytes: u64,
    pub keyword_db_bytes: u64,
    pub metadata_bytes: u64,
}

/// Observability counters for one document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentStats {
    pub doc_id: String,
    pub pages_count: u32,
    pub empty_pages: u32,
    pub chunks_count: u32,
    pub vectors_count: u32,
    pub keyword_rows: u32,
    pub generation: u64,
    pub created_at: DateTime<Utc>,
    pub last_ingested: DateTime<Utc>,
    pub sizes: ArtifactSizes,
}

/// Reachability of the model services
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub embedder: bool,
    pub llm: bool,
    /// None when no reranker is configured
    pub reranker: Option<bool>,
}
