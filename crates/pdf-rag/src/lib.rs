//! pdf-rag: grounded question answering over large PDFs
//!
//! Documents are parsed page by page, split into token-bounded chunks and
//! indexed twice: a dense vector index and an SQLite FTS5 keyword index. A query
//! runs both searches against one immutable index generation, fuses the
//! rankings with Reciprocal Rank Fusion, reranks the candidates with a
//! cross-encoder and asks a generation model for an answer that cites pages as
//! `[Doc: p. N]`. Answers without a resolvable citation, or retrieved with too
//! little confidence, come back as not found.
//!
//! ```no_run
//! use pdf_rag::{RagConfig, RagEngine};
//!
//! # async fn run() -> pdf_rag::Result<()> {
//! let engine = RagEngine::from_config(RagConfig::load(None)?)?;
//! let bytes = std::fs::read("report.pdf")?;
//! engine.ingest("report", &bytes).await?;
//! let result = engine.query("report", "What happened to revenue?", None).await?;
//! println!("{} (found: {})", result.answer, result.found);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod generation;
pub mod index;
pub mod ingestion;
pub mod providers;
pub mod retrieval;
pub mod types;
pub mod util;

pub use config::RagConfig;
pub use engine::{RagEngine, RagEngineBuilder};
pub use error::{Error, Result, Stage};
pub use types::{
    document::{Chunk, ChunkId, DocumentRecord, Page},
    response::{Citation, DocumentStats, HealthReport, IngestReport, QueryResult, Snippet},
};
