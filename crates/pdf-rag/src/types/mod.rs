//! Core types for the question-answering pipeline

pub mod document;
pub mod response;

pub use document::{Chunk, ChunkId, DocumentRecord, Page, PageQuality};
pub use response::{
    ArtifactSizes, Citation, DocumentStats, HealthReport, IngestReport, QueryResult,
    QueryTimings, Snippet,
};
