//! Error types for the PDF question-answering core

use std::time::Duration;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline stage an error or timeout is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Parse,
    Chunk,
    Embed,
    Index,
    Retrieve,
    Rerank,
    Generate,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Parse => "parse",
            Stage::Chunk => "chunk",
            Stage::Embed => "embed",
            Stage::Index => "index",
            Stage::Retrieve => "retrieve",
            Stage::Rerank => "rerank",
            Stage::Generate => "generate",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by ingestion, query and stats
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Caller supplied an invalid doc_id, question, k or upload
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The uploaded file could not be read as a PDF
    #[error("Failed to parse document '{doc_id}': {message}")]
    Parse { doc_id: String, message: String },

    /// No successful ingestion exists for the doc_id
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    /// Another ingestion for the doc_id is in flight
    #[error("Document is busy: ingestion already running for '{0}'")]
    DocumentBusy(String),

    /// An operation exceeded its time budget
    #[error("Timed out after {elapsed:?} during {stage} for '{doc_id}'")]
    Timeout {
        doc_id: String,
        stage: Stage,
        elapsed: Duration,
    },

    /// The generation model could not produce an answer after all retries
    #[error("Answer generation failed after {attempts} attempts: {message}")]
    Generation { attempts: u32, message: String },

    /// Embedding model call failed
    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    /// Reranker call failed
    #[error("Reranker error: {0}")]
    Rerank(String),

    /// Single generation model call failed
    #[error("LLM error: {0}")]
    Llm(String),

    /// Vector/keyword index or artifact error
    #[error("Index error for '{doc_id}': {message}")]
    Index { doc_id: String, message: String },

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a parse error
    pub fn parse(doc_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            doc_id: doc_id.into(),
            message: message.into(),
        }
    }

    /// Create an index error
    pub fn index(doc_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Index {
            doc_id: doc_id.into(),
            message: message.into(),
        }
    }

    /// Create an embedding error
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding(message.into())
    }

    /// Create an LLM error
    pub fn llm(message: impl Into<String>) -> Self {
        Self::Llm(message.into())
    }

    /// Create a reranker error
    pub fn rerank(message: impl Into<String>) -> Self {
        Self::Rerank(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether retrying the same call may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Embedding(_) | Error::Llm(_) | Error::Rerank(_) | Error::Timeout { .. } => true,
            Error::Http(err) => {
                err.is_timeout()
                    || err.is_connect()
                    || err.status().map_or(true, |s| s.is_server_error() || s.as_u16() == 429)
            }
            _ => false,
        }
    }

    /// Stable tag for callers that map errors onto their own surface
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Config(_) => "config_error",
            Error::InvalidRequest(_) => "invalid_request",
            Error::Parse { .. } => "parse_error",
            Error::DocumentNotFound(_) => "document_not_found",
            Error::DocumentBusy(_) => "document_busy",
            Error::Timeout { .. } => "timeout",
            Error::Generation { .. } => "generation_error",
            Error::Embedding(_) => "embedding_error",
            Error::Rerank(_) => "rerank_error",
            Error::Llm(_) => "llm_error",
            Error::Index { .. } => "index_error",
            Error::Sqlite(_) => "sqlite_error",
            Error::Io(_) => "io_error",
            Error::Json(_) => "json_error",
            Error::Http(_) => "http_error",
            Error::Internal(_) => "internal_error",
        }
    }
}
