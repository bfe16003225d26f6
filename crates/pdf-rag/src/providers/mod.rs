//! Provider abstractions for embeddings, reranking and answer generation
//!
//! Each model service sits behind a narrow async trait so the pipeline can run
//! against Ollama and a TEI reranker in production and deterministic local
//! stand-ins offline.

pub mod embedding;
pub mod llm;
pub mod local;
pub mod ollama;
pub mod rerank;
pub mod tei;

use std::sync::Arc;

use crate::config::{EmbeddingBackend, RagConfig, RerankerBackend};
use crate::error::Result;

pub use embedding::EmbeddingProvider;
pub use llm::LlmProvider;
pub use local::{HashingEmbedder, LexicalReranker};
pub use ollama::{OllamaEmbedder, OllamaLlm};
pub use rerank::RerankProvider;
pub use tei::TeiReranker;

/// Embedding provider selected by configuration
pub fn embedder_from_config(config: &RagConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let embedder: Arc<dyn EmbeddingProvider> = match config.embeddings.backend {
        EmbeddingBackend::Ollama => Arc::new(OllamaEmbedder::new(&config.embeddings)?),
        EmbeddingBackend::Hashing => Arc::new(HashingEmbedder::new(config.embeddings.dimensions)),
    };
    Ok(embedder)
}

/// Reranker selected by configuration; `None` disables reranking
pub fn reranker_from_config(config: &RagConfig) -> Result<Option<Arc<dyn RerankProvider>>> {
    let reranker: Arc<dyn RerankProvider> = match config.reranker.backend {
        RerankerBackend::Tei => Arc::new(TeiReranker::new(&config.reranker)?),
        RerankerBackend::Lexical => Arc::new(LexicalReranker::new()),
        RerankerBackend::None => return Ok(None),
    };
    Ok(Some(reranker))
}

/// Generation model selected by configuration
pub fn llm_from_config(config: &RagConfig) -> Result<Arc<dyn LlmProvider>> {
    let llm: Arc<dyn LlmProvider> = Arc::new(OllamaLlm::new(&config.llm)?);
    Ok(llm)
}
