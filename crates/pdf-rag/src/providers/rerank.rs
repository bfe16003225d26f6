//! Reranker provider trait for query-passage relevance scoring

use async_trait::async_trait;
use crate::error::Result;

/// Joint query-passage scorer
///
/// Implementations:
/// - `TeiReranker`: cross-encoder behind a text-embeddings-inference server
/// - `LexicalReranker`: offline term-overlap scorer
#[async_trait]
pub trait RerankProvider: Send + Sync {
    /// One score per passage, in input order
    ///
    /// Scores may be probabilities or raw logits; callers normalise.
    async fn rerank(&self, query: &str, passages: &[String]) -> Result<Vec<f32>>;

    /// Check if the provider is healthy and available
    async fn health_check(&self) -> Result<bool>;

    /// Get provider name for logging
    fn name(&self) -> &str;
}
