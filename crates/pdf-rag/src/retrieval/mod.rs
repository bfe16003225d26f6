//! Hybrid retrieval: vector and keyword search, rank fusion, reranking

pub mod fusion;
pub mod rerank;
pub mod search;

pub use fusion::{reciprocal_rank_fusion, FusedCandidate, DEFAULT_RRF_K};
pub use rerank::{RankedPassage, RerankOutcome, Reranker};
pub use search::{HybridRetriever, RetrievalDepths};
