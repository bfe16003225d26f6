//! Hybrid retrieval over one index generation

use std::sync::Arc;

use super::fusion::{reciprocal_rank_fusion, FusedCandidate};
use crate::config::RetrievalConfig;
use crate::error::{Error, Result};
use crate::index::IndexGeneration;
use crate::types::{Chunk, ChunkId};

/// Candidate depths for each retrieval mode
#[derive(Debug, Clone)]
pub struct RetrievalDepths {
    pub vector_k: usize,
    pub keyword_k: usize,
    pub candidates: usize,
    pub rrf_k: f64,
}

impl From<&RetrievalConfig> for RetrievalDepths {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            vector_k: config.vector_k,
            keyword_k: config.keyword_k,
            candidates: config.rerank_candidates,
            rrf_k: config.rrf_k,
        }
    }
}

/// Runs vector and keyword search against the same snapshot and fuses them
#[derive(Debug, Clone)]
pub struct HybridRetriever {
    depths: RetrievalDepths,
}

impl HybridRetriever {
    pub fn new(depths: RetrievalDepths) -> Self {
        Self { depths }
    }

    pub fn depths(&self) -> &RetrievalDepths {
        &self.depths
    }

    /// Fused candidates with their chunks, best first
    pub async fn retrieve(
        &self,
        generation: Arc<IndexGeneration>,
        question: &str,
        query_embedding: &[f32],
    ) -> Result<Vec<(FusedCandidate, Chunk)>> {
        let doc_id = generation.doc_id().to_string();

        // SQLite work stays off the async workers
        let keyword_task = {
            let generation = generation.clone();
            let question = question.to_string();
            let k = self.depths.keyword_k;
            tokio::task::spawn_blocking(move || generation.keyword().search(&question, k))
        };

        let vector_ids: Vec<ChunkId> = generation
            .vectors()
            .search(query_embedding, self.depths.vector_k)?
            .into_iter()
            .map(|hit| hit.chunk_id)
            .collect();

        let keyword_ids: Vec<ChunkId> = keyword_task
            .await
            .map_err(|e| Error::Internal(format!("Task join error: {}", e)))?
            .map_err(|e| Error::index(&doc_id, format!("keyword search failed: {}", e)))?
            .into_iter()
            .map(|hit| hit.chunk_id)
            .collect();

        tracing::debug!(
            doc_id = %doc_id,
            vector_hits = vector_ids.len(),
            keyword_hits = keyword_ids.len(),
            "hybrid search complete"
        );

        reciprocal_rank_fusion(&vector_ids, &keyword_ids, self.depths.rrf_k, self.depths.candidates)
            .into_iter()
            .map(|fused| {
                let chunk = generation.chunk(fused.chunk_id).cloned().ok_or_else(|| {
                    Error::index(&doc_id, format!("chunk {} missing from metadata", fused.chunk_id))
                })?;
                Ok((fused, chunk))
            })
            .collect()
    }
}
