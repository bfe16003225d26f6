//! Cross-encoder reranking of fused candidates with graceful degradation

use std::sync::Arc;

use super::fusion::FusedCandidate;
use crate::providers::{LexicalReranker, RerankProvider};
use crate::types::Chunk;

/// A passage kept for answer generation
#[derive(Debug, Clone)]
pub struct RankedPassage {
    pub chunk: Chunk,
    /// Relevance in [0,1]
    pub score: f32,
    pub fused_score: f64,
}

/// Reranked passages and whether the cross-encoder had to be bypassed
#[derive(Debug, Clone, Default)]
pub struct RerankOutcome {
    pub passages: Vec<RankedPassage>,
    pub degraded: bool,
}

impl RerankOutcome {
    pub fn top_score(&self) -> f32 {
        self.passages.first().map_or(0.0, |p| p.score)
    }
}

/// Reorders fused candidates and keeps the best `top_n`
///
/// Without a usable cross-encoder the candidates are scored by query-term
/// coverage instead. Fused rank positions say nothing about relevance, so they
/// never stand in for a score.
pub struct Reranker {
    provider: Option<Arc<dyn RerankProvider>>,
    lexical: LexicalReranker,
    top_n: usize,
}

impl Reranker {
    pub fn new(provider: Option<Arc<dyn RerankProvider>>, top_n: usize) -> Self {
        Self {
            provider,
            lexical: LexicalReranker::new(),
            top_n,
        }
    }

    pub fn top_n(&self) -> usize {
        self.top_n
    }

    /// Score `candidates` (already in fused order) against `query`, keeping the configured count
    pub async fn rerank(
        &self,
        query: &str,
        candidates: Vec<(FusedCandidate, Chunk)>,
    ) -> RerankOutcome {
        self.rerank_top(query, candidates, self.top_n).await
    }

    /// Score `candidates` and keep the best `top_n`
    ///
    /// Never fails: an unavailable or misbehaving reranker falls back to
    /// lexical scoring and marks the outcome degraded.
    pub async fn rerank_top(
        &self,
        query: &str,
        candidates: Vec<(FusedCandidate, Chunk)>,
        top_n: usize,
    ) -> RerankOutcome {
        if candidates.is_empty() {
            return RerankOutcome::default();
        }

        let texts: Vec<String> = candidates.iter().map(|(_, chunk)| chunk.text.clone()).collect();
        let Some(provider) = &self.provider else {
            let scores = self.lexical.score_passages(query, &texts);
            return RerankOutcome {
                passages: rank(candidates, scores, top_n),
                degraded: false,
            };
        };

        let scores = match provider.rerank(query, &texts).await {
            Ok(scores) if scores.len() == candidates.len() => normalize_scores(scores),
            Ok(scores) => {
                tracing::warn!(
                    reranker = provider.name(),
                    expected = candidates.len(),
                    received = scores.len(),
                    "reranker returned wrong number of scores, using lexical fallback"
                );
                return self.fallback(query, &texts, candidates, top_n);
            }
            Err(e) => {
                tracing::warn!(
                    reranker = provider.name(),
                    "reranker unavailable, using lexical fallback: {}",
                    e
                );
                return self.fallback(query, &texts, candidates, top_n);
            }
        };

        let passages = rank(candidates, scores, top_n);
        tracing::debug!(
            reranker = provider.name(),
            kept = passages.len(),
            top_score = passages.first().map_or(0.0, |p| p.score),
            "reranking complete"
        );
        RerankOutcome {
            passages,
            degraded: false,
        }
    }

    fn fallback(
        &self,
        query: &str,
        texts: &[String],
        candidates: Vec<(FusedCandidate, Chunk)>,
        top_n: usize,
    ) -> RerankOutcome {
        let scores = self.lexical.score_passages(query, texts);
        RerankOutcome {
            passages: rank(candidates, scores, top_n),
            degraded: true,
        }
    }
}

/// Sort by descending score, ties in fused order, and keep `top_n`
fn rank(
    candidates: Vec<(FusedCandidate, Chunk)>,
    scores: Vec<f32>,
    top_n: usize,
) -> Vec<RankedPassage> {
    let mut ranked: Vec<(usize, RankedPassage)> = candidates
        .into_iter()
        .zip(scores)
        .enumerate()
        .map(|(position, ((fused, chunk), score))| {
            (
                position,
                RankedPassage {
                    chunk,
                    score,
                    fused_score: fused.score,
                },
            )
        })
        .collect();

    ranked.sort_by(|(pa, a), (pb, b)| b.score.total_cmp(&a.score).then_with(|| pa.cmp(pb)));
    ranked.truncate(top_n);
    ranked.into_iter().map(|(_, p)| p).collect()
}

/// Map raw cross-encoder output into [0,1]
///
/// Probabilities pass through; if any score falls outside [0,1] the batch is
/// treated as logits and squashed with a sigmoid. NaN scores become 0.
fn normalize_scores(scores: Vec<f32>) -> Vec<f32> {
    let logits = scores
        .iter()
        .any(|s| s.is_finite() && !(0.0..=1.0).contains(s));

    scores
        .into_iter()
        .map(|s| {
            if s.is_nan() {
                0.0
            } else if logits {
                1.0 / (1.0 + (-s).exp())
            } else {
                s.clamp(0.0, 1.0)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use crate::retrieval::fusion::reciprocal_rank_fusion;
    use async_trait::async_trait;

    struct FixedScores(Result<Vec<f32>>);

    #[async_trait]
    impl RerankProvider for FixedScores {
        async fn rerank(&self, _query: &str, _passages: &[String]) -> Result<Vec<f32>> {
            match &self.0 {
                Ok(scores) => Ok(scores.clone()),
                Err(_) => Err(Error::rerank("connection refused")),
            }
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(self.0.is_ok())
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    fn candidates_with(texts: &[&str]) -> Vec<(FusedCandidate, Chunk)> {
        let ids: Vec<u32> = (0..texts.len() as u32).collect();
        reciprocal_rank_fusion(&ids, &ids, 60.0, texts.len())
            .into_iter()
            .map(|fused| {
                let text = texts[fused.chunk_id as usize].to_string();
                let chunk = Chunk {
                    chunk_id: fused.chunk_id,
                    doc_id: "doc".into(),
                    page: fused.chunk_id + 1,
                    char_start: 0,
                    char_end: text.len(),
                    token_count: 1,
                    text,
                };
                (fused, chunk)
            })
            .collect()
    }

    fn candidates(n: u32) -> Vec<(FusedCandidate, Chunk)> {
        let texts: Vec<String> = (0..n).map(|i| format!("text {}", i)).collect();
        let texts: Vec<&str> = texts.iter().map(String::as_str).collect();
        candidates_with(&texts)
    }

    fn reranker(provider: FixedScores, top_n: usize) -> Reranker {
        Reranker::new(Some(Arc::new(provider)), top_n)
    }

    #[tokio::test]
    async fn test_reorders_by_score_and_keeps_top_n() {
        let outcome = reranker(FixedScores(Ok(vec![0.1, 0.9, 0.5, 0.7])), 2)
            .rerank("q", candidates(4))
            .await;
        assert!(!outcome.degraded);
        let ids: Vec<u32> = outcome.passages.iter().map(|p| p.chunk.chunk_id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert!((outcome.top_score() - 0.9).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_fewer_candidates_than_top_n() {
        let outcome = reranker(FixedScores(Ok(vec![0.3, 0.8])), 5)
            .rerank("q", candidates(2))
            .await;
        assert_eq!(outcome.passages.len(), 2);
    }

    #[tokio::test]
    async fn test_ties_keep_fused_order() {
        let outcome = reranker(FixedScores(Ok(vec![0.5, 0.5, 0.5])), 3)
            .rerank("q", candidates(3))
            .await;
        let ids: Vec<u32> = outcome.passages.iter().map(|p| p.chunk.chunk_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_failure_degrades_to_lexical_scores() {
        let texts = [
            "The company expects continued growth.",
            "Quarterly revenue rose 25%.",
            "Board minutes.",
        ];
        let outcome = reranker(FixedScores(Err(Error::rerank("down"))), 2)
            .rerank("What happened to revenue?", candidates_with(&texts))
            .await;
        assert!(outcome.degraded);
        let ids: Vec<u32> = outcome.passages.iter().map(|p| p.chunk.chunk_id).collect();
        // Revenue passage first, then the zero-score tie in fused order
        assert_eq!(ids, vec![1, 0]);
        assert!((outcome.top_score() - 0.5).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_degraded_top_fused_rank_is_not_confidence() {
        let texts = ["The company expects continued growth.", "Board minutes."];
        let outcome = reranker(FixedScores(Err(Error::rerank("down"))), 2)
            .rerank("Who painted the Mona Lisa?", candidates_with(&texts))
            .await;
        assert!(outcome.degraded);
        // Rank 1 in both fused lists still carries no relevance
        assert_eq!(outcome.passages[0].chunk.chunk_id, 0);
        assert_eq!(outcome.top_score(), 0.0);
    }

    #[tokio::test]
    async fn test_wrong_score_count_degrades() {
        let outcome = reranker(FixedScores(Ok(vec![0.9])), 2)
            .rerank("q", candidates(3))
            .await;
        assert!(outcome.degraded);
    }

    #[tokio::test]
    async fn test_explicit_top_n_overrides_default() {
        let outcome = reranker(FixedScores(Ok(vec![0.1, 0.9, 0.5, 0.7])), 2)
            .rerank_top("q", candidates(4), 3)
            .await;
        assert_eq!(outcome.passages.len(), 3);
    }

    #[tokio::test]
    async fn test_no_provider_scores_lexically() {
        let texts = ["Board minutes.", "Quarterly revenue rose 25%.", "Outlook."];
        let outcome = Reranker::new(None, 2)
            .rerank("What happened to revenue?", candidates_with(&texts))
            .await;
        assert!(!outcome.degraded);
        assert_eq!(outcome.passages.len(), 2);
        assert_eq!(outcome.passages[0].chunk.chunk_id, 1);

        let unrelated = Reranker::new(None, 2)
            .rerank("Who painted the Mona Lisa?", candidates_with(&texts))
            .await;
        assert_eq!(unrelated.top_score(), 0.0);
    }

    #[test]
    fn test_normalize_scores() {
        assert_eq!(normalize_scores(vec![0.2, 0.8]), vec![0.2, 0.8]);

        let squashed = normalize_scores(vec![-2.0, 0.0, 3.5]);
        assert!(squashed.iter().all(|s| (0.0..=1.0).contains(s)));
        assert!(squashed[0] < squashed[1] && squashed[1] < squashed[2]);
        assert!((squashed[1] - 0.5).abs() < 1e-6);

        assert_eq!(normalize_scores(vec![f32::NAN, 0.4]), vec![0.0, 0.4]);
    }
}
