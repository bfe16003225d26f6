//! Grounded answer generation with citation checks

use std::sync::Arc;

use super::citation::{resolve_citations, truncate_snippet};
use super::prompt::{PromptBuilder, NOT_FOUND_ANSWER};
use crate::error::{Error, Result};
use crate::providers::LlmProvider;
use crate::retrieval::RerankOutcome;
use crate::types::response::{Citation, Snippet};
use crate::util::RetryPolicy;

/// Maximum snippet length in characters
pub const SNIPPET_MAX_CHARS: usize = 300;

/// Answer with its supporting evidence
#[derive(Debug, Clone)]
pub struct GeneratedAnswer {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub snippets: Vec<Snippet>,
    pub found: bool,
    pub confidence: f32,
}

impl GeneratedAnswer {
    fn not_found(confidence: f32) -> Self {
        Self {
            answer: NOT_FOUND_ANSWER.to_string(),
            citations: Vec::new(),
            snippets: Vec::new(),
            found: false,
            confidence,
        }
    }
}

/// Builds the prompt, calls the model and decides whether the answer stands
pub struct AnswerGenerator {
    llm: Arc<dyn LlmProvider>,
    retry: RetryPolicy,
    confidence_threshold: f32,
}

impl AnswerGenerator {
    pub fn new(llm: Arc<dyn LlmProvider>, retry: RetryPolicy, confidence_threshold: f32) -> Self {
        Self {
            llm,
            retry,
            confidence_threshold,
        }
    }

    /// Answer `question` from the reranked passages
    ///
    /// Below the confidence threshold the model is not called at all. A model
    /// that stays unreachable after retries is a `Generation` error, never a
    /// not-found answer.
    pub async fn generate(
        &self,
        question: &str,
        reranked: &RerankOutcome,
    ) -> Result<GeneratedAnswer> {
        let confidence = reranked.top_score().clamp(0.0, 1.0);

        if reranked.passages.is_empty() || confidence <= self.confidence_threshold {
            tracing::info!(
                confidence,
                threshold = self.confidence_threshold,
                "retrieval below confidence threshold, answering not found"
            );
            return Ok(GeneratedAnswer::not_found(confidence));
        }

        let prompt = PromptBuilder::build(question, &reranked.passages);
        let llm = &self.llm;
        let prompt = &prompt;
        let raw = self
            .retry
            .run("answer generation", || async move { llm.generate(prompt).await })
            .await
            .map_err(|failure| Error::Generation {
                attempts: failure.attempts,
                message: failure.error.to_string(),
            })?;

        let answer = raw.trim();
        if is_refusal(answer) {
            tracing::info!("model reported the answer is not in the document");
            return Ok(GeneratedAnswer::not_found(confidence));
        }

        let citations = resolve_citations(answer, &reranked.passages);
        if citations.is_empty() {
            tracing::warn!("answer has no resolvable citations, treating as not found");
            return Ok(GeneratedAnswer::not_found(confidence));
        }

        let snippets = reranked
            .passages
            .iter()
            .map(|p| Snippet {
                page: p.chunk.page,
                chunk_id: p.chunk.chunk_id,
                text: truncate_snippet(&p.chunk.text, SNIPPET_MAX_CHARS),
                score: p.score,
            })
            .collect();

        Ok(GeneratedAnswer {
            answer: answer.to_string(),
            citations,
            snippets,
            found: true,
            confidence,
        })
    }
}

fn is_refusal(answer: &str) -> bool {
    let refusal = NOT_FOUND_ANSWER.trim_end_matches('.');
    answer.is_empty()
        || answer
            .get(..refusal.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(refusal))
}
