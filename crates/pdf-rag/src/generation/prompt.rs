//! Prompt templates for grounded answer generation

use serde::{Deserialize, Serialize};

use crate::retrieval::RankedPassage;

/// Exact refusal text the model is told to use, and the neutral not-found answer
pub const NOT_FOUND_ANSWER: &str = "Not found in document.";

const SYSTEM_PROMPT: &str = r#"You are a document QA assistant. You must use ONLY the provided snippets from the user's document to answer.
- If the answer is not clearly supported by the snippets, reply exactly: "Not found in document."
- For each sentence that uses evidence, add an inline citation formatted as [Doc: p. <page>].
- Keep answers concise (1-5 sentences) and faithful to the source.
- Do not speculate or use external knowledge."#;

/// System and user halves of a generation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// Prompt builder for grounded queries
pub struct PromptBuilder;

impl PromptBuilder {
    /// Tag each passage with its position and page marker
    pub fn build_context(passages: &[RankedPassage]) -> String {
        passages
            .iter()
            .enumerate()
            .map(|(i, p)| {
                format!(
                    "Snippet #{} (Doc: p. {}): {}",
                    i + 1,
                    p.chunk.page,
                    p.chunk.text.trim()
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Build the full prompt with strict grounding
    pub fn build(question: &str, passages: &[RankedPassage]) -> Prompt {
        let user = format!(
            r#"Question: "{question}"

You are given {count} snippets. Each snippet includes the source page.
Snippets:
{context}

Instructions:
- Answer only from the snippets.
- Add [Doc: p. <page>] after each sentence that uses evidence.
- If insufficient evidence: "{not_found}""#,
            question = question.trim(),
            count = passages.len(),
            context = Self::build_context(passages),
            not_found = NOT_FOUND_ANSWER,
        );

        Prompt {
            system: SYSTEM_PROMPT.to_string(),
            user,
        }
    }
}
