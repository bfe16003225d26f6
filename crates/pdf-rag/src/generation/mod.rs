//! Answer generation with grounded prompts and citation handling

pub mod answer;
pub mod citation;
pub mod prompt;

pub use answer::{AnswerGenerator, GeneratedAnswer, SNIPPET_MAX_CHARS};
pub use citation::{parse_markers, resolve_citations, truncate_snippet, CitationMarker};
pub use prompt::{Prompt, PromptBuilder, NOT_FOUND_ANSWER};
