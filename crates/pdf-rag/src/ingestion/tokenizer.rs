//! Token counting with byte offsets

use std::path::Path;
use unicode_segmentation::UnicodeSegmentation;

use crate::error::{Error, Result};

/// Splits text into tokens, reporting each token's byte range
pub trait TokenCounter: Send + Sync {
    /// Token spans in ascending order, each on UTF-8 character boundaries
    fn token_spans(&self, text: &str) -> Vec<(usize, usize)>;

    fn count(&self, text: &str) -> usize {
        self.token_spans(text).len()
    }
}

/// Unicode word-boundary tokens; whitespace is not counted
#[derive(Debug, Default, Clone, Copy)]
pub struct WordTokenizer;

impl TokenCounter for WordTokenizer {
    fn token_spans(&self, text: &str) -> Vec<(usize, usize)> {
        text.split_word_bound_indices()
            .filter(|(_, segment)| !segment.trim().is_empty())
            .map(|(start, segment)| (start, start + segment.len()))
            .collect()
    }
}

/// The embedding model's own tokenizer loaded from `tokenizer.json`
pub struct HfTokenizer {
    inner: tokenizers::Tokenizer,
}

impl HfTokenizer {
    pub fn from_file(path: &Path) -> Result<Self> {
        let inner = tokenizers::Tokenizer::from_file(path).map_err(|e| {
            Error::Config(format!("Failed to load tokenizer {}: {}", path.display(), e))
        })?;
        Ok(Self { inner })
    }
}

impl TokenCounter for HfTokenizer {
    fn token_spans(&self, text: &str) -> Vec<(usize, usize)> {
        match self.inner.encode(text, false) {
            Ok(encoding) => ascending_spans(text, encoding.get_offsets().iter().copied()),
            Err(e) => {
                tracing::warn!("tokenizer failed, falling back to word boundaries: {}", e);
                WordTokenizer.token_spans(text)
            }
        }
    }
}

/// Keep non-empty spans on char boundaries that start at or after the previous end
///
/// Sub-word pieces can repeat a word's offsets and some normalizers emit
/// overlapping or backwards ranges; chunk slicing needs disjoint ascending spans.
fn ascending_spans(
    text: &str,
    offsets: impl Iterator<Item = (usize, usize)>,
) -> Vec<(usize, usize)> {
    let mut spans: Vec<(usize, usize)> = Vec::new();
    let mut last_end = 0;
    for (start, end) in offsets {
        let valid = end > start
            && start >= last_end
            && text.is_char_boundary(start)
            && text.is_char_boundary(end);
        if valid {
            spans.push((start, end));
            last_end = end;
        }
    }
    spans
}
