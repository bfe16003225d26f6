//! Token-bounded chunking with page and offset tracking

use std::sync::Arc;

use crate::types::{Chunk, ChunkId, Page};
use super::tokenizer::{TokenCounter, WordTokenizer};

/// Splits page text into overlapping, token-bounded chunks
pub struct TextChunker {
    /// Target chunk size in tokens
    chunk_size: usize,
    /// Tokens shared between consecutive chunks on a page
    overlap: usize,
    tokenizer: Arc<dyn TokenCounter>,
}

impl TextChunker {
    /// Create a chunker counting unicode word tokens
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        Self::with_tokenizer(chunk_size, overlap, Arc::new(WordTokenizer))
    }

    pub fn with_tokenizer(
        chunk_size: usize,
        overlap: usize,
        tokenizer: Arc<dyn TokenCounter>,
    ) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            overlap: overlap.min(chunk_size - 1),
            tokenizer,
        }
    }

    /// Chunk every page; ids are assigned in document order starting at 0
    pub fn chunk_pages(&self, doc_id: &str, pages: &[Page]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for page in pages {
            if page.is_empty() {
                continue;
            }
            let next_id = chunks.len() as ChunkId;
            chunks.extend(self.chunk_page(doc_id, page, next_id));
        }

        let avg = if chunks.is_empty() {
            0.0
        } else {
            chunks.iter().map(|c| c.token_count).sum::<usize>() as f64 / chunks.len() as f64
        };
        tracing::info!(doc_id, chunks = chunks.len(), avg_tokens = avg, "chunking complete");
        chunks
    }

    fn chunk_page(&self, doc_id: &str, page: &Page, first_id: ChunkId) -> Vec<Chunk> {
        let text = page.text.as_str();
        let spans = self.tokenizer.token_spans(text);
        if spans.is_empty() {
            return Vec::new();
        }

        let mut chunks = Vec::new();
        let mut start = 0usize;

        loop {
            let window_end = (start + self.chunk_size).min(spans.len());
            let end = if window_end < spans.len() {
                self.find_break(text, &spans, start, window_end)
            } else {
                window_end
            };

            let char_start = spans[start].0;
            let char_end = spans[end - 1].1;
            chunks.push(Chunk {
                chunk_id: first_id + chunks.len() as ChunkId,
                doc_id: doc_id.to_string(),
                page: page.number,
                char_start,
                char_end,
                token_count: end - start,
                text: text[char_start..char_end].to_string(),
            });

            if end >= spans.len() {
                break;
            }
            // Always advance, even if the break landed inside the overlap
            start = end.saturating_sub(self.overlap).max(start + 1);
        }

        chunks
    }

    /// Pull the cut back to a sentence or line break inside the last half of the window
    fn find_break(
        &self,
        text: &str,
        spans: &[(usize, usize)],
        start: usize,
        window_end: usize,
    ) -> usize {
        let floor = start + (window_end - start) / 2 + 1;
        for end in (floor..=window_end).rev() {
            let (prev_start, prev_end) = spans[end - 1];
            let next_start = spans[end].0;
            let token = &text[prev_start..prev_end];
            let gap = &text[prev_end..next_start];
            if matches!(token, "." | "!" | "?" | ";") || gap.contains('\n') {
                return end;
            }
        }
        window_end
    }
}
