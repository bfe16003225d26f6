//! Offline deterministic providers
//!
//! Useful when no model server is available and as stand-ins in tests.
//! Neither captures semantics; both only see surface terms.

use async_trait::async_trait;
use std::collections::HashSet;
use unicode_segmentation::UnicodeSegmentation;

use crate::error::Result;

use super::embedding::EmbeddingProvider;
use super::rerank::RerankProvider;

const STOPWORDS: &[&str] = &[
    "a", "about", "an", "and", "are", "as", "at", "be", "by", "did", "do", "does", "for", "from",
    "has", "have", "how", "i", "in", "is", "it", "its", "of", "on", "or", "that", "the", "this",
    "to", "was", "were", "what", "when", "where", "which", "who", "why", "with",
];

fn terms(text: &str) -> impl Iterator<Item = String> + '_ {
    text.unicode_words().map(str::to_lowercase)
}

fn content_terms(text: &str) -> HashSet<String> {
    terms(text)
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}

/// 64-bit FNV-1a; stable across platforms and releases
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// Feature-hashed bag of words, L2-normalised
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for term in terms(text) {
            let hash = fnv1a(term.as_bytes());
            let bucket = (hash % self.dimensions as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_sync(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "hashing"
    }
}

/// Scores a passage by the share of the query's content terms it contains
#[derive(Debug, Clone, Default)]
pub struct LexicalReranker;

impl LexicalReranker {
    pub fn new() -> Self {
        Self
    }

    /// Coverage score in [0,1] for each passage, in input order
    pub fn score_passages(&self, query: &str, passages: &[String]) -> Vec<f32> {
        let query_terms = content_terms(query);
        passages
            .iter()
            .map(|p| Self::score(&query_terms, p))
            .collect()
    }

    fn score(query_terms: &HashSet<String>, passage: &str) -> f32 {
        if query_terms.is_empty() {
            return 0.0;
        }
        let passage_terms = content_terms(passage);
        let hits = query_terms
            .iter()
            .filter(|t| passage_terms.contains(*t))
            .count();
        hits as f32 / query_terms.len() as f32
    }
}

#[async_trait]
impl RerankProvider for LexicalReranker {
    async fn rerank(&self, query: &str, passages: &[String]) -> Result<Vec<f32>> {
        Ok(self.score_passages(query, passages))
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "lexical"
    }
}
