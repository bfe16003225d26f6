//! Configuration for the PDF question-answering core

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RagConfig {
    /// Where per-document artifacts live
    pub storage: StorageConfig,
    /// Chunking configuration
    pub chunking: ChunkingConfig,
    /// Hybrid retrieval, fusion and rerank depths
    pub retrieval: RetrievalConfig,
    /// Embedding provider configuration
    pub embeddings: EmbeddingConfig,
    /// Generation model configuration
    pub llm: LlmConfig,
    /// Reranker configuration
    pub reranker: RerankerConfig,
    /// Request budgets
    pub limits: LimitsConfig,
}

impl RagConfig {
    /// Load defaults, then an optional TOML file, then environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                toml::from_str(&raw).map_err(|e| {
                    Error::Config(format!("Invalid config file {}: {}", path.display(), e))
                })?
            }
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides using the variable names operators already know
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(key: &str, raw: String) -> Result<T> {
            raw.trim()
                .parse()
                .map_err(|_| Error::Config(format!("{} has an invalid value: {}", key, raw)))
        }

        if let Some(v) = lookup("CHUNK_SIZE") {
            self.chunking.chunk_size = parse("CHUNK_SIZE", v)?;
        }
        if let Some(v) = lookup("CHUNK_OVERLAP") {
            self.chunking.chunk_overlap = parse("CHUNK_OVERLAP", v)?;
        }
        if let Some(v) = lookup("FAISS_K") {
            self.retrieval.vector_k = parse("FAISS_K", v)?;
        }
        if let Some(v) = lookup("FTS_K") {
            self.retrieval.keyword_k = parse("FTS_K", v)?;
        }
        if let Some(v) = lookup("RERANK_CANDIDATES") {
            self.retrieval.rerank_candidates = parse("RERANK_CANDIDATES", v)?;
        }
        if let Some(v) = lookup("RERANK_TOP_N") {
            self.retrieval.rerank_top_n = parse("RERANK_TOP_N", v)?;
        }
        if let Some(v) = lookup("CONFIDENCE_THRESHOLD") {
            self.retrieval.confidence_threshold = parse("CONFIDENCE_THRESHOLD", v)?;
        }
        if let Some(v) = lookup("MAX_UPLOAD_SIZE") {
            self.limits.max_upload_size = parse("MAX_UPLOAD_SIZE", v)?;
        }
        if let Some(v) = lookup("DATA_DIR") {
            self.storage.data_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("OLLAMA_BASE_URL") {
            self.llm.base_url = v.clone();
            self.embeddings.base_url = v;
        }
        Ok(())
    }

    /// Reject configurations the pipeline cannot honour
    pub fn validate(&self) -> Result<()> {
        let c = &self.chunking;
        if c.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be positive".into()));
        }
        if c.chunk_overlap >= c.chunk_size {
            return Err(Error::Config("chunk_overlap must be less than chunk_size".into()));
        }

        let r = &self.retrieval;
        if r.vector_k == 0 || r.keyword_k == 0 || r.rerank_candidates == 0 || r.rerank_top_n == 0 {
            return Err(Error::Config("retrieval depths must be positive".into()));
        }
        if r.rerank_top_n > r.rerank_candidates {
            return Err(Error::Config(
                "rerank_top_n must not exceed rerank_candidates".into(),
            ));
        }
        if !(0.0..=1.0).contains(&r.confidence_threshold) {
            return Err(Error::Config(
                "confidence_threshold must be between 0 and 1".into(),
            ));
        }
        if r.rrf_k <= 0.0 {
            return Err(Error::Config("rrf_k must be positive".into()));
        }
        if self.embeddings.batch_size == 0 {
            return Err(Error::Config("embedding batch_size must be positive".into()));
        }
        Ok(())
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory; documents live under `<data_dir>/documents/<doc_id>`
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pdf-rag");
        Self { data_dir }
    }
}

impl StorageConfig {
    /// Directory holding all per-document generations
    pub fn documents_dir(&self) -> PathBuf {
        self.data_dir.join("documents")
    }
}

/// Token-bounded chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Target chunk size in tokens
    pub chunk_size: usize,
    /// Overlap between consecutive chunks on a page, in tokens
    pub chunk_overlap: usize,
    /// Optional `tokenizer.json` of the embedding model; word-boundary counting otherwise
    pub tokenizer_path: Option<PathBuf>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
            tokenizer_path: None,
        }
    }
}

/// Hybrid retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Vector search depth (FAISS_K)
    pub vector_k: usize,
    /// Keyword search depth (FTS_K)
    pub keyword_k: usize,
    /// Fused candidates handed to the reranker
    pub rerank_candidates: usize,
    /// Passages kept after reranking
    pub rerank_top_n: usize,
    /// Minimum top rerank score required to answer
    pub confidence_threshold: f32,
    /// RRF rank-bias constant
    pub rrf_k: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            vector_k: 20,
            keyword_k: 20,
            rerank_candidates: 30,
            rerank_top_n: 5,
            confidence_threshold: 0.35,
            rrf_k: 60.0,
        }
    }
}

/// Embedding backend selection
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Ollama embedding endpoint
    #[default]
    Ollama,
    /// Offline feature-hashing embedder
    Hashing,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackend,
    /// Ollama base URL
    pub base_url: String,
    /// Embedding model name
    pub model: String,
    /// Embedding dimensions (768 for nomic-embed-text)
    pub dimensions: usize,
    /// Texts per embedding request
    pub batch_size: usize,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Ollama,
            base_url: "http://localhost:11434".to_string(),
            model: "nomic-embed-text".to_string(),
            dimensions: 768,
            batch_size: 32,
            timeout_secs: 60,
        }
    }
}

/// Generation model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Ollama base URL
    pub base_url: String,
    /// Generation model name
    pub model: String,
    /// Temperature for generation
    pub temperature: f32,
    /// Upper bound on generated tokens
    pub max_tokens: u32,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.2:3b".to_string(),
            temperature: 0.1,
            max_tokens: 500,
            timeout_secs: 60,
        }
    }
}

/// Reranker backend selection
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum RerankerBackend {
    /// Cross-encoder behind a text-embeddings-inference `/rerank` endpoint
    #[default]
    Tei,
    /// Offline lexical-overlap scorer
    Lexical,
    /// No reranker; fused order is used directly
    None,
}

/// Reranker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankerConfig {
    pub backend: RerankerBackend,
    /// Base URL of the reranker service
    pub base_url: String,
    /// Model name reported in logs
    pub model: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            backend: RerankerBackend::Tei,
            base_url: "http://localhost:8081".to_string(),
            model: "BAAI/bge-reranker-base".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Request budgets and retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum upload size in bytes (default: 100MB)
    pub max_upload_size: usize,
    /// Fixed ceiling for a whole query
    pub query_timeout_ms: u64,
    /// Ingestion budget base
    pub ingest_timeout_base_ms: u64,
    /// Additional ingestion budget per MiB of source file
    pub ingest_timeout_per_mb_ms: u64,
    /// Retries after the first attempt for embedding and generation calls
    pub max_retries: u32,
    /// First backoff delay; doubles per attempt
    pub retry_base_delay_ms: u64,
    /// Backoff ceiling
    pub retry_max_delay_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_upload_size: 100 * 1024 * 1024, // 100MB
            query_timeout_ms: 60_000,
            ingest_timeout_base_ms: 120_000,
            ingest_timeout_per_mb_ms: 30_000,
            max_retries: 3,
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 8_000,
        }
    }
}

impl LimitsConfig {
    /// Query ceiling
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    /// Ingestion budget proportional to the source size
    pub fn ingest_timeout(&self, size_bytes: usize) -> Duration {
        let mib = (size_bytes as u64).div_ceil(1024 * 1024);
        Duration::from_millis(
            self.ingest_timeout_base_ms
                .saturating_add(mib.saturating_mul(self.ingest_timeout_per_mb_ms)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = RagConfig::default();
        assert_eq!(config.chunking.chunk_size, 500);
        assert_eq!(config.chunking.chunk_overlap, 50);
        assert_eq!(config.retrieval.vector_k, 20);
        assert_eq!(config.retrieval.keyword_k, 20);
        assert_eq!(config.retrieval.rerank_candidates, 30);
        assert_eq!(config.retrieval.rerank_top_n, 5);
        assert!((config.retrieval.confidence_threshold - 0.35).abs() < f32::EPSILON);
        assert_eq!(config.limits.max_upload_size, 100 * 1024 * 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = RagConfig::default();
        config
            .apply_env(|key| match key {
                "CHUNK_SIZE" => Some("256".to_string()),
                "FAISS_K" => Some("40".to_string()),
                "CONFIDENCE_THRESHOLD" => Some("0.5".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.chunking.chunk_size, 256);
        assert_eq!(config.retrieval.vector_k, 40);
        assert!((config.retrieval.confidence_threshold - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_invalid_env_value_is_config_error() {
        let mut config = RagConfig::default();
        let err = config
            .apply_env(|key| (key == "FTS_K").then(|| "many".to_string()))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk() {
        let mut config = RagConfig::default();
        config.chunking.chunk_overlap = 500;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_threshold_range() {
        let mut config = RagConfig::default();
        config.retrieval.confidence_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml() {
        let config: RagConfig = toml::from_str(
            r#"
            [chunking]
            chunk_size = 300

            [reranker]
            backend = "lexical"
            "#,
        )
        .unwrap();
        assert_eq!(config.chunking.chunk_size, 300);
        assert_eq!(config.chunking.chunk_overlap, 50);
        assert_eq!(config.reranker.backend, RerankerBackend::Lexical);
        assert_eq!(config.retrieval.rerank_top_n, 5);
    }

    #[test]
    fn test_ingest_timeout_scales_with_size() {
        let limits = LimitsConfig::default();
        let small = limits.ingest_timeout(10);
        let large = limits.ingest_timeout(50 * 1024 * 1024);
        assert!(large > small);
    }
}
