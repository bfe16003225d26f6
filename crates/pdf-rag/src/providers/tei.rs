//! Cross-encoder reranker behind a text-embeddings-inference `/rerank` endpoint

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::RerankerConfig;
use crate::error::{Error, Result};

use super::rerank::RerankProvider;

#[derive(Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    texts: &'a [String],
    raw_scores: bool,
    truncate: bool,
}

#[derive(Deserialize)]
struct RankedText {
    index: usize,
    score: f32,
}

/// TEI reranker client (e.g. BAAI/bge-reranker-base)
pub struct TeiReranker {
    client: Client,
    base_url: String,
    model: String,
}

impl TeiReranker {
    pub fn new(config: &RerankerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }
}

/// Put scores back into input order; every index must appear exactly once
fn scores_in_order(ranked: Vec<RankedText>, expected: usize) -> Result<Vec<f32>> {
    let mut scores = vec![None; expected];
    for item in ranked {
        match scores.get_mut(item.index) {
            Some(slot) if slot.is_none() => *slot = Some(item.score),
            _ => {
                return Err(Error::rerank(format!(
                    "unexpected or duplicate index {} in rerank response",
                    item.index
                )))
            }
        }
    }
    scores
        .into_iter()
        .collect::<Option<Vec<f32>>>()
        .ok_or_else(|| Error::rerank("rerank response is missing passages"))
}

#[async_trait]
impl RerankProvider for TeiReranker {
    async fn rerank(&self, query: &str, passages: &[String]) -> Result<Vec<f32>> {
        if passages.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/rerank", self.base_url);
        let request = RerankRequest {
            query,
            texts: passages,
            raw_scores: false,
            truncate: true,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::rerank(format!("Rerank request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::rerank(format!(
                "Rerank failed: HTTP {} - {}",
                status, body
            )));
        }

        let ranked: Vec<RankedText> = response
            .json()
            .await
            .map_err(|e| Error::rerank(format!("Failed to parse rerank response: {}", e)))?;

        tracing::debug!(model = %self.model, passages = passages.len(), "reranked");
        scores_in_order(ranked, passages.len())
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/health", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    fn name(&self) -> &str {
        "tei"
    }
}
