//! The ingest / query / stats contract
//!
//! `RagEngine` wires the pipeline together: parsing and chunking, embedding
//! with retry, generation-swapped indices, hybrid retrieval, reranking and
//! grounded answer generation. Every call is scoped to one `doc_id`; calls for
//! different documents share no locks.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tokio::time::Instant as Deadline;

use crate::config::RagConfig;
use crate::error::{Error, Result, Stage};
use crate::generation::AnswerGenerator;
use crate::index::{validate_doc_id, BuildInput, IndexManager};
use crate::ingestion::{
    DocumentParser, HfTokenizer, PdfParser, TextChunker, TokenCounter, WordTokenizer,
};
use crate::providers::{self, EmbeddingProvider, LlmProvider, RerankProvider};
use crate::retrieval::{HybridRetriever, RetrievalDepths, Reranker};
use crate::types::{
    Chunk, DocumentRecord, DocumentStats, HealthReport, IngestReport, QueryResult, QueryTimings,
};
use crate::util::RetryPolicy;

/// Run `fut` against a request deadline, attributing a timeout to `stage`
async fn within<T>(
    doc_id: &str,
    stage: Stage,
    deadline: Deadline,
    started: Instant,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout_at(deadline, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(doc_id, %stage, "request deadline exceeded");
            Err(Error::Timeout {
                doc_id: doc_id.to_string(),
                stage,
                elapsed: started.elapsed(),
            })
        }
    }
}

/// Run blocking work (file IO, SQLite, PDF parsing) off the async workers
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Internal(format!("Task join error: {}", e)))?
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

/// Builder for swapping in parsers and model providers
pub struct RagEngineBuilder {
    config: RagConfig,
    parser: Option<Arc<dyn DocumentParser>>,
    tokenizer: Option<Arc<dyn TokenCounter>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    llm: Option<Arc<dyn LlmProvider>>,
    reranker: Option<Option<Arc<dyn RerankProvider>>>,
}

impl RagEngineBuilder {
    pub fn parser(mut self, parser: Arc<dyn DocumentParser>) -> Self {
        self.parser = Some(parser);
        self
    }

    pub fn tokenizer(mut self, tokenizer: Arc<dyn TokenCounter>) -> Self {
        self.tokenizer = Some(tokenizer);
        self
    }

    pub fn embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn llm(mut self, llm: Arc<dyn LlmProvider>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// `None` runs without a reranker
    pub fn reranker(mut self, reranker: Option<Arc<dyn RerankProvider>>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Anything not set explicitly comes from the configuration
    pub fn build(self) -> Result<RagEngine> {
        let config = self.config;
        config.validate()?;

        let tokenizer: Arc<dyn TokenCounter> =
            match (self.tokenizer, &config.chunking.tokenizer_path) {
                (Some(tokenizer), _) => tokenizer,
                (None, Some(path)) => Arc::new(HfTokenizer::from_file(path)?),
                (None, None) => Arc::new(WordTokenizer),
            };
        let embedder = match self.embedder {
            Some(embedder) => embedder,
            None => providers::embedder_from_config(&config)?,
        };
        let llm = match self.llm {
            Some(llm) => llm,
            None => providers::llm_from_config(&config)?,
        };
        let rerank_provider = match self.reranker {
            Some(reranker) => reranker,
            None => providers::reranker_from_config(&config)?,
        };

        let index = Arc::new(IndexManager::new(config.storage.documents_dir())?);
        let retry = RetryPolicy::from_limits(&config.limits);
        let retrieval = &config.retrieval;

        tracing::info!(
            data_dir = %config.storage.data_dir.display(),
            embedder = embedder.name(),
            dimensions = embedder.dimensions(),
            llm = llm.model(),
            reranker = rerank_provider.as_ref().map_or("none", |r| r.name()),
            "engine ready"
        );

        Ok(RagEngine {
            parser: self.parser.unwrap_or_else(|| Arc::new(PdfParser::new())),
            chunker: Arc::new(TextChunker::with_tokenizer(
                config.chunking.chunk_size,
                config.chunking.chunk_overlap,
                tokenizer,
            )),
            retriever: HybridRetriever::new(RetrievalDepths::from(retrieval)),
            reranker: Reranker::new(rerank_provider.clone(), retrieval.rerank_top_n),
            generator: AnswerGenerator::new(
                llm.clone(),
                retry.clone(),
                retrieval.confidence_threshold,
            ),
            rerank_provider,
            embedder,
            llm,
            index,
            retry,
            config,
        })
    }
}

/// Document question-answering engine
pub struct RagEngine {
    config: RagConfig,
    parser: Arc<dyn DocumentParser>,
    chunker: Arc<TextChunker>,
    embedder: Arc<dyn EmbeddingProvider>,
    llm: Arc<dyn LlmProvider>,
    rerank_provider: Option<Arc<dyn RerankProvider>>,
    index: Arc<IndexManager>,
    retriever: HybridRetriever,
    reranker: Reranker,
    generator: AnswerGenerator,
    retry: RetryPolicy,
}

impl RagEngine {
    pub fn builder(config: RagConfig) -> RagEngineBuilder {
        RagEngineBuilder {
            config,
            parser: None,
            tokenizer: None,
            embedder: None,
            llm: None,
            reranker: None,
        }
    }

    /// Engine with every provider chosen by configuration
    pub fn from_config(config: RagConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    pub fn index(&self) -> &Arc<IndexManager> {
        &self.index
    }

    /// Parse, chunk, embed and index a PDF under `doc_id`
    ///
    /// Replaces any previous ingestion atomically. Fails with `DocumentBusy`
    /// while another ingestion for the same `doc_id` is running.
    pub async fn ingest(&self, doc_id: &str, data: &[u8]) -> Result<IngestReport> {
        validate_doc_id(doc_id)?;
        let max = self.config.limits.max_upload_size;
        if data.len() > max {
            return Err(Error::InvalidRequest(format!(
                "upload of {} bytes exceeds the {} byte limit",
                data.len(),
                max
            )));
        }

        let permit = self.index.begin_ingest(doc_id)?;
        let started = Instant::now();
        let budget = self.config.limits.ingest_timeout(data.len());
        let deadline = Deadline::now() + budget;
        tracing::info!(doc_id, bytes = data.len(), ?budget, "ingestion started");

        let source: Arc<[u8]> = Arc::from(data);

        let stage_start = Instant::now();
        let parsed = within(doc_id, Stage::Parse, deadline, started, {
            let parser = self.parser.clone();
            let doc_id = doc_id.to_string();
            let source = source.clone();
            blocking(move || parser.parse(&doc_id, &source))
        })
        .await?;
        tracing::info!(
            doc_id,
            pages = parsed.pages.len(),
            ms = elapsed_ms(stage_start),
            "parse stage done"
        );

        let stage_start = Instant::now();
        let (parsed, chunks) = within(doc_id, Stage::Chunk, deadline, started, {
            let chunker = self.chunker.clone();
            let doc_id = doc_id.to_string();
            blocking(move || {
                let chunks = chunker.chunk_pages(&doc_id, &parsed.pages);
                Ok((parsed, chunks))
            })
        })
        .await?;
        tracing::info!(
            doc_id,
            chunks = chunks.len(),
            ms = elapsed_ms(stage_start),
            "chunk stage done"
        );

        let stage_start = Instant::now();
        let embed = self.embed_chunks(doc_id, &chunks);
        let embeddings = within(doc_id, Stage::Embed, deadline, started, embed).await?;
        tracing::info!(
            doc_id,
            vectors = embeddings.len(),
            ms = elapsed_ms(stage_start),
            "embed stage done"
        );

        // Building writes local files only; it is not subject to the model deadline
        let stage_start = Instant::now();
        let pages_count = parsed.pages.len() as u32;
        let chunks_count = chunks.len() as u32;
        let input = BuildInput {
            doc_id: doc_id.to_string(),
            source,
            parsed,
            chunks,
            embeddings,
            dimensions: self.embedder.dimensions(),
        };
        let index = self.index.clone();
        let generation = blocking(move || {
            let generation = index.build(&permit, input)?;
            drop(permit);
            Ok(generation.generation())
        })
        .await?;
        tracing::info!(doc_id, generation, ms = elapsed_ms(stage_start), "index stage done");

        let processing_time = started.elapsed().as_secs_f64();
        tracing::info!(
            doc_id,
            pages_count,
            chunks_count,
            generation,
            processing_time,
            "ingestion complete"
        );

        Ok(IngestReport {
            doc_id: doc_id.to_string(),
            pages_count,
            chunks_count,
            processing_time,
            generation,
        })
    }

    async fn embed_chunks(&self, doc_id: &str, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        let batch_size = self.config.embeddings.batch_size.max(1);
        let mut embeddings = Vec::with_capacity(chunks.len());

        for batch in chunks.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embedder = &self.embedder;
            let texts = &texts;
            let vectors = self
                .retry
                .run("chunk embedding", || async move { embedder.embed_batch(texts).await })
                .await
                .map_err(|failure| {
                    Error::embedding(format!(
                        "'{}' failed after {} attempts: {}",
                        doc_id, failure.attempts, failure.error
                    ))
                })?;

            if vectors.len() != batch.len() {
                return Err(Error::embedding(format!(
                    "'{}' requested {} embeddings, received {}",
                    doc_id,
                    batch.len(),
                    vectors.len()
                )));
            }
            embeddings.extend(vectors);
        }

        Ok(embeddings)
    }

    /// Answer `question` from the current generation of `doc_id`
    ///
    /// `k` overrides how many reranked passages are kept for the answer.
    pub async fn query(
        &self,
        doc_id: &str,
        question: &str,
        k: Option<usize>,
    ) -> Result<QueryResult> {
        validate_doc_id(doc_id)?;
        let question = question.trim();
        if question.is_empty() {
            return Err(Error::InvalidRequest("question is empty".to_string()));
        }
        let top_n = match k {
            Some(0) => return Err(Error::InvalidRequest("k must be at least 1".to_string())),
            Some(k) => k,
            None => self.reranker.top_n(),
        };

        // Snapshot first: the query completes against this generation
        let generation = {
            let index = self.index.clone();
            let doc_id = doc_id.to_string();
            blocking(move || index.load(&doc_id)).await?
        };

        let started = Instant::now();
        let deadline = Deadline::now() + self.config.limits.query_timeout();
        let mut timings = QueryTimings::default();

        let stage_start = Instant::now();
        let embedder = &self.embedder;
        let query_embedding = within(doc_id, Stage::Embed, deadline, started, async {
            self.retry
                .run("query embedding", || async move { embedder.embed(question).await })
                .await
                .map_err(|failure| failure.error)
        })
        .await?;
        timings.embed_ms = elapsed_ms(stage_start);

        let stage_start = Instant::now();
        let candidates = within(
            doc_id,
            Stage::Retrieve,
            deadline,
            started,
            self.retriever.retrieve(generation.clone(), question, &query_embedding),
        )
        .await?;
        timings.retrieval_ms = elapsed_ms(stage_start);
        let fused_count = candidates.len();

        let stage_start = Instant::now();
        let reranked = within(doc_id, Stage::Rerank, deadline, started, async {
            Ok(self.reranker.rerank_top(question, candidates, top_n).await)
        })
        .await?;
        timings.rerank_ms = elapsed_ms(stage_start);

        let stage_start = Instant::now();
        let answer = within(
            doc_id,
            Stage::Generate,
            deadline,
            started,
            self.generator.generate(question, &reranked),
        )
        .await?;
        timings.generation_ms = elapsed_ms(stage_start);
        timings.total_ms = elapsed_ms(started);

        tracing::info!(
            doc_id,
            generation = generation.generation(),
            fused = fused_count,
            kept = reranked.passages.len(),
            degraded = reranked.degraded,
            found = answer.found,
            confidence = answer.confidence,
            total_ms = timings.total_ms,
            "query complete"
        );

        Ok(QueryResult {
            answer: answer.answer,
            citations: answer.citations,
            snippets: answer.snippets,
            found: answer.found,
            confidence: answer.confidence,
            timings,
            generation: generation.generation(),
            rerank_degraded: reranked.degraded,
        })
    }

    /// Counts and sizes for `doc_id`
    pub async fn stats(&self, doc_id: &str) -> Result<DocumentStats> {
        let index = self.index.clone();
        let doc_id = doc_id.to_string();
        blocking(move || index.stats(&doc_id)).await
    }

    /// Every ingested document
    pub async fn list_documents(&self) -> Result<Vec<DocumentRecord>> {
        let index = self.index.clone();
        blocking(move || index.list()).await
    }

    /// Remove `doc_id` and its artifacts
    pub async fn delete(&self, doc_id: &str) -> Result<()> {
        let index = self.index.clone();
        let doc_id = doc_id.to_string();
        blocking(move || index.delete(&doc_id)).await
    }

    /// Reachability of each model service; failures read as unhealthy
    pub async fn health(&self) -> HealthReport {
        let embedder = self.embedder.health_check();
        let llm = self.llm.health_check();
        let (embedder, llm) = tokio::join!(embedder, llm);

        let reranker = match &self.rerank_provider {
            Some(provider) => Some(provider.health_check().await.unwrap_or(false)),
            None => None,
        };

        HealthReport {
            embedder: embedder.unwrap_or(false),
            llm: llm.unwrap_or(false),
            reranker,
        }
    }
}
