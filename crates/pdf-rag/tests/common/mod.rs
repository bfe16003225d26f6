//! Shared fixtures: in-memory PDFs and deterministic model stand-ins

#![allow(dead_code)]

use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use pdf_rag::config::{EmbeddingBackend, RerankerBackend};
use pdf_rag::generation::Prompt;
use pdf_rag::providers::{EmbeddingProvider, HashingEmbedder, LlmProvider, RerankProvider};
use pdf_rag::{Error, RagConfig, RagEngine, Result};

pub const DIMENSIONS: usize = 256;

/// A PDF with one page per entry; `None` is a page with graphics but no text
pub fn make_pdf(pages: &[Option<&str>]) -> Vec<u8> {
    make_pdf_with_title(pages, None)
}

pub fn make_pdf_with_title(pages: &[Option<&str>], title: Option<&str>) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids: Vec<Object> = Vec::new();
    for page in pages {
        let operations = match page {
            Some(text) => {
                let mut ops = vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![50.into(), 780.into()]),
                ];
                for line in text.lines() {
                    let literal = Object::string_literal(format!("{} ", line));
                    ops.push(Operation::new("Tj", vec![literal]));
                    ops.push(Operation::new("Td", vec![0.into(), (-14).into()]));
                }
                ops.push(Operation::new("ET", vec![]));
                ops
            }
            // A filled rectangle stands in for a scanned image
            None => vec![
                Operation::new("re", vec![50.into(), 50.into(), 400.into(), 600.into()]),
                Operation::new("f", vec![]),
            ],
        };
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("content encodes"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    if let Some(title) = title {
        let info_id = doc.add_object(dictionary! {
            "Title" => Object::string_literal(title),
        });
        doc.trailer.set("Info", info_id);
    }

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("pdf saves");
    bytes
}

/// The three-page report used by most scenarios; page 2 holds the revenue fact
pub fn report_pdf() -> Vec<u8> {
    make_pdf(&[
        Some("Annual report introduction.\nThis document covers company performance."),
        Some("Financial results.\nQuarterly revenue rose 25% compared to last year."),
        Some("Outlook.\nThe company expects continued growth in new markets."),
    ])
}

/// Offline configuration rooted at `dir`
pub fn test_config(dir: &Path) -> RagConfig {
    let mut config = RagConfig::default();
    config.storage.data_dir = dir.to_path_buf();
    config.embeddings.backend = EmbeddingBackend::Hashing;
    config.embeddings.dimensions = DIMENSIONS;
    config.reranker.backend = RerankerBackend::Lexical;
    config.limits.retry_base_delay_ms = 1;
    config.limits.retry_max_delay_ms = 5;
    config
}

pub fn engine_with_llm(config: RagConfig, llm: Arc<dyn LlmProvider>) -> RagEngine {
    RagEngine::builder(config)
        .llm(llm)
        .build()
        .expect("engine builds")
}

/// Answers by quoting the top snippet and citing its page
#[derive(Default)]
pub struct GroundedLlm {
    pub calls: AtomicU32,
}

impl GroundedLlm {
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for GroundedLlm {
    async fn generate(&self, prompt: &Prompt) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let line = prompt
            .user
            .lines()
            .find(|l| l.starts_with("Snippet #1 "))
            .unwrap_or_default();
        let page = line
            .split("(Doc: p. ")
            .nth(1)
            .and_then(|rest| rest.split(')').next())
            .unwrap_or("0");
        let text = line.split("): ").nth(1).unwrap_or("");
        Ok(format!("{} [Doc: p. {}]", text.trim(), page))
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "grounded"
    }

    fn model(&self) -> &str {
        "grounded-echo"
    }
}

/// Never reachable
#[derive(Default)]
pub struct FailingLlm {
    pub calls: AtomicU32,
}

#[async_trait]
impl LlmProvider for FailingLlm {
    async fn generate(&self, _prompt: &Prompt) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(Error::llm("connection refused"))
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(false)
    }

    fn name(&self) -> &str {
        "failing"
    }

    fn model(&self) -> &str {
        "none"
    }
}

/// Takes far longer than any test budget
pub struct SlowLlm(pub Duration);

#[async_trait]
impl LlmProvider for SlowLlm {
    async fn generate(&self, _prompt: &Prompt) -> Result<String> {
        tokio::time::sleep(self.0).await;
        Ok("too late [Doc: p. 1]".to_string())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "slow"
    }

    fn model(&self) -> &str {
        "slow"
    }
}

/// Reranker service that is down
pub struct DownReranker;

#[async_trait]
impl RerankProvider for DownReranker {
    async fn rerank(&self, _query: &str, _passages: &[String]) -> Result<Vec<f32>> {
        Err(Error::rerank("connection refused"))
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(false)
    }

    fn name(&self) -> &str {
        "down"
    }
}

/// Hashing embedder whose batch calls wait until the gate is open
///
/// Query embeddings (`embed`) are never gated, so queries can run while an
/// ingestion is parked in its embedding stage.
pub struct GatedEmbedder {
    inner: HashingEmbedder,
    gate: watch::Receiver<bool>,
    entered: watch::Sender<usize>,
}

impl GatedEmbedder {
    pub fn new(open: bool) -> (Arc<Self>, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(open);
        let embedder = Arc::new(Self {
            inner: HashingEmbedder::new(DIMENSIONS),
            gate: rx,
            entered: watch::Sender::new(0),
        });
        (embedder, tx)
    }

    /// Wait until `n` batch calls have started
    pub async fn wait_entered(&self, n: usize) {
        let mut entered = self.entered.subscribe();
        entered.wait_for(|count| *count >= n).await.expect("sender alive");
    }
}

#[async_trait]
impl EmbeddingProvider for GatedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.inner.embed(text).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.entered.send_modify(|count| *count += 1);
        let mut gate = self.gate.clone();
        gate.wait_for(|open| *open)
            .await
            .map_err(|_| Error::embedding("gate closed"))?;
        self.inner.embed_batch(texts).await
    }

    fn dimensions(&self) -> usize {
        DIMENSIONS
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "gated"
    }
}
