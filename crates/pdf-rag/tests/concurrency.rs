//! Per-document writer exclusion and snapshot isolation

mod common;

use std::sync::Arc;

use common::*;
use pdf_rag::{Error, RagEngine, Stage};
use tempfile::TempDir;

fn gated_engine(
    dir: &TempDir,
    open: bool,
) -> (Arc<RagEngine>, Arc<GatedEmbedder>, tokio::sync::watch::Sender<bool>) {
    let (embedder, gate) = GatedEmbedder::new(open);
    let engine = RagEngine::builder(test_config(dir.path()))
        .embedder(embedder.clone())
        .llm(Arc::new(GroundedLlm::default()))
        .build()
        .unwrap();
    (Arc::new(engine), embedder, gate)
}

#[tokio::test]
async fn test_queries_see_previous_generation_during_reingest() {
    let dir = TempDir::new().unwrap();
    let (engine, embedder, gate) = gated_engine(&dir, true);

    engine.ingest("report", &report_pdf()).await.unwrap();
    embedder.wait_entered(1).await;
    gate.send(false).unwrap();

    let revised = make_pdf(&[Some("Quarterly revenue fell 10% after the merger.")]);
    let writer = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.ingest("report", &revised).await })
    };
    embedder.wait_entered(2).await;

    // The writer is parked in its embedding stage
    let result = engine
        .query("report", "What happened to revenue?", None)
        .await
        .unwrap();
    assert_eq!(result.generation, 1);
    assert!(result.answer.contains("rose"));

    let err = engine.ingest("report", &report_pdf()).await.unwrap_err();
    assert!(matches!(err, Error::DocumentBusy(ref id) if id == "report"));

    gate.send(true).unwrap();
    let report = writer.await.unwrap().unwrap();
    assert_eq!(report.generation, 2);

    let result = engine
        .query("report", "What happened to revenue?", None)
        .await
        .unwrap();
    assert_eq!(result.generation, 2);
    assert!(result.answer.contains("fell"));
}

#[tokio::test]
async fn test_other_documents_are_not_blocked() {
    let dir = TempDir::new().unwrap();
    let (engine, embedder, gate) = gated_engine(&dir, true);
    engine.ingest("ready", &report_pdf()).await.unwrap();
    gate.send(false).unwrap();

    let writer = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.ingest("pending", &report_pdf()).await })
    };
    embedder.wait_entered(2).await;

    let result = engine
        .query("ready", "What happened to revenue?", None)
        .await
        .unwrap();
    assert!(result.found);
    assert!(matches!(
        engine.query("pending", "What happened to revenue?", None).await.unwrap_err(),
        Error::DocumentNotFound(_)
    ));
    assert!(matches!(
        engine.delete("pending").await.unwrap_err(),
        Error::DocumentBusy(_)
    ));

    gate.send(true).unwrap();
    writer.await.unwrap().unwrap();
    assert_eq!(engine.list_documents().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_ingest_timeout_releases_the_document() {
    let dir = TempDir::new().unwrap();
    let (embedder, gate) = GatedEmbedder::new(false);
    let mut config = test_config(dir.path());
    config.limits.ingest_timeout_base_ms = 200;
    config.limits.ingest_timeout_per_mb_ms = 0;
    let engine = RagEngine::builder(config)
        .embedder(embedder)
        .llm(Arc::new(GroundedLlm::default()))
        .build()
        .unwrap();

    let err = engine.ingest("report", &report_pdf()).await.unwrap_err();
    match err {
        Error::Timeout { ref doc_id, stage, .. } => {
            assert_eq!(doc_id, "report");
            assert_eq!(stage, Stage::Embed);
        }
        ref other => panic!("expected timeout, got {other:?}"),
    }
    assert!(matches!(
        engine.stats("report").await.unwrap_err(),
        Error::DocumentNotFound(_)
    ));

    gate.send(true).unwrap();
    let report = engine.ingest("report", &report_pdf()).await.unwrap();
    assert_eq!(report.generation, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_queries_share_one_snapshot() {
    let dir = TempDir::new().unwrap();
    let (engine, _embedder, _gate) = gated_engine(&dir, true);
    engine.ingest("report", &report_pdf()).await.unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .query("report", "What happened to revenue?", None)
                    .await
            })
        })
        .collect();

    for handle in handles {
        let result = handle.await.unwrap().unwrap();
        assert!(result.found);
        assert_eq!(result.citations[0].page, 2);
    }
}
