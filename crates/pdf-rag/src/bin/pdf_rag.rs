//! pdf-rag command line
//!
//! Run with: cargo run -p pdf-rag -- query report "What happened to revenue?"

use anyhow::Context;
use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pdf_rag::{RagConfig, RagEngine};

#[derive(Parser, Debug)]
#[command(name = "pdf-rag", version, about = "Ask grounded questions about large PDFs")]
struct Cli {
    /// TOML configuration file; environment variables override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse, chunk, embed and index a PDF
    Ingest {
        doc_id: String,
        file: PathBuf,
    },
    /// Ask a question about an ingested document
    Query {
        doc_id: String,
        question: String,
        /// Passages kept after reranking
        #[arg(short)]
        k: Option<usize>,
    },
    /// Show counts and artifact sizes for a document
    Stats { doc_id: String },
    /// List ingested documents
    List,
    /// Delete a document and its indices
    Delete { doc_id: String },
    /// Check that the model services are reachable
    Health,
}

fn spinner(message: String) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    if let Ok(template) = ProgressStyle::with_template("{spinner:.cyan} {msg} [{elapsed}]") {
        bar.set_style(template);
    }
    bar.set_message(message);
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pdf_rag=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = RagConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    let engine = RagEngine::from_config(config)?;

    match cli.command {
        Command::Ingest { doc_id, file } => {
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;

            let bar = spinner(format!("Ingesting {} as '{}'", file.display(), doc_id));
            let result = engine.ingest(&doc_id, &bytes).await;
            bar.finish_and_clear();

            let report = result?;
            eprintln!(
                "{} {} pages, {} chunks in {:.1}s",
                style("ingested").green().bold(),
                report.pages_count,
                report.chunks_count,
                report.processing_time
            );
            print_json(&report)?;
        }
        Command::Query { doc_id, question, k } => {
            let bar = spinner(format!("Searching '{}'", doc_id));
            let result = engine.query(&doc_id, &question, k).await;
            bar.finish_and_clear();

            let result = result?;
            let status = if result.found {
                style("found").green().bold()
            } else {
                style("not found").yellow().bold()
            };
            eprintln!(
                "{} confidence {:.2}{}",
                status,
                result.confidence,
                if result.rerank_degraded { " (reranker unavailable)" } else { "" }
            );
            print_json(&result)?;
        }
        Command::Stats { doc_id } => print_json(&engine.stats(&doc_id).await?)?,
        Command::List => print_json(&engine.list_documents().await?)?,
        Command::Delete { doc_id } => {
            engine.delete(&doc_id).await?;
            eprintln!("{} '{}'", style("deleted").red().bold(), doc_id);
        }
        Command::Health => {
            let report = engine.health().await;
            let mark = |ok: bool| if ok { style("up").green() } else { style("down").red() };
            eprintln!("embedder  {}", mark(report.embedder));
            eprintln!("llm       {}", mark(report.llm));
            match report.reranker {
                Some(ok) => eprintln!("reranker  {}", mark(ok)),
                None => eprintln!("reranker  {}", style("disabled").dim()),
            }
            print_json(&report)?;
        }
    }

    Ok(())
}
