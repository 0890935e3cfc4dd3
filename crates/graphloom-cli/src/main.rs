//! graphloom - command-line pipeline runner.
//!
//! Reads an article from a text file, chunks it, runs the extraction
//! pipeline against an OpenAI-compatible oracle, and prints the run
//! result and graph statistics.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use graphloom_core::{ArticleMeta, Chunk, GraphloomConfig, PipelineOrchestrator};
use graphloom_graph_stores::GraphStoreFactory;
use graphloom_oracle::{OpenAiOracle, OracleConfig};

const RUN_TIMEOUT: Duration = Duration::from_secs(600);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env()
                .add_directive(Level::INFO.into())
                .add_directive("graphloom=debug".parse().unwrap()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let Some(input) = args.next() else {
        bail!("usage: graphloom <article.txt> [article-url]");
    };
    let article_url = args.next();
    let input = PathBuf::from(input);

    let text = std::fs::read_to_string(&input)
        .with_context(|| format!("reading article from {}", input.display()))?;
    let article_id = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("article")
        .to_string();

    let config = GraphloomConfig::from_env();
    let chunks = Chunk::split_text(&article_id, &text, config.pipeline.max_chunk_chars);
    if chunks.is_empty() {
        bail!("article {} contains no text", input.display());
    }
    info!(article_id, chunks = chunks.len(), "article chunked");

    // Graph store: GRAPHLOOM_GRAPH_DB selects SQLite, otherwise in-memory.
    let graph_store = match std::env::var("GRAPHLOOM_GRAPH_DB") {
        Ok(path) => {
            info!(path, "using sqlite graph store");
            GraphStoreFactory::sqlite(path)?
        }
        Err(_) => GraphStoreFactory::in_memory(),
    };

    let oracle = Arc::new(OpenAiOracle::new(OracleConfig::default())?);
    let orchestrator = PipelineOrchestrator::new(&config, oracle, Arc::clone(&graph_store));

    let mut article = ArticleMeta::new(&article_id).title(&article_id);
    if let Some(url) = article_url {
        article = article.url(url);
    }

    let run_id = orchestrator.submit(article, chunks).await?;
    info!(run_id, "run submitted");

    let result = orchestrator.await_run(&run_id, RUN_TIMEOUT).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    let stats = graph_store.stats().await?;
    println!("{}", serde_json::to_string_pretty(&stats)?);

    Ok(())
}
