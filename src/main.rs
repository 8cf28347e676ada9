// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{Context, Result};
use clap::Parser;
use faq_rag_node::{
    api::{start_server, AppState},
    config::RagConfig,
    embeddings::build_embedder,
    knowledge::{DirectorySource, DocumentSource, RepositorySource},
    llm::ClaudeClient,
    rag::RagOrchestrator,
    version,
};
use std::{env, net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};
use tokio::signal;
use tracing::{error, info, warn};

/// FAQ knowledge-base question answering node
#[derive(Parser, Debug)]
#[command(name = "faq-rag-node")]
#[command(version = version::VERSION_NUMBER)]
#[command(about = "Answers questions from a markdown knowledge base with Claude", long_about = None)]
struct Cli {
    /// Directory holding the knowledge base documents
    #[arg(long, env = "KB_DIRECTORY")]
    kb_dir: Option<PathBuf>,

    /// Address to bind the HTTP API to
    #[arg(long, env = "API_HOST")]
    host: Option<String>,

    /// Port for the HTTP API
    #[arg(long, env = "API_PORT")]
    port: Option<u16>,

    /// Start with an empty index instead of ingesting at startup
    #[arg(long)]
    skip_initial_ingest: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    info!("Starting {}", version::get_version_string());

    let mut config = RagConfig::from_env();
    if let Some(dir) = cli.kb_dir {
        config.kb_directory = dir;
    }
    if let Some(host) = cli.host {
        config.api.host = host;
    }
    if let Some(port) = cli.port {
        config.api.port = port;
    }
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    let api_key = config
        .llm
        .api_key
        .clone()
        .context("ANTHROPIC_API_KEY must be set")?;

    let embedder = build_embedder(&config.embedding)
        .await
        .context("Failed to initialise embedder")?;
    let llm = ClaudeClient::new(
        &config.llm.api_url,
        &api_key,
        &config.llm.model,
        // The orchestrator enforces the real deadline; this only bounds stuck sockets
        config.generation_timeout() + Duration::from_secs(5),
    )
    .context("Failed to build Claude client")?;

    let orchestrator = Arc::new(
        RagOrchestrator::from_config(&config, embedder, Arc::new(llm))
            .context("Failed to build RAG pipeline")?,
    );
    let source: Arc<dyn DocumentSource> = match &config.repository {
        Some(repository) => Arc::new(
            RepositorySource::new(
                &repository.list_url,
                &repository.raw_content_url,
                &config.kb_directory,
            )
            .context("Failed to build repository source")?,
        ),
        None => Arc::new(DirectorySource::new(&config.kb_directory)),
    };
    info!("Knowledge source: {}", source.describe());
    let state = Arc::new(AppState::new(orchestrator.clone(), source.clone()));

    let shutdown = state.shutdown.clone();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested");
                shutdown.cancel();
            }
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    if !cli.skip_initial_ingest {
        match orchestrator.ingest(source.as_ref(), &state.shutdown).await {
            Ok(report) => {
                info!(
                    "Initial ingest: {} documents, {} chunks ({} skipped, {} failures)",
                    report.documents_indexed,
                    report.chunks_indexed,
                    report.chunks_skipped,
                    report.failures.len()
                );
            }
            Err(e) => warn!("Initial ingest failed, starting with an empty index: {}", e),
        }
    }

    if let Some(ttl) = config.session_limits().idle_ttl {
        let sessions = orchestrator.sessions().clone();
        let shutdown = state.shutdown.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(ttl.max(Duration::from_secs(1)));
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        sessions.purge_idle().await;
                    }
                }
            }
        });
    }

    let addr: SocketAddr = format!("{}:{}", config.api.host, config.api.port)
        .parse()
        .context("Invalid API host/port")?;

    start_server(state, addr).await?;
    info!("Goodbye");
    Ok(())
}
