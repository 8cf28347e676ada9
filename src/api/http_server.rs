// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use super::handlers::{
    health_handler, ingest_handler, query_handler, session_history_handler, stats_handler,
    version_handler,
};
use crate::knowledge::DocumentSource;
use crate::rag::RagOrchestrator;

/// Shared state for every request
pub struct AppState {
    pub orchestrator: Arc<RagOrchestrator>,
    /// Source re-read by `POST /ingest`
    pub source: Arc<dyn DocumentSource>,
    /// Cancelled on shutdown; in-flight ingestion observes a child token
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(orchestrator: Arc<RagOrchestrator>, source: Arc<dyn DocumentSource>) -> Self {
        Self {
            orchestrator,
            source,
            shutdown: CancellationToken::new(),
        }
    }
}

pub fn create_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/stats", get(stats_handler))
        .route("/ingest", post(ingest_handler))
        .route("/query", post(query_handler))
        .route("/sessions/:session_id", get(session_history_handler))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Serve until the state's shutdown token is cancelled
pub async fn start_server(state: Arc<AppState>, addr: SocketAddr) -> anyhow::Result<()> {
    let shutdown = state.shutdown.clone();
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("API server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            info!("API server shutting down");
        })
        .await?;

    Ok(())
}
