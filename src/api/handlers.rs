// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use super::errors::ApiError;
use super::http_server::AppState;
use crate::rag::{Citation, IndexStats, IngestReport};
use crate::sessions::{Message, SessionStore};
use crate::version;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Omitted or empty means start a new session
    #[serde(default, alias = "sessionId")]
    pub session_id: Option<String>,
    #[serde(default, alias = "message")]
    pub question: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub session_id: String,
    pub answer: String,
    pub sources: Vec<SourceRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceRef {
    pub document_id: String,
    pub chunk_index: usize,
    pub similarity: f32,
}

impl From<Citation> for SourceRef {
    fn from(c: Citation) -> Self {
        Self {
            document_id: c.document_id,
            chunk_index: c.chunk_index,
            similarity: c.similarity,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestFailure {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResponse {
    pub documents_indexed: usize,
    pub chunks_indexed: usize,
    pub chunks_skipped: usize,
    pub failures: Vec<IngestFailure>,
}

impl From<IngestReport> for IngestResponse {
    fn from(report: IngestReport) -> Self {
        Self {
            documents_indexed: report.documents_indexed,
            chunks_indexed: report.chunks_indexed,
            chunks_skipped: report.chunks_skipped,
            failures: report
                .failures
                .iter()
                .map(|f| IngestFailure {
                    document_id: f.document_id().map(str::to_string),
                    error: f.to_string(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionHistoryResponse {
    pub session_id: String,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub index: IndexStats,
    pub active_sessions: usize,
    pub llm_model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub indexed_chunks: usize,
}

pub async fn query_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::InvalidRequest(e.body_text()))?;

    let question = request.question.unwrap_or_default();
    if question.trim().is_empty() {
        return Err(ApiError::ValidationError {
            field: "question".to_string(),
            message: "Question must not be empty".to_string(),
        });
    }

    let session_id = match request.session_id {
        Some(id) if !id.trim().is_empty() => id,
        _ => SessionStore::create_session_id(),
    };

    let answer = state.orchestrator.query(&session_id, &question).await?;

    Ok(Json(QueryResponse {
        session_id: answer.session_id,
        answer: answer.answer,
        sources: answer.sources.into_iter().map(SourceRef::from).collect(),
    }))
}

pub async fn ingest_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<IngestResponse>, ApiError> {
    let cancel = state.shutdown.child_token();
    let report = state
        .orchestrator
        .ingest(state.source.as_ref(), &cancel)
        .await?;

    info!(
        "Ingest request indexed {} chunks from {} documents",
        report.chunks_indexed, report.documents_indexed
    );
    Ok(Json(report.into()))
}

pub async fn session_history_handler(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionHistoryResponse>, ApiError> {
    let messages = state
        .orchestrator
        .history(&session_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Session {} not found", session_id)))?;

    Ok(Json(SessionHistoryResponse {
        session_id,
        messages,
    }))
}

pub async fn stats_handler(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    Json(StatsResponse {
        index: state.orchestrator.stats().await,
        active_sessions: state.orchestrator.sessions().session_count().await,
        llm_model: state.orchestrator.llm_model().to_string(),
    })
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: version::VERSION_NUMBER.to_string(),
        indexed_chunks: state.orchestrator.index().len().await,
    })
}

pub async fn version_handler() -> Json<serde_json::Value> {
    Json(version::get_version_info())
}
