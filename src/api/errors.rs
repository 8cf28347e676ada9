// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::warn;
use uuid::Uuid;

use crate::embeddings::EmbeddingError;
use crate::rag::{IngestionError, RagError};
use crate::sessions::SessionError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub error_type: String,
    pub message: String,
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HashMap<String, serde_json::Value>>,
}

#[derive(Debug, Clone)]
pub enum ApiError {
    NotFound(String),
    InvalidRequest(String),
    ValidationError { field: String, message: String },
    ServiceUnavailable(String),
    /// The embedding backend or LLM failed
    BadGateway(String),
    Timeout(String),
    InternalError(String),
}

impl ApiError {
    pub fn to_response(&self, request_id: Option<String>) -> ErrorResponse {
        let (error_type, message, details) = match self {
            ApiError::NotFound(msg) => ("not_found", msg.clone(), None),
            ApiError::InvalidRequest(msg) => ("invalid_request", msg.clone(), None),
            ApiError::ValidationError { field, message } => {
                let mut details = HashMap::new();
                details.insert(
                    "field".to_string(),
                    serde_json::Value::String(field.clone()),
                );
                ("validation_error", message.clone(), Some(details))
            }
            ApiError::ServiceUnavailable(msg) => ("service_unavailable", msg.clone(), None),
            ApiError::BadGateway(msg) => ("upstream_error", msg.clone(), None),
            ApiError::Timeout(msg) => ("timeout", msg.clone(), None),
            ApiError::InternalError(msg) => ("internal_error", msg.clone(), None),
        };

        ErrorResponse {
            error_type: error_type.to_string(),
            message,
            request_id,
            details,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::NotFound(_) => 404,
            ApiError::InvalidRequest(_) | ApiError::ValidationError { .. } => 400,
            ApiError::ServiceUnavailable(_) => 503,
            ApiError::BadGateway(_) => 502,
            ApiError::Timeout(_) => 504,
            ApiError::InternalError(_) => 500,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            ApiError::ValidationError { field, message } => {
                write!(f, "Validation error for {}: {}", field, message)
            }
            ApiError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
            ApiError::BadGateway(msg) => write!(f, "Upstream error: {}", msg),
            ApiError::Timeout(msg) => write!(f, "Timed out: {}", msg),
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<RagError> for ApiError {
    fn from(err: RagError) -> Self {
        let message = err.user_message();
        match err {
            RagError::InvalidRequest(_) => ApiError::InvalidRequest(message),
            RagError::QueryEmbedding(EmbeddingError::InputTooLong { .. })
            | RagError::QueryEmbedding(EmbeddingError::EmptyInput) => ApiError::ValidationError {
                field: "question".to_string(),
                message,
            },
            RagError::QueryEmbedding(_) | RagError::Generation(_) => ApiError::BadGateway(message),
            RagError::GenerationTimeout { .. } => ApiError::Timeout(message),
            RagError::Ingestion(IngestionError::Cancelled)
            | RagError::Ingestion(IngestionError::SourceUnavailable(_)) => {
                ApiError::ServiceUnavailable(message)
            }
            RagError::Session(SessionError::EmptyId) => ApiError::ValidationError {
                field: "session_id".to_string(),
                message,
            },
            RagError::Ingestion(_) | RagError::Configuration(_) => ApiError::InternalError(message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let request_id = Uuid::new_v4().to_string();
        warn!(request_id = %request_id, status = status.as_u16(), "{}", self);

        (status, Json(self.to_response(Some(request_id)))).into_response()
    }
}
