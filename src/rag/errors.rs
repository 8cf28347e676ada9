// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Error types for ingestion and question answering
//!
//! - `IngestionError`: one document (or the whole source) could not be loaded
//! - `RagError`: a query or ingestion request failed as a whole
//!
//! `RagError::user_message` is what callers see; internal details stay in logs.

use thiserror::Error;

use crate::embeddings::EmbeddingError;
use crate::llm::GenerationError;
use crate::sessions::SessionError;

/// Failure to load a document for indexing
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IngestionError {
    #[error("Document {document_id} could not be read: {reason}")]
    Unreadable { document_id: String, reason: String },

    #[error("Document {document_id} is not valid UTF-8")]
    InvalidUtf8 { document_id: String },

    #[error("Document {document_id} has an unsupported format")]
    UnsupportedFormat { document_id: String },

    /// The source as a whole could not be opened
    #[error("Knowledge source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Ingestion cancelled")]
    Cancelled,
}

impl IngestionError {
    /// Document the failure belongs to, if it is per-document
    pub fn document_id(&self) -> Option<&str> {
        match self {
            IngestionError::Unreadable { document_id, .. }
            | IngestionError::InvalidUtf8 { document_id }
            | IngestionError::UnsupportedFormat { document_id } => Some(document_id),
            IngestionError::SourceUnavailable(_) | IngestionError::Cancelled => None,
        }
    }
}

/// Request-level failure of the RAG pipeline
#[derive(Error, Debug)]
pub enum RagError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// The question could not be embedded
    #[error("Query embedding failed: {0}")]
    QueryEmbedding(#[source] EmbeddingError),

    #[error("Generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("Generation timed out after {timeout_ms}ms")]
    GenerationTimeout { timeout_ms: u64 },

    #[error("Ingestion failed: {0}")]
    Ingestion(#[from] IngestionError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

impl RagError {
    /// Caller-safe message for API responses
    pub fn user_message(&self) -> String {
        match self {
            RagError::InvalidRequest(msg) => msg.clone(),
            RagError::Configuration(_) => "Service is misconfigured".to_string(),
            RagError::QueryEmbedding(EmbeddingError::InputTooLong { max, .. }) => {
                format!("Question is too long (limit {} characters)", max)
            }
            RagError::QueryEmbedding(EmbeddingError::EmptyInput) => {
                "Question contains no searchable text".to_string()
            }
            RagError::QueryEmbedding(_) => "Failed to process the question".to_string(),
            RagError::Generation(GenerationError::EmptyResponse) => {
                "No response from LLM".to_string()
            }
            RagError::Generation(_) => "The language model request failed".to_string(),
            RagError::GenerationTimeout { timeout_ms } => {
                format!("The language model did not answer within {}ms", timeout_ms)
            }
            RagError::Ingestion(IngestionError::Cancelled) => "Ingestion was cancelled".to_string(),
            RagError::Ingestion(IngestionError::SourceUnavailable(_)) => {
                "Knowledge source is unavailable".to_string()
            }
            RagError::Ingestion(e) => e.to_string(),
            RagError::Session(e) => e.to_string(),
        }
    }

    /// Stable code for logs and error bodies
    pub fn error_code(&self) -> &'static str {
        match self {
            RagError::InvalidRequest(_) => "INVALID_REQUEST",
            RagError::Configuration(_) => "CONFIGURATION_ERROR",
            RagError::QueryEmbedding(_) => "QUERY_EMBEDDING_FAILED",
            RagError::Generation(_) => "GENERATION_FAILED",
            RagError::GenerationTimeout { .. } => "GENERATION_TIMEOUT",
            RagError::Ingestion(_) => "INGESTION_FAILED",
            RagError::Session(_) => "SESSION_ERROR",
        }
    }
}
