// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Text embedding backends
//!
//! Every backend implements [`Embedder`]. The index only ever sees
//! [`EmbeddingVector`]s, so swapping the feature-hashing embedder for the ONNX
//! sentence transformer changes scores but not behaviour.

pub mod hashing;
#[cfg(feature = "onnx")]
pub mod onnx_model;
pub mod vector;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::config::{EmbeddingBackend, EmbeddingSettings};

pub use hashing::HashingEmbedder;
#[cfg(feature = "onnx")]
pub use onnx_model::OnnxEmbedder;
pub use vector::EmbeddingVector;

/// Errors raised while turning text into a vector
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmbeddingError {
    /// Backend failed or is unavailable
    #[error("Embedding backend error: {0}")]
    Backend(String),

    #[error("Input too long: {len} characters (limit {max})")]
    InputTooLong { len: usize, max: usize },

    #[error("Input contains no embeddable text")]
    EmptyInput,

    /// Vector does not match the index dimension
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid embedding values: {0}")]
    InvalidValues(String),

    #[error("Failed to initialise embedding model: {0}")]
    ModelInit(String),
}

/// Capability to embed one text into a fixed-dimension vector
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector, EmbeddingError>;

    /// Output dimension, identical for every call
    fn dimension(&self) -> usize;

    fn model_name(&self) -> &str;
}

/// Build the embedder selected by configuration
pub async fn build_embedder(
    settings: &EmbeddingSettings,
) -> Result<Arc<dyn Embedder>, EmbeddingError> {
    match settings.backend {
        EmbeddingBackend::Hashing => {
            info!(
                "Using feature-hashing embedder ({} dimensions)",
                settings.dimension
            );
            Ok(Arc::new(HashingEmbedder::new(
                settings.dimension,
                settings.max_input_chars,
            )))
        }
        #[cfg(feature = "onnx")]
        EmbeddingBackend::Onnx => {
            let (model_path, tokenizer_path) =
                match (&settings.model_path, &settings.tokenizer_path) {
                    (Some(m), Some(t)) => (m.clone(), t.clone()),
                    _ => {
                        return Err(EmbeddingError::ModelInit(
                            "model and tokenizer paths are required".to_string(),
                        ))
                    }
                };
            let model = OnnxEmbedder::new(
                "all-MiniLM-L6-v2",
                model_path,
                tokenizer_path,
                settings.max_input_chars,
            )
            .await
            .map_err(|e| EmbeddingError::ModelInit(e.to_string()))?;
            if model.dimension() != settings.dimension {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: settings.dimension,
                    actual: model.dimension(),
                });
            }
            Ok(Arc::new(model))
        }
        #[cfg(not(feature = "onnx"))]
        EmbeddingBackend::Onnx => Err(EmbeddingError::ModelInit(
            "ONNX backend requested but the binary was built without the `onnx` feature"
                .to_string(),
        )),
    }
}
