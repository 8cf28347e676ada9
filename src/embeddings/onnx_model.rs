// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! ONNX sentence-transformer embedder (all-MiniLM-L6-v2)
//!
//! - BERT tokenizer, truncated to 256 tokens
//! - Mean pooling over token embeddings, weighted by the attention mask
//! - 384-dimensional output, normalised by [`EmbeddingVector`]
//!
//! Inference is CPU-bound and runs on the blocking pool so it never stalls the
//! async runtime.

use anyhow::{Context, Result};
use async_trait::async_trait;
use ndarray::{Array2, Axis};
use ort::execution_providers::CPUExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokenizers::{Tokenizer, TruncationParams};
use tracing::{debug, info};

use super::{Embedder, EmbeddingError, EmbeddingVector};

const MAX_SEQUENCE_LENGTH: usize = 256;
const OUTPUT_DIMENSION: usize = 384;

#[derive(Clone)]
pub struct OnnxEmbedder {
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<Tokenizer>,
    model_name: String,
    dimension: usize,
    max_input_chars: usize,
}

impl std::fmt::Debug for OnnxEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxEmbedder")
            .field("model_name", &self.model_name)
            .field("dimension", &self.dimension)
            .finish_non_exhaustive()
    }
}

impl OnnxEmbedder {
    /// Load the model and tokenizer, then run one validation inference
    pub async fn new<P: AsRef<Path>>(
        model_name: impl Into<String>,
        model_path: P,
        tokenizer_path: P,
        max_input_chars: usize,
    ) -> Result<Self> {
        let model_name = model_name.into();
        let model_path = model_path.as_ref();
        let tokenizer_path = tokenizer_path.as_ref();

        if !model_path.exists() {
            anyhow::bail!("ONNX model file not found: {}", model_path.display());
        }
        if !tokenizer_path.exists() {
            anyhow::bail!("Tokenizer file not found: {}", tokenizer_path.display());
        }

        info!("Loading ONNX embedding model from {}", model_path.display());
        let session = Session::builder()
            .context("Failed to create session builder")?
            .with_execution_providers([CPUExecutionProvider::default().build()])
            .context("Failed to set CPU execution provider")?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .context("Failed to set optimization level")?
            .with_intra_threads(4)
            .context("Failed to set intra threads")?
            .commit_from_file(model_path)
            .context(format!(
                "Failed to load ONNX model from {}",
                model_path.display()
            ))?;

        let mut tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| anyhow::anyhow!("Failed to load tokenizer: {}", e))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_SEQUENCE_LENGTH,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("Failed to configure truncation: {}", e))?;

        let embedder = Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
            model_name,
            dimension: OUTPUT_DIMENSION,
            max_input_chars,
        };

        let sample = Self::infer(&embedder.session, &embedder.tokenizer, "validation test")?;
        if sample.len() != OUTPUT_DIMENSION {
            anyhow::bail!(
                "Model outputs {} dimensions (expected {})",
                sample.len(),
                OUTPUT_DIMENSION
            );
        }

        info!("ONNX embedding model {} ready", embedder.model_name);
        Ok(embedder)
    }

    fn infer(session: &Mutex<Session>, tokenizer: &Tokenizer, text: &str) -> Result<Vec<f32>> {
        let encoding = tokenizer
            .encode(text, true)
            .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))?;

        let input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
        let attention_mask: Vec<i64> = encoding
            .get_attention_mask()
            .iter()
            .map(|&m| m as i64)
            .collect();
        let token_type_ids: Vec<i64> = vec![0i64; input_ids.len()];
        let pooling_mask = attention_mask.clone();

        let input_ids_array = Array2::from_shape_vec((1, input_ids.len()), input_ids)
            .context("Failed to create input_ids array")?;
        let attention_mask_array =
            Array2::from_shape_vec((1, attention_mask.len()), attention_mask)
                .context("Failed to create attention_mask array")?;
        let token_type_ids_array =
            Array2::from_shape_vec((1, token_type_ids.len()), token_type_ids)
                .context("Failed to create token_type_ids array")?;

        let mut guard = session
            .lock()
            .map_err(|_| anyhow::anyhow!("ONNX session lock poisoned"))?;
        let outputs = guard.run(ort::inputs![
            "input_ids" => Value::from_array(input_ids_array)?,
            "attention_mask" => Value::from_array(attention_mask_array)?,
            "token_type_ids" => Value::from_array(token_type_ids_array)?
        ])?;

        // [batch, seq_len, hidden_dim]
        let output = outputs[0]
            .try_extract_array::<f32>()
            .context("Failed to extract output tensor")?;
        if output.ndim() != 3 {
            anyhow::bail!("Unexpected output shape: {:?}", output.shape());
        }
        let tokens = output.index_axis(Axis(0), 0);
        let seq_len = tokens.shape()[0];
        let hidden_dim = tokens.shape()[1];

        let mut pooled = vec![0.0f32; hidden_dim];
        let mut sum_mask = 0.0f32;
        for i in 0..seq_len {
            let mask = pooling_mask.get(i).copied().unwrap_or(0) as f32;
            sum_mask += mask;
            for (j, value) in pooled.iter_mut().enumerate() {
                *value += tokens[[i, j]] * mask;
            }
        }
        for value in &mut pooled {
            *value /= sum_mask.max(1e-9);
        }

        Ok(pooled)
    }
}

#[async_trait]
impl Embedder for OnnxEmbedder {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector, EmbeddingError> {
        let len = text.chars().count();
        if len > self.max_input_chars {
            return Err(EmbeddingError::InputTooLong {
                len,
                max: self.max_input_chars,
            });
        }
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }

        let session = Arc::clone(&self.session);
        let tokenizer = Arc::clone(&self.tokenizer);
        let owned = text.to_string();
        let raw = tokio::task::spawn_blocking(move || Self::infer(&session, &tokenizer, &owned))
            .await
            .map_err(|e| EmbeddingError::Backend(format!("inference task failed: {}", e)))?
            .map_err(|e| EmbeddingError::Backend(e.to_string()))?;

        if raw.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: raw.len(),
            });
        }
        debug!("Embedded {} chars with {}", len, self.model_name);

        EmbeddingVector::new(raw)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
