// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use serde::Serialize;

use super::EmbeddingError;

/// Dense embedding for exactly one chunk or query
///
/// Values are finite and the vector is stored L2-normalised, so cosine
/// similarity reduces to a dot product.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbeddingVector {
    data: Vec<f32>,
}

impl EmbeddingVector {
    /// Validate and normalise raw model output
    pub fn new(mut data: Vec<f32>) -> Result<Self, EmbeddingError> {
        if data.is_empty() {
            return Err(EmbeddingError::InvalidValues(
                "embedding has no dimensions".to_string(),
            ));
        }
        if data.iter().any(|v| !v.is_finite()) {
            return Err(EmbeddingError::InvalidValues(
                "embedding contains NaN or infinite values".to_string(),
            ));
        }

        let norm = data.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm == 0.0 {
            return Err(EmbeddingError::InvalidValues(
                "embedding has zero magnitude".to_string(),
            ));
        }
        for value in &mut data {
            *value /= norm;
        }

        Ok(Self { data })
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn dimension(&self) -> usize {
        self.data.len()
    }

    /// Cosine similarity in `[-1, 1]`; 0.0 when dimensions differ
    pub fn cosine_similarity(&self, other: &EmbeddingVector) -> f32 {
        if self.data.len() != other.data.len() {
            return 0.0;
        }

        let dot: f32 = self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(a, b)| a * b)
            .sum();

        dot.clamp(-1.0, 1.0)
    }
}
