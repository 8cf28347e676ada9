// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Feature-hashing embedder
//!
//! Maps each lowercase word to a bucket using SHA-256, with sub-linear term
//! frequency weighting. Weights are never negative, so colliding words add up
//! instead of cancelling and any text with a content word has a non-zero
//! vector. Needs no model files and is fully deterministic,
//! which makes it the default backend and the one used throughout the tests.
//! Texts sharing vocabulary score high; unrelated texts score near zero.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

use super::{Embedder, EmbeddingError, EmbeddingVector};

pub const HASHING_MODEL_NAME: &str = "feature-hashing-v1";

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "can", "do", "does", "for", "from",
    "how", "i", "if", "in", "is", "it", "its", "me", "my", "of", "on", "or", "our", "so", "that",
    "the", "their", "there", "this", "to", "was", "we", "what", "when", "where", "which", "who",
    "why", "will", "with", "you", "your",
];

#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
    max_input_chars: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize, max_input_chars: usize) -> Self {
        Self {
            dimension: dimension.max(1),
            max_input_chars,
        }
    }

    fn tokens(text: &str) -> Vec<String> {
        let words: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(|w| w.to_lowercase())
            .collect();

        let content: Vec<String> = words
            .iter()
            .filter(|w| !STOPWORDS.contains(&w.as_str()))
            .cloned()
            .collect();

        // A question made only of stopwords still needs a vector
        if content.is_empty() {
            words
        } else {
            content
        }
    }

    fn bucket(&self, token: &str) -> usize {
        let digest = Sha256::digest(token.as_bytes());
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&digest[..8]);
        (u64::from_le_bytes(raw) % self.dimension as u64) as usize
    }

    /// Embed synchronously; the async trait method delegates here
    pub fn embed_sync(&self, text: &str) -> Result<EmbeddingVector, EmbeddingError> {
        let len = text.chars().count();
        if len > self.max_input_chars {
            return Err(EmbeddingError::InputTooLong {
                len,
                max: self.max_input_chars,
            });
        }

        let tokens = Self::tokens(text);
        if tokens.is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }

        let mut counts: HashMap<&str, u32> = HashMap::new();
        for token in &tokens {
            *counts.entry(token.as_str()).or_insert(0) += 1;
        }

        let mut data = vec![0.0f32; self.dimension];
        for (token, count) in counts {
            data[self.bucket(token)] += 1.0 + (count as f32).ln();
        }

        EmbeddingVector::new(data)
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(384, 8192)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector, EmbeddingError> {
        self.embed_sync(text)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        HASHING_MODEL_NAME
    }
}
