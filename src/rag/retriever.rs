// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use std::sync::Arc;
use tracing::debug;

use super::index::{ChunkSearch, RetrievalResult};
use crate::embeddings::EmbeddingError;

/// Top-K retrieval with an optional relevance floor
pub struct Retriever {
    index: Arc<dyn ChunkSearch>,
    top_k: usize,
    relevance_floor: Option<f32>,
}

impl Retriever {
    pub fn new(index: Arc<dyn ChunkSearch>, top_k: usize, relevance_floor: Option<f32>) -> Self {
        Self {
            index,
            top_k: top_k.max(1),
            relevance_floor,
        }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn relevance_floor(&self) -> Option<f32> {
        self.relevance_floor
    }

    /// Up to `k` chunks scoring at or above the floor
    pub async fn retrieve(&self, question: &str, k: usize) -> Result<RetrievalResult, EmbeddingError> {
        let mut result = self.index.search(question, k).await?;

        if let Some(floor) = self.relevance_floor {
            let before = result.len();
            result.results.retain(|r| r.similarity >= floor);
            if result.len() < before {
                debug!(
                    "Relevance floor {} removed {} of {} chunks",
                    floor,
                    before - result.len(),
                    before
                );
            }
        }

        Ok(result)
    }

    pub async fn retrieve_default(&self, question: &str) -> Result<RetrievalResult, EmbeddingError> {
        self.retrieve(question, self.top_k).await
    }
}
