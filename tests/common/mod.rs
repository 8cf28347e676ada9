// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Shared fixtures for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use faq_rag_node::{
    config::RagConfig,
    embeddings::{Embedder, EmbeddingError, EmbeddingVector, HashingEmbedder},
    llm::{GenerationError, LlmClient},
    rag::{Prompt, RagOrchestrator},
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Scripted LLM that records every prompt it receives
pub struct MockLlm {
    reply: Result<String, GenerationError>,
    delay: Option<Duration>,
    prompts: Mutex<Vec<String>>,
}

impl MockLlm {
    pub fn answering(text: &str) -> Self {
        Self {
            reply: Ok(text.to_string()),
            delay: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(err: GenerationError) -> Self {
        Self {
            reply: Err(err),
            delay: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn slow(text: &str, delay: Duration) -> Self {
        Self {
            reply: Ok(text.to_string()),
            delay: Some(delay),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn generate(&self, prompt: &Prompt, _max_tokens: u32) -> Result<String, GenerationError> {
        self.prompts.lock().unwrap().push(prompt.text().to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.reply.clone()
    }

    fn model_name(&self) -> &str {
        "mock-llm"
    }
}

/// Hashing embedder that refuses any text containing a marker word
pub struct FlakyEmbedder {
    inner: HashingEmbedder,
    marker: String,
}

impl FlakyEmbedder {
    pub fn new(marker: &str) -> Self {
        Self {
            inner: HashingEmbedder::default(),
            marker: marker.to_string(),
        }
    }
}

#[async_trait]
impl Embedder for FlakyEmbedder {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector, EmbeddingError> {
        if text.contains(&self.marker) {
            return Err(EmbeddingError::Backend("model unavailable".to_string()));
        }
        self.inner.embed(text).await
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn model_name(&self) -> &str {
        "flaky"
    }
}

pub fn test_config() -> RagConfig {
    let mut config = RagConfig::default();
    config.retrieval.similarity_threshold = Some(0.1);
    config.llm.timeout_ms = 2_000;
    config
}

pub fn orchestrator_with(config: &RagConfig, llm: Arc<MockLlm>) -> RagOrchestrator {
    RagOrchestrator::from_config(config, Arc::new(HashingEmbedder::default()), llm)
        .expect("test config is valid")
}
