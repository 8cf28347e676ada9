// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! LLM generation capability

pub mod claude;

use async_trait::async_trait;
use thiserror::Error;

use crate::rag::Prompt;

pub use claude::ClaudeClient;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    /// Non-success status from the LLM API
    #[error("LLM API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("LLM transport error: {0}")]
    Transport(String),

    #[error("LLM returned an empty response")]
    EmptyResponse,
}

/// Narrow interface to whatever model produces answers
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, prompt: &Prompt, max_tokens: u32) -> Result<String, GenerationError>;

    fn model_name(&self) -> &str;
}
