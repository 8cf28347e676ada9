// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Anthropic Messages API client

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{GenerationError, LlmClient};
use crate::rag::Prompt;

const ANTHROPIC_VERSION: &str = "2023-06-01";

// --- Messages API serde structs ---

#[derive(serde::Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<RequestMessage<'a>>,
}

#[derive(serde::Serialize)]
struct RequestMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(serde::Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: Option<Usage>,
}

#[derive(serde::Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(serde::Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(serde::Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(serde::Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Client for Claude models over the Messages API
pub struct ClaudeClient {
    client: Client,
    endpoint: String,
    api_key: String,
    model_name: String,
}

impl ClaudeClient {
    pub fn new(
        endpoint: &str,
        api_key: &str,
        model_name: &str,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        let endpoint = endpoint.trim_end_matches('/').to_string();
        info!(
            "Claude client configured: endpoint={}, model={}",
            endpoint, model_name
        );

        Ok(Self {
            client,
            endpoint,
            api_key: api_key.to_string(),
            model_name: model_name.to_string(),
        })
    }

    fn build_request<'a>(&'a self, prompt: &'a Prompt, max_tokens: u32) -> MessagesRequest<'a> {
        MessagesRequest {
            model: &self.model_name,
            max_tokens,
            system: prompt.system_text(),
            messages: prompt
                .messages()
                .into_iter()
                .map(|(role, content)| RequestMessage {
                    role: role.as_str(),
                    content,
                })
                .collect(),
        }
    }
}

fn extract_text(response: MessagesResponse) -> Result<String, GenerationError> {
    let text: String = response
        .content
        .into_iter()
        .filter(|block| block.kind == "text")
        .filter_map(|block| block.text)
        .collect::<Vec<_>>()
        .join("");

    let text = text.trim().to_string();
    if text.is_empty() {
        return Err(GenerationError::EmptyResponse);
    }
    Ok(text)
}

#[async_trait]
impl LlmClient for ClaudeClient {
    async fn generate(&self, prompt: &Prompt, max_tokens: u32) -> Result<String, GenerationError> {
        let request = self.build_request(prompt, max_tokens);

        let response = self
            .client
            .post(format!("{}/v1/messages", self.endpoint))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|b| b.error.message)
                .unwrap_or(body);
            warn!("Claude API returned {}: {}", status, message);
            return Err(GenerationError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Transport(format!("invalid response body: {}", e)))?;

        if let Some(usage) = &parsed.usage {
            debug!(
                "Claude usage: {} input tokens, {} output tokens",
                usage.input_tokens, usage.output_tokens
            );
        }

        extract_text(parsed)
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
