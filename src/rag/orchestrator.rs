// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Question answering pipeline
//!
//! Each query walks RETRIEVING -> PROMPTING -> GENERATING -> RECORDING -> DONE.
//! Any failure moves to ERROR and returns a typed `RagError`; the session store
//! is only written in RECORDING, after the model has answered.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::chunker::Chunker;
use super::errors::{IngestionError, RagError};
use super::index::{EmbeddingIndex, IndexStats};
use super::prompt::{Citation, PromptBuilder};
use super::retriever::Retriever;
use crate::config::RagConfig;
use crate::embeddings::Embedder;
use crate::knowledge::DocumentSource;
use crate::llm::{GenerationError, LlmClient};
use crate::sessions::{Message, SessionStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStage {
    Retrieving,
    Prompting,
    Generating,
    Recording,
    Done,
    Error,
}

impl fmt::Display for RequestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestStage::Retrieving => "RETRIEVING",
            RequestStage::Prompting => "PROMPTING",
            RequestStage::Generating => "GENERATING",
            RequestStage::Recording => "RECORDING",
            RequestStage::Done => "DONE",
            RequestStage::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// Successful answer to one question
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub session_id: String,
    pub answer: String,
    pub sources: Vec<Citation>,
}

/// Outcome of an ingestion run
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub documents_indexed: usize,
    pub chunks_indexed: usize,
    pub chunks_skipped: usize,
    pub failures: Vec<IngestionError>,
}

/// Per-request knobs
#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub history_window: usize,
    pub max_tokens: u32,
    pub generation_timeout: Duration,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            history_window: 10,
            max_tokens: 1024,
            generation_timeout: Duration::from_secs(30),
        }
    }
}

pub struct RagOrchestrator {
    index: Arc<EmbeddingIndex>,
    sessions: Arc<SessionStore>,
    retriever: Retriever,
    prompt_builder: PromptBuilder,
    chunker: Chunker,
    llm: Arc<dyn LlmClient>,
    options: QueryOptions,
    ingest_lock: Mutex<()>,
}

impl RagOrchestrator {
    pub fn new(
        index: Arc<EmbeddingIndex>,
        sessions: Arc<SessionStore>,
        retriever: Retriever,
        prompt_builder: PromptBuilder,
        chunker: Chunker,
        llm: Arc<dyn LlmClient>,
        options: QueryOptions,
    ) -> Self {
        Self {
            index,
            sessions,
            retriever,
            prompt_builder,
            chunker,
            llm,
            options,
            ingest_lock: Mutex::new(()),
        }
    }

    /// Wire a fresh index, session store and pipeline from configuration
    pub fn from_config(
        config: &RagConfig,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LlmClient>,
    ) -> Result<Self, RagError> {
        config.validate().map_err(RagError::Configuration)?;

        let chunker = Chunker::new(config.chunking.chunk_size, config.chunking.chunk_overlap)
            .map_err(|e| RagError::Configuration(e.to_string()))?;
        let index = Arc::new(EmbeddingIndex::new(embedder));
        let sessions = Arc::new(SessionStore::new(config.session_limits()));
        let retriever = Retriever::new(
            index.clone(),
            config.retrieval.top_k,
            config.retrieval.similarity_threshold,
        );

        Ok(Self::new(
            index,
            sessions,
            retriever,
            PromptBuilder::new(config.prompt.token_budget),
            chunker,
            llm,
            QueryOptions {
                history_window: config.prompt.history_window,
                max_tokens: config.llm.max_tokens,
                generation_timeout: config.generation_timeout(),
            },
        ))
    }

    pub fn index(&self) -> &Arc<EmbeddingIndex> {
        &self.index
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn chunker(&self) -> &Chunker {
        &self.chunker
    }

    pub fn llm_model(&self) -> &str {
        self.llm.model_name()
    }

    pub async fn stats(&self) -> IndexStats {
        self.index.stats().await
    }

    pub async fn history(&self, session_id: &str) -> Option<Vec<Message>> {
        self.sessions.get(session_id).await.map(|s| s.messages)
    }

    fn enter(session_id: &str, stage: RequestStage) {
        debug!(session_id = %session_id, stage = %stage, "query stage");
    }

    /// Answer `question` within `session_id`
    pub async fn query(&self, session_id: &str, question: &str) -> Result<Answer, RagError> {
        let result = self.run_query(session_id, question).await;
        match &result {
            Ok(answer) => {
                Self::enter(session_id, RequestStage::Done);
                info!(
                    "Answered question in session {} with {} sources",
                    session_id,
                    answer.sources.len()
                );
            }
            Err(e) => {
                Self::enter(session_id, RequestStage::Error);
                warn!("Query failed in session {}: {}", session_id, e);
            }
        }
        result
    }

    async fn run_query(&self, session_id: &str, question: &str) -> Result<Answer, RagError> {
        if question.trim().is_empty() {
            return Err(RagError::InvalidRequest(
                "Question must not be empty".to_string(),
            ));
        }
        if session_id.trim().is_empty() {
            return Err(RagError::Session(crate::sessions::SessionError::EmptyId));
        }

        Self::enter(session_id, RequestStage::Retrieving);
        let retrieval = self
            .retriever
            .retrieve_default(question)
            .await
            .map_err(RagError::QueryEmbedding)?;

        Self::enter(session_id, RequestStage::Prompting);
        let history = self
            .sessions
            .history(session_id, self.options.history_window)
            .await;
        let prompt = self.prompt_builder.build(question, &retrieval, &history);

        Self::enter(session_id, RequestStage::Generating);
        let timeout = self.options.generation_timeout;
        let answer = match tokio::time::timeout(
            timeout,
            self.llm.generate(&prompt, self.options.max_tokens),
        )
        .await
        {
            Err(_) => {
                return Err(RagError::GenerationTimeout {
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
            Ok(result) => result?,
        };
        if answer.trim().is_empty() {
            return Err(RagError::Generation(GenerationError::EmptyResponse));
        }

        Self::enter(session_id, RequestStage::Recording);
        self.sessions
            .append_turn(session_id, question, answer.clone())
            .await?;

        Ok(Answer {
            session_id: session_id.to_string(),
            answer,
            sources: prompt.sources,
        })
    }

    /// Rebuild the index from `source`; concurrent calls run one at a time
    pub async fn ingest(
        &self,
        source: &dyn DocumentSource,
        cancel: &CancellationToken,
    ) -> Result<IngestReport, RagError> {
        let _guard = self.ingest_lock.lock().await;
        info!("Ingesting from {}", source.describe());

        let load = source.load().await?;
        let rebuilt = self
            .index
            .rebuild(&load.documents, &self.chunker, cancel)
            .await?;

        Ok(IngestReport {
            documents_indexed: rebuilt.documents_indexed,
            chunks_indexed: rebuilt.chunks_indexed,
            chunks_skipped: rebuilt.chunks_skipped,
            failures: load.failures,
        })
    }
}
