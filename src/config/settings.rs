// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Configuration for the RAG pipeline
//!
//! Every value has a default so the node starts with nothing but an API key.
//! `RagConfig::from_env` is expected to run after `dotenv` has loaded `.env`.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::sessions::SessionLimits;

/// Default Claude model used for generation
pub const DEFAULT_CLAUDE_MODEL: &str = "claude-3-5-haiku-latest";

/// Default Anthropic API base URL
pub const DEFAULT_ANTHROPIC_API_URL: &str = "https://api.anthropic.com";

/// Which embedder backs the index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingBackend {
    /// Deterministic feature-hashing embedder (no model files)
    Hashing,
    /// ONNX sentence transformer (requires the `onnx` feature)
    Onnx,
}

impl FromStr for EmbeddingBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hashing" | "hash" => Ok(EmbeddingBackend::Hashing),
            "onnx" => Ok(EmbeddingBackend::Onnx),
            other => Err(format!("Unknown embedding backend: {}", other)),
        }
    }
}

/// LLM client settings
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Model identifier sent to the API
    pub model: String,
    /// Maximum tokens to generate per answer
    pub max_tokens: u32,
    /// API key (required at startup, not by the core)
    pub api_key: Option<String>,
    /// API base URL
    pub api_url: String,
    /// Deadline for a single generation call in milliseconds
    pub timeout_ms: u64,
}

/// Embedding model settings
#[derive(Debug, Clone)]
pub struct EmbeddingSettings {
    pub backend: EmbeddingBackend,
    /// Path to ONNX model file (onnx backend only)
    pub model_path: Option<String>,
    /// Path to tokenizer JSON file (onnx backend only)
    pub tokenizer_path: Option<String>,
    /// Output dimension of the embedder
    pub dimension: usize,
    /// Longest text accepted by the embedder, in characters
    pub max_input_chars: usize,
}

/// Chunker settings
#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks
    pub chunk_overlap: usize,
}

/// Retriever settings
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// Default number of chunks retrieved per question
    pub top_k: usize,
    /// Minimum cosine similarity for a chunk to be used
    pub similarity_threshold: Option<f32>,
}

/// Prompt assembly settings
#[derive(Debug, Clone)]
pub struct PromptConfig {
    /// Most recent messages carried into the prompt
    pub history_window: usize,
    /// Upper bound on the rendered prompt, in estimated tokens
    pub token_budget: usize,
}

/// Remote repository mirrored into the knowledge directory before ingest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryConfig {
    /// Page or JSON document listing the repository files
    pub list_url: String,
    /// Prefix joined with each listed file path to fetch its raw content
    pub raw_content_url: String,
}

/// HTTP listener settings
#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub host: String,
    pub port: u16,
}

/// Top-level node configuration
#[derive(Debug, Clone)]
pub struct RagConfig {
    /// Directory holding the markdown knowledge sources
    pub kb_directory: PathBuf,
    pub llm: LlmConfig,
    pub embedding: EmbeddingSettings,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub prompt: PromptConfig,
    /// Session cap; `None` leaves the store unbounded
    pub max_sessions: Option<usize>,
    /// Idle time after which sessions may be purged; `None` disables expiry
    pub session_idle_ttl_secs: Option<u64>,
    /// Remote source synced into `kb_directory`; `None` reads the directory only
    pub repository: Option<RepositoryConfig>,
    pub api: ApiSettings,
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

impl RagConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            kb_directory: env::var("KB_DIRECTORY")
                .map(PathBuf::from)
                .unwrap_or(defaults.kb_directory),
            llm: LlmConfig {
                model: env::var("CLAUDE_MODEL").unwrap_or(defaults.llm.model),
                max_tokens: env_parse("CLAUDE_MAX_TOKENS").unwrap_or(defaults.llm.max_tokens),
                api_key: env::var("ANTHROPIC_API_KEY")
                    .ok()
                    .filter(|k| !k.trim().is_empty()),
                api_url: env::var("ANTHROPIC_API_URL").unwrap_or(defaults.llm.api_url),
                timeout_ms: env_parse("LLM_TIMEOUT_MS").unwrap_or(defaults.llm.timeout_ms),
            },
            embedding: EmbeddingSettings {
                backend: env_parse("EMBEDDING_BACKEND").unwrap_or(defaults.embedding.backend),
                model_path: env::var("EMBEDDING_MODEL_PATH").ok(),
                tokenizer_path: env::var("EMBEDDING_TOKENIZER_PATH").ok(),
                dimension: env_parse("EMBEDDING_DIMENSION").unwrap_or(defaults.embedding.dimension),
                max_input_chars: env_parse("EMBEDDING_MAX_INPUT_CHARS")
                    .unwrap_or(defaults.embedding.max_input_chars),
            },
            chunking: ChunkingConfig {
                chunk_size: env_parse("EMBEDDING_MODEL_CHUNK_SIZE")
                    .unwrap_or(defaults.chunking.chunk_size),
                chunk_overlap: env_parse("EMBEDDING_MODEL_CHUNK_OVERLAP")
                    .unwrap_or(defaults.chunking.chunk_overlap),
            },
            retrieval: RetrievalConfig {
                top_k: env_parse("DEFAULT_TOP_K").unwrap_or(defaults.retrieval.top_k),
                similarity_threshold: match env::var("DEFAULT_SIMILARITY_THRESHOLD") {
                    // "none" turns the floor off entirely
                    Ok(v) if v.trim().eq_ignore_ascii_case("none") => None,
                    Ok(v) => v
                        .trim()
                        .parse()
                        .ok()
                        .or(defaults.retrieval.similarity_threshold),
                    Err(_) => defaults.retrieval.similarity_threshold,
                },
            },
            prompt: PromptConfig {
                history_window: env_parse("HISTORY_WINDOW")
                    .unwrap_or(defaults.prompt.history_window),
                token_budget: env_parse("PROMPT_TOKEN_BUDGET")
                    .unwrap_or(defaults.prompt.token_budget),
            },
            max_sessions: env_parse("MAX_SESSIONS"),
            session_idle_ttl_secs: env_parse("SESSION_IDLE_TTL_SECS"),
            repository: Self::repository_from_env(),
            api: ApiSettings {
                host: env::var("API_HOST").unwrap_or(defaults.api.host),
                port: env_parse("API_PORT").unwrap_or(defaults.api.port),
            },
        }
    }

    // Half-configured repositories are kept so `validate` can report them
    fn repository_from_env() -> Option<RepositoryConfig> {
        let list_url = env::var("REPOSITORY_URL").ok().filter(|v| !v.trim().is_empty());
        let raw_content_url = env::var("RAW_CONTENT_URL")
            .ok()
            .filter(|v| !v.trim().is_empty());
        if list_url.is_none() && raw_content_url.is_none() {
            return None;
        }
        Some(RepositoryConfig {
            list_url: list_url.unwrap_or_default(),
            raw_content_url: raw_content_url.unwrap_or_default(),
        })
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.chunking.chunk_size == 0 {
            return Err("Chunk size must be greater than 0".to_string());
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(format!(
                "Chunk overlap ({}) must be smaller than chunk size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            ));
        }
        if self.retrieval.top_k == 0 {
            return Err("Top-K must be at least 1".to_string());
        }
        if let Some(threshold) = self.retrieval.similarity_threshold {
            if !(-1.0..=1.0).contains(&threshold) {
                return Err(format!(
                    "Similarity threshold must be within [-1, 1], got {}",
                    threshold
                ));
            }
        }
        if self.prompt.token_budget == 0 {
            return Err("Prompt token budget must be greater than 0".to_string());
        }
        if self.llm.max_tokens == 0 {
            return Err("Max generation tokens must be greater than 0".to_string());
        }
        if self.llm.timeout_ms == 0 {
            return Err("LLM timeout must be greater than 0".to_string());
        }
        if self.embedding.dimension == 0 {
            return Err("Embedding dimension must be greater than 0".to_string());
        }
        if self.embedding.max_input_chars < self.chunking.chunk_size {
            return Err(format!(
                "Embedding input limit ({}) is smaller than chunk size ({})",
                self.embedding.max_input_chars, self.chunking.chunk_size
            ));
        }
        if self.embedding.backend == EmbeddingBackend::Onnx
            && (self.embedding.model_path.is_none() || self.embedding.tokenizer_path.is_none())
        {
            return Err(
                "ONNX backend requires EMBEDDING_MODEL_PATH and EMBEDDING_TOKENIZER_PATH"
                    .to_string(),
            );
        }
        if self.max_sessions == Some(0) {
            return Err("MAX_SESSIONS must be greater than 0 when set".to_string());
        }
        if self.session_idle_ttl_secs == Some(0) {
            return Err("SESSION_IDLE_TTL_SECS must be greater than 0 when set".to_string());
        }
        if let Some(repository) = &self.repository {
            if repository.list_url.is_empty() || repository.raw_content_url.is_empty() {
                return Err("REPOSITORY_URL and RAW_CONTENT_URL must be set together".to_string());
            }
            for url in [&repository.list_url, &repository.raw_content_url] {
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(format!("Repository URL must be http(s): {}", url));
                }
            }
        }
        Ok(())
    }

    /// Generation deadline as a `Duration`
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_millis(self.llm.timeout_ms)
    }

    /// Session eviction limits derived from the configuration
    pub fn session_limits(&self) -> SessionLimits {
        SessionLimits {
            max_sessions: self.max_sessions,
            idle_ttl: self.session_idle_ttl_secs.map(Duration::from_secs),
        }
    }
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            kb_directory: PathBuf::from(".knowledge_sources"),
            llm: LlmConfig {
                model: DEFAULT_CLAUDE_MODEL.to_string(),
                max_tokens: 1024,
                api_key: None,
                api_url: DEFAULT_ANTHROPIC_API_URL.to_string(),
                timeout_ms: 30_000,
            },
            embedding: EmbeddingSettings {
                backend: EmbeddingBackend::Hashing,
                model_path: None,
                tokenizer_path: None,
                dimension: 384,
                max_input_chars: 8192,
            },
            chunking: ChunkingConfig {
                chunk_size: 1000,
                chunk_overlap: 200,
            },
            retrieval: RetrievalConfig {
                top_k: 3,
                similarity_threshold: Some(0.2),
            },
            prompt: PromptConfig {
                history_window: 10,
                token_budget: 4000,
            },
            max_sessions: None,
            session_idle_ttl_secs: None,
            repository: None,
            api: ApiSettings {
                host: "127.0.0.1".to_string(),
                port: 8000,
            },
        }
    }
}
