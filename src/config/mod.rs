// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Environment-derived configuration for the RAG node

pub mod settings;

pub use settings::{
    ApiSettings, ChunkingConfig, EmbeddingBackend, EmbeddingSettings, LlmConfig, PromptConfig,
    RagConfig, RepositoryConfig, RetrievalConfig,
};
