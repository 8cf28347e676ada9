// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod api;
pub mod config;
pub mod embeddings;
pub mod knowledge;
pub mod llm;
pub mod rag;
pub mod sessions;
pub mod version;

// Re-export the types most callers wire together
pub use config::RagConfig;
pub use embeddings::{Embedder, EmbeddingError, EmbeddingVector, HashingEmbedder};
pub use knowledge::{
    DirectorySource, Document, DocumentFormat, DocumentSource, RepositorySource, StaticSource,
};
pub use llm::{ClaudeClient, GenerationError, LlmClient};
pub use rag::{
    Answer, Chunk, Chunker, EmbeddingIndex, IngestReport, IngestionError, Prompt, PromptBuilder,
    RagError, RagOrchestrator, RetrievalResult, Retriever,
};
pub use sessions::{Message, Role, Session, SessionError, SessionLimits, SessionStore};
