// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// RAG (Retrieval-Augmented Generation) pipeline
// Chunking, in-memory vector search, prompt assembly and query orchestration

pub mod chunker;
pub mod errors;
pub mod index;
pub mod orchestrator;
pub mod prompt;
pub mod retriever;

pub use chunker::{Chunk, Chunker, ChunkerError};
pub use errors::{IngestionError, RagError};
pub use index::{ChunkSearch, EmbeddingIndex, IndexEntry, IndexStats, RebuildReport, RetrievalResult, ScoredChunk};
pub use orchestrator::{Answer, IngestReport, QueryOptions, RagOrchestrator, RequestStage};
pub use prompt::{estimate_tokens, Citation, Prompt, PromptBuilder};
pub use retriever::Retriever;
