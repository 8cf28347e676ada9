// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! In-memory embedding index
//!
//! Brute-force cosine search over every stored vector. Entries live in an
//! `Arc<Vec<_>>` behind a tokio `RwLock`: searches clone the `Arc` under the
//! read lock and scan without holding it, writers copy-on-write through
//! `Arc::make_mut`, and `rebuild` publishes a finished index with one swap.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::chunker::{Chunk, Chunker};
use super::errors::IngestionError;
use crate::embeddings::{Embedder, EmbeddingError, EmbeddingVector};
use crate::knowledge::Document;

#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub embedding: EmbeddingVector,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub similarity: f32,
}

/// Chunks ordered by descending similarity
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetrievalResult {
    pub results: Vec<ScoredChunk>,
}

impl RetrievalResult {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ScoredChunk> {
        self.results.iter()
    }
}

/// Summary of a rebuild or single-document upsert
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RebuildReport {
    pub documents_indexed: usize,
    pub chunks_indexed: usize,
    pub chunks_skipped: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub total_chunks: usize,
    pub total_sources: usize,
    pub dimension: usize,
    pub model: String,
    pub sources: Vec<String>,
}

/// Similarity search consumed by the retriever
#[async_trait]
pub trait ChunkSearch: Send + Sync {
    async fn search(&self, query: &str, k: usize) -> Result<RetrievalResult, EmbeddingError>;
}

pub struct EmbeddingIndex {
    entries: RwLock<Arc<Vec<IndexEntry>>>,
    embedder: Arc<dyn Embedder>,
}

impl EmbeddingIndex {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            entries: RwLock::new(Arc::new(Vec::new())),
            embedder,
        }
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    async fn snapshot(&self) -> Arc<Vec<IndexEntry>> {
        Arc::clone(&*self.entries.read().await)
    }

    async fn embed_checked(&self, text: &str) -> Result<EmbeddingVector, EmbeddingError> {
        let vector = self.embedder.embed(text).await?;
        let expected = self.embedder.dimension();
        if vector.dimension() != expected {
            return Err(EmbeddingError::DimensionMismatch {
                expected,
                actual: vector.dimension(),
            });
        }
        Ok(vector)
    }

    /// Embed a chunk with its heading context, falling back to the bare text
    /// when the prefixed form is over the embedder's input limit
    async fn embed_chunk(&self, chunk: &Chunk) -> Result<EmbeddingVector, EmbeddingError> {
        let text = chunk.embedding_text();
        match self.embed_checked(&text).await {
            Err(EmbeddingError::InputTooLong { .. }) if text.as_ref() != chunk.text => {
                self.embed_checked(&chunk.text).await
            }
            result => result,
        }
    }

    /// Embed and store one chunk
    pub async fn insert(&self, chunk: Chunk) -> Result<(), EmbeddingError> {
        let embedding = self.embed_chunk(&chunk).await?;
        let mut entries = self.entries.write().await;
        Arc::make_mut(&mut *entries).push(IndexEntry { chunk, embedding });
        Ok(())
    }

    async fn embed_document(
        &self,
        document: &Document,
        chunker: &Chunker,
        cancel: Option<&CancellationToken>,
        out: &mut Vec<IndexEntry>,
    ) -> Result<(usize, usize), IngestionError> {
        let mut indexed = 0;
        let mut skipped = 0;

        for chunk in chunker.chunk(document) {
            if cancel.map_or(false, |c| c.is_cancelled()) {
                return Err(IngestionError::Cancelled);
            }
            match self.embed_chunk(&chunk).await {
                Ok(embedding) => {
                    out.push(IndexEntry { chunk, embedding });
                    indexed += 1;
                }
                Err(e) => {
                    warn!(
                        "Skipping chunk {} of {}: {}",
                        chunk.index, chunk.document_id, e
                    );
                    skipped += 1;
                }
            }
        }

        Ok((indexed, skipped))
    }

    /// Replace the whole index with the chunks of `documents`
    ///
    /// The new index is built aside and swapped in at the end; a cancelled
    /// rebuild leaves the current index untouched.
    pub async fn rebuild(
        &self,
        documents: &[Document],
        chunker: &Chunker,
        cancel: &CancellationToken,
    ) -> Result<RebuildReport, IngestionError> {
        let mut fresh = Vec::new();
        let mut report = RebuildReport::default();

        for document in documents {
            let (indexed, skipped) = self
                .embed_document(document, chunker, Some(cancel), &mut fresh)
                .await?;
            debug!(
                "Indexed {} chunks from {} ({} skipped)",
                indexed, document.id, skipped
            );
            report.documents_indexed += 1;
            report.chunks_indexed += indexed;
            report.chunks_skipped += skipped;
        }

        if cancel.is_cancelled() {
            return Err(IngestionError::Cancelled);
        }

        *self.entries.write().await = Arc::new(fresh);
        info!(
            "Index rebuilt: {} documents, {} chunks, {} skipped",
            report.documents_indexed, report.chunks_indexed, report.chunks_skipped
        );

        Ok(report)
    }

    /// Replace every entry of one document id
    pub async fn upsert_document(&self, document: &Document, chunker: &Chunker) -> RebuildReport {
        let mut fresh = Vec::new();
        // No cancellation token, so this cannot fail
        let (indexed, skipped) = self
            .embed_document(document, chunker, None, &mut fresh)
            .await
            .unwrap_or((0, 0));

        let mut entries = self.entries.write().await;
        let entries = Arc::make_mut(&mut *entries);
        entries.retain(|e| e.chunk.document_id != document.id);
        entries.extend(fresh);

        RebuildReport {
            documents_indexed: 1,
            chunks_indexed: indexed,
            chunks_skipped: skipped,
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Distinct document ids, sorted
    pub async fn sources(&self) -> Vec<String> {
        let snapshot = self.snapshot().await;
        snapshot
            .iter()
            .map(|e| e.chunk.document_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub async fn chunk(&self, document_id: &str, index: usize) -> Option<Chunk> {
        let snapshot = self.snapshot().await;
        snapshot
            .iter()
            .find(|e| e.chunk.document_id == document_id && e.chunk.index == index)
            .map(|e| e.chunk.clone())
    }

    pub async fn stats(&self) -> IndexStats {
        let total_chunks = self.len().await;
        let sources = self.sources().await;
        IndexStats {
            total_chunks,
            total_sources: sources.len(),
            dimension: self.embedder.dimension(),
            model: self.embedder.model_name().to_string(),
            sources,
        }
    }

    /// Top `k` chunks by cosine similarity; ties keep insertion order
    pub async fn search(&self, query: &str, k: usize) -> Result<RetrievalResult, EmbeddingError> {
        let snapshot = self.snapshot().await;
        if snapshot.is_empty() || k == 0 {
            return Ok(RetrievalResult::default());
        }

        let query_vector = self.embed_checked(query).await?;

        let mut scored: Vec<(usize, f32)> = snapshot
            .iter()
            .enumerate()
            .map(|(i, entry)| (i, query_vector.cosine_similarity(&entry.embedding)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        Ok(RetrievalResult {
            results: scored
                .into_iter()
                .map(|(i, similarity)| ScoredChunk {
                    chunk: snapshot[i].chunk.clone(),
                    similarity,
                })
                .collect(),
        })
    }
}

#[async_trait]
impl ChunkSearch for EmbeddingIndex {
    async fn search(&self, query: &str, k: usize) -> Result<RetrievalResult, EmbeddingError> {
        EmbeddingIndex::search(self, query, k).await
    }
}
