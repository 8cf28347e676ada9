// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Document sources feeding ingestion
//!
//! A source returns every document it could read together with one
//! `IngestionError` per document it could not. Only a source that cannot be
//! opened at all fails the whole load.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::document::{Document, DocumentFormat};
use crate::rag::errors::IngestionError;

/// Outcome of loading a document source
#[derive(Debug, Default)]
pub struct SourceLoad {
    pub documents: Vec<Document>,
    pub failures: Vec<IngestionError>,
}

/// Anything that can produce the document set for a rebuild
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn load(&self) -> Result<SourceLoad, IngestionError>;

    /// Human-readable description used in logs
    fn describe(&self) -> String;
}

const DEFAULT_PARALLEL_READS: usize = 8;

/// Reads `.md`, `.markdown` and `.txt` files from one directory (non-recursive)
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
    parallel_reads: usize,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            parallel_reads: DEFAULT_PARALLEL_READS,
        }
    }

    /// Limit how many files are read at once
    pub fn with_parallel_reads(mut self, parallel_reads: usize) -> Self {
        self.parallel_reads = parallel_reads.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn read_document(path: &Path, id: String) -> Result<Document, IngestionError> {
        let format =
            DocumentFormat::from_path(path).ok_or_else(|| IngestionError::UnsupportedFormat {
                document_id: id.clone(),
            })?;

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| IngestionError::Unreadable {
                document_id: id.clone(),
                reason: e.to_string(),
            })?;

        let text = String::from_utf8(bytes).map_err(|_| IngestionError::InvalidUtf8 {
            document_id: id.clone(),
        })?;

        Ok(Document::new(id, text, format))
    }
}

#[async_trait]
impl DocumentSource for DirectorySource {
    async fn load(&self) -> Result<SourceLoad, IngestionError> {
        let mut entries = tokio::fs::read_dir(&self.root).await.map_err(|e| {
            IngestionError::SourceUnavailable(format!("{}: {}", self.root.display(), e))
        })?;

        let mut files = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    return Err(IngestionError::SourceUnavailable(format!(
                        "{}: {}",
                        self.root.display(),
                        e
                    )))
                }
            };

            let path = entry.path();
            let is_file = match entry.file_type().await {
                Ok(ft) => ft.is_file(),
                Err(_) => path.is_file(),
            };
            if !is_file {
                continue;
            }

            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            files.push((name, path));
        }

        files.sort_by(|a, b| a.0.cmp(&b.0));

        // `buffered` keeps the sorted order while reading ahead
        let results: Vec<Result<Document, IngestionError>> = stream::iter(files)
            .map(|(name, path)| async move { Self::read_document(&path, name).await })
            .buffered(self.parallel_reads)
            .collect()
            .await;

        let mut load = SourceLoad::default();
        for result in results {
            match result {
                Ok(doc) => {
                    debug!("Loaded document {} ({} chars)", doc.id, doc.text.len());
                    load.documents.push(doc);
                }
                Err(e) => {
                    warn!("Skipping document: {}", e);
                    load.failures.push(e);
                }
            }
        }

        info!(
            "Loaded {} documents from {} ({} failures)",
            load.documents.len(),
            self.root.display(),
            load.failures.len()
        );

        Ok(load)
    }

    fn describe(&self) -> String {
        format!("directory {}", self.root.display())
    }
}

/// Fixed in-memory document set
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    documents: Vec<Document>,
}

impl StaticSource {
    pub fn new(documents: Vec<Document>) -> Self {
        Self { documents }
    }
}

#[async_trait]
impl DocumentSource for StaticSource {
    async fn load(&self) -> Result<SourceLoad, IngestionError> {
        Ok(SourceLoad {
            documents: self.documents.clone(),
            failures: Vec::new(),
        })
    }

    fn describe(&self) -> String {
        format!("static source ({} documents)", self.documents.len())
    }
}
