// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Remote repository mirrored into the knowledge directory
//!
//! The listing URL returns either the repository tree as JSON or an HTML page
//! whose last `application/json` script carries it. Each listed file is
//! downloaded from `raw_content_url + path` and written into the target
//! directory unless a file with that name is already there. Loading then
//! reads the directory like `DirectorySource`.

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::source::{DirectorySource, DocumentSource, SourceLoad};
use crate::rag::errors::IngestionError;

const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(serde::Deserialize)]
struct TreeListing {
    payload: TreePayload,
}

#[derive(serde::Deserialize)]
struct TreePayload {
    tree: Tree,
}

#[derive(serde::Deserialize)]
struct Tree {
    items: Vec<TreeItem>,
}

/// One entry of the repository listing
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct TreeItem {
    pub name: String,
    pub path: String,
    #[serde(rename = "contentType", default)]
    pub content_type: Option<String>,
}

impl TreeItem {
    fn is_directory(&self) -> bool {
        self.content_type.as_deref() == Some("directory")
    }
}

/// Result of mirroring the repository into the target directory
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Files written by this sync
    pub saved: usize,
    /// Files left untouched because they already existed
    pub existing: usize,
    /// Files that could not be fetched or written
    pub failures: Vec<IngestionError>,
}

/// Document source backed by a remote file listing
pub struct RepositorySource {
    client: Client,
    list_url: String,
    raw_content_url: String,
    directory: DirectorySource,
}

impl RepositorySource {
    pub fn new(
        list_url: &str,
        raw_content_url: &str,
        target_dir: impl Into<PathBuf>,
    ) -> Result<Self, IngestionError> {
        Self::with_timeout(list_url, raw_content_url, target_dir, DEFAULT_FETCH_TIMEOUT)
    }

    pub fn with_timeout(
        list_url: &str,
        raw_content_url: &str,
        target_dir: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Result<Self, IngestionError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IngestionError::SourceUnavailable(e.to_string()))?;

        Ok(Self {
            client,
            list_url: list_url.to_string(),
            raw_content_url: raw_content_url.to_string(),
            directory: DirectorySource::new(target_dir),
        })
    }

    pub fn target_dir(&self) -> &Path {
        self.directory.root()
    }

    /// Fetch the repository listing
    pub async fn list_files(&self) -> Result<Vec<TreeItem>, IngestionError> {
        let unavailable =
            |reason: String| IngestionError::SourceUnavailable(format!("{}: {}", self.list_url, reason));

        let response = self
            .client
            .get(&self.list_url)
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(unavailable(format!("HTTP {}", status.as_u16())));
        }

        let body = response.text().await.map_err(|e| unavailable(e.to_string()))?;
        let items = parse_listing(&body).map_err(unavailable)?;

        Ok(items.into_iter().filter(|item| !item.is_directory()).collect())
    }

    async fn fetch_content(&self, item: &TreeItem) -> Result<String, IngestionError> {
        let unreadable = |reason: String| IngestionError::Unreadable {
            document_id: item.name.clone(),
            reason,
        };

        let response = self
            .client
            .get(format!("{}{}", self.raw_content_url, item.path))
            .send()
            .await
            .map_err(|e| unreadable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(unreadable(format!("HTTP {}", status.as_u16())));
        }

        response.text().await.map_err(|e| unreadable(e.to_string()))
    }

    /// Write `content` as a new file; `Ok(false)` when the name is taken
    async fn save_new(&self, name: &str, content: &str) -> Result<bool, IngestionError> {
        let path = self.target_dir().join(name);
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await;

        let mut file = match file {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => {
                return Err(IngestionError::Unreadable {
                    document_id: name.to_string(),
                    reason: e.to_string(),
                })
            }
        };

        let written = async {
            file.write_all(content.as_bytes()).await?;
            file.flush().await
        }
        .await;

        if let Err(e) = written {
            // Drop the partial file so the next sync retries it
            let _ = tokio::fs::remove_file(&path).await;
            return Err(IngestionError::Unreadable {
                document_id: name.to_string(),
                reason: e.to_string(),
            });
        }

        debug!("Saved {}", path.display());
        Ok(true)
    }

    /// Download every listed file that is not already in the target directory
    pub async fn sync(&self) -> Result<SyncReport, IngestionError> {
        let items = self.list_files().await?;

        tokio::fs::create_dir_all(self.target_dir())
            .await
            .map_err(|e| {
                IngestionError::SourceUnavailable(format!("{}: {}", self.target_dir().display(), e))
            })?;

        let mut report = SyncReport::default();
        for item in items {
            if !is_plain_file_name(&item.name) {
                warn!("Skipping listed file with unsafe name {:?}", item.name);
                report.failures.push(IngestionError::Unreadable {
                    document_id: item.name.clone(),
                    reason: "file name is not a plain file name".to_string(),
                });
                continue;
            }

            if tokio::fs::try_exists(self.target_dir().join(&item.name))
                .await
                .unwrap_or(false)
            {
                report.existing += 1;
                continue;
            }

            let saved = match self.fetch_content(&item).await {
                Ok(content) => self.save_new(&item.name, &content).await,
                Err(e) => Err(e),
            };
            match saved {
                Ok(true) => report.saved += 1,
                Ok(false) => report.existing += 1,
                Err(e) => {
                    warn!("Failed to mirror {}: {}", item.path, e);
                    report.failures.push(e);
                }
            }
        }

        info!(
            "Saved {} files; {} already existed ({} failures)",
            report.saved,
            report.existing,
            report.failures.len()
        );
        Ok(report)
    }
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
}

/// Extract the tree items from a JSON listing or an HTML page embedding one
fn parse_listing(body: &str) -> Result<Vec<TreeItem>, String> {
    let json = if body.trim_start().starts_with('{') {
        body.to_string()
    } else {
        let script = Regex::new(r#"(?s)<script[^>]*type="application/json"[^>]*>(.*?)</script>"#)
            .map_err(|e| e.to_string())?;
        script
            .captures_iter(body)
            .last()
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| "no JSON script found in listing".to_string())?
    };

    serde_json::from_str::<TreeListing>(&json)
        .map(|listing| listing.payload.tree.items)
        .map_err(|e| format!("no file tree in listing: {}", e))
}

#[async_trait]
impl DocumentSource for RepositorySource {
    async fn load(&self) -> Result<SourceLoad, IngestionError> {
        let report = self.sync().await?;
        let mut load = self.directory.load().await?;
        load.failures.extend(report.failures);
        Ok(load)
    }

    fn describe(&self) -> String {
        format!(
            "repository {} mirrored into {}",
            self.list_url,
            self.target_dir().display()
        )
    }
}
