// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Format tag attached to every ingested document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    Markdown,
    PlainText,
}

impl DocumentFormat {
    /// Detect the format from a file extension (case-insensitive)
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "md" | "markdown" => Some(DocumentFormat::Markdown),
            "txt" => Some(DocumentFormat::PlainText),
            _ => None,
        }
    }
}

/// A raw source document
///
/// Documents are never edited in place. Re-ingesting the same `id` replaces the
/// previous version wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Source identifier (file name or URL)
    pub id: String,
    pub text: String,
    pub format: DocumentFormat,
}

impl Document {
    pub fn new(id: impl Into<String>, text: impl Into<String>, format: DocumentFormat) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            format,
        }
    }

    pub fn markdown(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(id, text, DocumentFormat::Markdown)
    }

    pub fn plain(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(id, text, DocumentFormat::PlainText)
    }
}
