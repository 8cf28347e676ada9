// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Version information for the FAQ RAG node

/// Full version string with feature description
pub const VERSION: &str = "v1.0.0-faq-rag-2025-10-16";

/// Semantic version number
pub const VERSION_NUMBER: &str = "1.0.0";

/// Build date
pub const BUILD_DATE: &str = "2025-10-16";

/// Supported features in this version
pub const FEATURES: &[&str] = &[
    "markdown-chunking",
    "chunk-overlap",
    "cosine-search",
    "relevance-floor",
    "session-history",
    "prompt-token-budget",
    "generation-timeout",
    "atomic-reindex",
    "repository-sync",
];

/// Features of this build, including those behind cargo features
pub fn enabled_features() -> Vec<&'static str> {
    #[allow(unused_mut)]
    let mut features = FEATURES.to_vec();
    #[cfg(feature = "onnx")]
    features.push("onnx-embeddings");
    features
}

/// Get formatted version string for logging
pub fn get_version_string() -> String {
    format!("FAQ RAG Node {} ({})", VERSION_NUMBER, BUILD_DATE)
}

/// Get full version info for API responses
pub fn get_version_info() -> serde_json::Value {
    serde_json::json!({
        "version": VERSION_NUMBER,
        "build": VERSION,
        "date": BUILD_DATE,
        "features": enabled_features(),
    })
}
