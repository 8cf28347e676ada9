// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Knowledge documents and the sources that load them

pub mod document;
pub mod remote;
pub mod source;

pub use document::{Document, DocumentFormat};
pub use remote::{RepositorySource, SyncReport};
pub use source::{DirectorySource, DocumentSource, SourceLoad, StaticSource};
