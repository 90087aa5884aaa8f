//! Storage backend trait and implementations.
//!
//! The content repository: resolves documents across knowledgebases, performs
//! backup-before-mutate writes and deletes, and renames a document when its
//! title changes.

pub mod backup;
pub mod local;
pub mod naming;

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::corpus::{Document, DocumentSummary, Knowledgebase, KnowledgebaseInfo};
use crate::error::Result;

/// Result of a successful write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteOutcome {
    /// Relative path the content now lives at.
    pub path: String,
    /// Previous relative path when a title change renamed the document.
    pub renamed_from: Option<String>,
    /// Bytes written.
    pub size: u64,
}

/// Trait for content repositories (local filesystem, etc.).
pub trait StorageBackend: Send + Sync {
    /// Get the content root for this backend.
    fn root(&self) -> &Path;

    /// Summaries of every document in scope, newest-modified first.
    ///
    /// `All` scans the root and each first-level subdirectory; `Named` scans
    /// only that directory.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown knowledgebase and `InvalidInput`
    /// for an unusable name.
    fn list_all(&self, kb: &Knowledgebase) -> Result<Vec<DocumentSummary>>;

    /// Read a full document by relative path.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the document does not exist.
    fn read(&self, relative_path: &str) -> Result<Document>;

    /// Write `content` under `name`, renaming when `title` changes.
    ///
    /// A path prefix in `name` wins over `knowledgebase`, which wins over the
    /// configured default.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for unusable names and `Io` if the write fails.
    fn write(
        &self,
        name: &str,
        content: &str,
        title: Option<&str>,
        knowledgebase: Option<&Knowledgebase>,
    ) -> Result<WriteOutcome>;

    /// Create a new document with generated frontmatter.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if a document with the derived filename exists.
    fn create(
        &self,
        title: &str,
        tags: &[String],
        body: &str,
        knowledgebase: Option<&Knowledgebase>,
    ) -> Result<WriteOutcome>;

    /// Back up and remove a document.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the document does not exist.
    fn delete(&self, relative_path: &str) -> Result<()>;

    /// Back up and replace an existing document at exactly `relative_path`,
    /// without renaming or re-sanitizing its filename. Returns bytes written.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the document does not exist and `Io` if the
    /// write fails.
    fn overwrite(&self, relative_path: &str, content: &str) -> Result<u64>;

    /// Named knowledgebases under the root.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the root cannot be read.
    fn knowledgebases(&self) -> Result<Vec<KnowledgebaseInfo>>;

    /// Directory backing a named knowledgebase (may not exist yet).
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an unusable name.
    fn knowledgebase_dir(&self, name: &str) -> Result<PathBuf>;

    /// Store raw bytes as `filename` in a knowledgebase, backing up any
    /// existing file first. Used by archive import.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for unusable names and `Io` if the write fails.
    fn store_file(&self, knowledgebase: &str, filename: &str, content: &[u8]) -> Result<u64>;
}
