//! Document and knowledgebase types.

pub mod frontmatter;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::corpus::frontmatter::Metadata;

/// Sentinel name meaning "every knowledgebase".
pub const ROOT_KNOWLEDGEBASE: &str = "root";

/// Document file extension, without the dot.
pub const MARKDOWN_EXTENSION: &str = "md";

/// Which part of the content tree an operation looks at.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Knowledgebase {
    /// The content root plus every single-level subdirectory.
    #[default]
    All,
    /// One named subdirectory of the content root.
    Named(String),
}

impl Knowledgebase {
    /// Interpret a user-supplied name. Empty and `root` select everything.
    #[must_use]
    pub fn from_name(name: Option<&str>) -> Self {
        match name.map(str::trim) {
            None | Some("") => Self::All,
            Some(n) if n.eq_ignore_ascii_case(ROOT_KNOWLEDGEBASE) => Self::All,
            Some(n) => Self::Named(n.to_string()),
        }
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::All => None,
            Self::Named(n) => Some(n),
        }
    }
}

impl fmt::Display for Knowledgebase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str(ROOT_KNOWLEDGEBASE),
            Self::Named(n) => f.write_str(n),
        }
    }
}

/// Document metadata without the body, as returned by listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSummary {
    /// Path relative to the content root (`kb/name.md` or `name.md`).
    pub path: String,
    /// File name including the `.md` extension.
    pub filename: String,
    /// Owning knowledgebase; `None` for documents at the content root.
    pub knowledgebase: Option<String>,
    /// Frontmatter title, else derived from the filename.
    pub title: String,
    pub tags: Vec<String>,
    /// Optional `description` frontmatter field.
    pub description: Option<String>,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// A full document with its parsed metadata and body.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    #[serde(flatten)]
    pub summary: DocumentSummary,
    pub metadata: Metadata,
    /// Markdown excluding the metadata block.
    pub body: String,
    /// The file content exactly as stored.
    pub raw: String,
}

/// Human-readable information about a knowledgebase directory.
#[derive(Debug, Clone, Serialize)]
pub struct KnowledgebaseInfo {
    pub name: String,
    pub display_name: String,
    pub document_count: usize,
}

/// Title shown for a file with no frontmatter title: the name minus `.md`.
#[must_use]
pub fn title_from_filename(filename: &str) -> String {
    let base = filename.rsplit('/').next().unwrap_or(filename);
    base.strip_suffix(".md").unwrap_or(base).to_string()
}

/// Knowledgebase a relative path belongs to (its first segment, if any).
#[must_use]
pub fn knowledgebase_of(relative_path: &str) -> Option<&str> {
    relative_path
        .split_once('/')
        .map(|(kb, _)| kb)
        .filter(|kb| !kb.is_empty())
}

/// Display name for a knowledgebase directory: separators become spaces and
/// the first letter is upper-cased.
#[must_use]
pub fn display_name(kb: &str) -> String {
    let spaced = kb.replace(['-', '_'], " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
