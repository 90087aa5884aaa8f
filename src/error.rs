//! Error taxonomy shared by every knowledge base component.

use std::path::Path;

use thiserror::Error;

/// Result type alias for knowledge base operations.
pub type Result<T> = std::result::Result<T, KbError>;

/// Errors that can occur while operating on the knowledge base.
#[derive(Debug, Error)]
pub enum KbError {
    /// A document, knowledgebase, or archive does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad filename, disallowed archive type, oversized upload, malformed query.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Target already exists and the operation refuses to overwrite it.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Write, delete, copy, or mkdir failure.
    #[error("I/O failure ({context}): {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// An import session outlived its timeout or can no longer be located.
    #[error("Import session expired: {0}")]
    Expired(String),
}

/// Coarse error category for callers that only need to branch on the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    NotFound,
    InvalidInput,
    Conflict,
    IoFailure,
    Expired,
}

impl KbError {
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound(_) => ErrorCategory::NotFound,
            Self::InvalidInput(_) => ErrorCategory::InvalidInput,
            Self::Conflict(_) => ErrorCategory::Conflict,
            Self::Io { .. } => ErrorCategory::IoFailure,
            Self::Expired(_) => ErrorCategory::Expired,
        }
    }

    /// Wrap an I/O error with the action and path that caused it.
    pub fn io(action: &str, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            context: format!("{action} {}", path.display()),
            source,
        }
    }
}

impl From<zip::result::ZipError> for KbError {
    fn from(e: zip::result::ZipError) -> Self {
        match e {
            zip::result::ZipError::Io(source) => Self::Io {
                context: "read archive".to_string(),
                source,
            },
            other => Self::InvalidInput(format!("Failed to read ZIP file: {other}")),
        }
    }
}
