//! Disk-backed import session records.
//!
//! An analysed archive lives in `<temp root>/kb_import_<id>/` next to a
//! `.import_session` JSON record. Confirmation may happen in another process,
//! so the record is the only state shared between the two phases.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{KbError, Result};

/// Directory name prefix for session directories.
pub const SESSION_PREFIX: &str = "kb_import_";

/// Reserved record file inside a session directory.
pub const SESSION_FILE: &str = ".import_session";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub temp_dir: PathBuf,
    pub target_dir: PathBuf,
    pub knowledgebase: String,
    /// Top-level markdown filenames found in the archive.
    pub extracted_files: Vec<String>,
    /// Unix seconds.
    pub created_at: i64,
    pub timeout_secs: i64,
}

impl SessionRecord {
    #[must_use]
    pub fn is_expired(&self, now: i64) -> bool {
        now - self.created_at > self.timeout_secs
    }

    /// Write the record into its session directory.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the record cannot be written.
    pub fn save(&self) -> Result<()> {
        let path = self.temp_dir.join(SESSION_FILE);
        let json = serde_json::to_string_pretty(self).map_err(|e| KbError::Io {
            context: format!("encode session record {}", path.display()),
            source: e.into(),
        })?;
        fs::write(&path, json).map_err(|e| KbError::io("write session record", &path, e))
    }

    /// Read the record from a session directory.
    ///
    /// # Errors
    ///
    /// Returns `Expired` if the record is missing or unreadable.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(SESSION_FILE);
        let json = fs::read_to_string(&path).map_err(|e| {
            KbError::Expired(format!("Cannot read session record {}: {e}", path.display()))
        })?;
        serde_json::from_str(&json).map_err(|e| {
            KbError::Expired(format!("Corrupt session record {}: {e}", path.display()))
        })
    }
}

/// Accept a session id with or without the directory prefix.
///
/// # Errors
///
/// Returns `InvalidInput` unless the id is non-empty ASCII alphanumeric.
pub fn normalize_id(id: &str) -> Result<&str> {
    let id = id.trim();
    let id = id.strip_prefix(SESSION_PREFIX).unwrap_or(id);
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(KbError::InvalidInput(format!("Invalid session id: '{id}'")));
    }
    Ok(id)
}

#[must_use]
pub fn session_dir(root: &Path, id: &str) -> PathBuf {
    root.join(format!("{SESSION_PREFIX}{id}"))
}

/// Outcome of probing the candidate temp roots for a session.
#[derive(Debug)]
pub enum Lookup {
    Found(PathBuf, SessionRecord),
    /// A record exists but is past its timeout.
    Stale,
    Missing,
}

/// Check each root in order for a live session record.
#[must_use]
pub fn locate(roots: &[PathBuf], id: &str, now: i64) -> Lookup {
    let mut stale = false;

    for root in roots {
        let dir = session_dir(root, id);
        if !dir.join(SESSION_FILE).is_file() {
            continue;
        }
        match SessionRecord::load(&dir) {
            Ok(record) if record.is_expired(now) => {
                log::debug!(
                    "Session {id} in {} is {}s old (timeout {}s)",
                    root.display(),
                    now - record.created_at,
                    record.timeout_secs
                );
                stale = true;
            }
            Ok(record) => return Lookup::Found(dir, record),
            Err(e) => log::warn!("Ignoring session candidate {}: {e}", dir.display()),
        }
    }

    if stale { Lookup::Stale } else { Lookup::Missing }
}

/// Remove session directories older than `retention_secs`, whatever their
/// state. Age comes from the record when readable, else the directory mtime.
/// Returns the number of directories removed.
#[must_use]
pub fn sweep(roots: &[PathBuf], retention_secs: i64, now: i64) -> usize {
    let mut removed = 0;

    for root in roots {
        let Ok(entries) = fs::read_dir(root) else {
            continue;
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let is_session = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(SESSION_PREFIX));
            if !is_session || !path.is_dir() {
                continue;
            }

            let Some(created) = created_at(&path) else {
                continue;
            };
            if now - created <= retention_secs {
                continue;
            }

            match fs::remove_dir_all(&path) {
                Ok(()) => {
                    log::info!("Swept stale import directory {}", path.display());
                    removed += 1;
                }
                Err(e) => log::warn!("Cannot sweep {}: {e}", path.display()),
            }
        }
    }

    removed
}

fn created_at(dir: &Path) -> Option<i64> {
    if let Ok(record) = SessionRecord::load(dir) {
        return Some(record.created_at);
    }
    let modified: SystemTime = fs::metadata(dir).and_then(|m| m.modified()).ok()?;
    Some(DateTime::<Utc>::from(modified).timestamp())
}
