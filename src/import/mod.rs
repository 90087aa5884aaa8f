//! Two-phase archive import.
//!
//! `analyze` extracts an archive into a fresh session directory and reports
//! which markdown files are new and which collide with the target
//! knowledgebase. `confirm` applies the caller's overwrite decisions. The
//! phases share nothing but the session record on disk.

pub mod archive;
pub mod session;

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::{ContentConfig, ImportConfig};
use crate::corpus::{Knowledgebase, MARKDOWN_EXTENSION};
use crate::error::{KbError, Result};
use crate::import::session::{Lookup, SESSION_PREFIX, SessionRecord};
use crate::storage::StorageBackend;
use crate::storage::naming::sanitize_knowledgebase_name;

/// Size and modification time of one side of a conflict.
#[derive(Debug, Clone, Serialize)]
pub struct FileStat {
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// An incoming file whose name already exists in the target.
#[derive(Debug, Clone, Serialize)]
pub struct Conflict {
    pub filename: String,
    pub existing: FileStat,
    pub incoming: FileStat,
}

/// Result of the analysis phase.
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub session_id: String,
    pub knowledgebase: String,
    pub total_files: usize,
    pub new_files: Vec<String>,
    pub conflicts: Vec<Conflict>,
    pub new_count: usize,
    pub conflict_count: usize,
}

/// Overwrite decisions for the confirm phase.
#[derive(Debug, Clone, Default)]
pub struct ConfirmOptions {
    pub overwrite_all: bool,
    /// Delete every document in the target before importing.
    pub remove_all_first: bool,
    /// Conflicting filenames to overwrite.
    pub overwrite: BTreeSet<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileError {
    pub filename: String,
    pub message: String,
}

/// Per-file outcome of the confirm phase.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub knowledgebase: String,
    pub imported: Vec<String>,
    pub skipped: Vec<String>,
    pub errors: Vec<FileError>,
    pub removed: Vec<String>,
}

/// Runs imports into one storage backend.
pub struct Importer<'a> {
    storage: &'a dyn StorageBackend,
    config: &'a ImportConfig,
    temp_roots: Vec<PathBuf>,
}

impl<'a> Importer<'a> {
    #[must_use]
    pub fn new(
        storage: &'a dyn StorageBackend,
        config: &'a ImportConfig,
        content: &ContentConfig,
    ) -> Self {
        Self {
            storage,
            config,
            temp_roots: config.temp_root_paths(content),
        }
    }

    /// Extract `archive_path` and diff its top-level markdown files against
    /// the target knowledgebase (given name, else the archive's stem).
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for a missing archive, `InvalidInput` for a non-ZIP
    /// or oversized archive, and `Io` if the session cannot be created.
    pub fn analyze(&self, archive_path: &Path, knowledgebase: Option<&str>) -> Result<Analysis> {
        let is_zip = archive_path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("zip"));
        if !is_zip {
            return Err(KbError::InvalidInput("Only ZIP files are allowed".to_string()));
        }

        let size = fs::metadata(archive_path)
            .map_err(|_| {
                KbError::NotFound(format!("Archive not found: {}", archive_path.display()))
            })?
            .len();
        if size > self.config.max_upload_bytes {
            return Err(KbError::InvalidInput(format!(
                "File too large: {size} bytes (max {})",
                self.config.max_upload_bytes
            )));
        }

        let requested = knowledgebase
            .map(str::trim)
            .filter(|kb| !kb.is_empty())
            .or_else(|| archive_path.file_stem().and_then(|s| s.to_str()))
            .unwrap_or_default();
        let kb = sanitize_knowledgebase_name(requested);
        let target_dir = self.storage.knowledgebase_dir(&kb)?;

        let (session_id, dir) = self.create_session_dir()?;
        match self.prepare(archive_path, &dir, &kb, &target_dir, &session_id) {
            Ok(analysis) => Ok(analysis),
            Err(e) => {
                if let Err(cleanup) = fs::remove_dir_all(&dir) {
                    log::warn!("Cannot remove {}: {cleanup}", dir.display());
                }
                Err(e)
            }
        }
    }

    /// Apply the caller's decisions to an analysed session.
    ///
    /// The session directory is removed afterwards whatever the outcome, and
    /// stale sessions are swept.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a malformed id and `Expired` when the
    /// session is missing or past its timeout. Per-file failures are
    /// reported in `ImportReport::errors`.
    pub fn confirm(&self, session_id: &str, options: &ConfirmOptions) -> Result<ImportReport> {
        let id = session::normalize_id(session_id)?;
        let now = Utc::now().timestamp();

        let (dir, record) = match session::locate(&self.temp_roots, id, now) {
            Lookup::Found(dir, record) => (dir, record),
            Lookup::Stale => {
                self.sweep();
                return Err(KbError::Expired(format!(
                    "Import session {id} timed out; upload the archive again"
                )));
            }
            Lookup::Missing => {
                self.sweep();
                return Err(KbError::Expired(format!(
                    "Import session {id} not found; upload the archive again"
                )));
            }
        };

        let result = self.apply(&dir, &record, options);

        if let Err(e) = fs::remove_dir_all(&dir) {
            log::warn!("Cannot remove import directory {}: {e}", dir.display());
        }
        self.sweep();

        if let Ok(report) = &result {
            log::info!(
                "Import into {}: {} imported, {} skipped, {} failed",
                report.knowledgebase,
                report.imported.len(),
                report.skipped.len(),
                report.errors.len()
            );
        }
        result
    }

    /// Analyse and confirm in one step.
    ///
    /// # Errors
    ///
    /// Same as [`Importer::analyze`] and [`Importer::confirm`].
    pub fn direct(
        &self,
        archive_path: &Path,
        knowledgebase: Option<&str>,
        options: &ConfirmOptions,
    ) -> Result<ImportReport> {
        let analysis = self.analyze(archive_path, knowledgebase)?;
        self.confirm(&analysis.session_id, options)
    }

    /// Remove import directories older than the retention window.
    pub fn sweep(&self) -> usize {
        session::sweep(
            &self.temp_roots,
            self.config.retention_secs,
            Utc::now().timestamp(),
        )
    }

    /// Create `kb_import_<id>` under the first usable temp root, creating the
    /// last candidate if none exists.
    fn create_session_dir(&self) -> Result<(String, PathBuf)> {
        let id = uuid::Uuid::new_v4().simple().to_string();

        for root in self.temp_roots.iter().filter(|r| r.is_dir()) {
            let dir = session::session_dir(root, &id);
            match fs::create_dir(&dir) {
                Ok(()) => return Ok((id, dir)),
                Err(e) => log::warn!("Cannot use temp root {}: {e}", root.display()),
            }
        }

        let fallback = self.temp_roots.last().ok_or_else(|| {
            KbError::InvalidInput("No temporary directory configured".to_string())
        })?;
        let dir = session::session_dir(fallback, &id);
        fs::create_dir_all(&dir).map_err(|e| KbError::io("create session dir", &dir, e))?;
        Ok((id, dir))
    }

    fn prepare(
        &self,
        archive_path: &Path,
        dir: &Path,
        kb: &str,
        target_dir: &Path,
        session_id: &str,
    ) -> Result<Analysis> {
        archive::extract(archive_path, dir, self.config.max_extracted_bytes)?;

        let extracted = top_level_markdown(dir)?;
        let mut new_files = Vec::new();
        let mut conflicts = Vec::new();

        for filename in &extracted {
            let existing = target_dir.join(filename);
            if existing.is_file() {
                conflicts.push(Conflict {
                    filename: filename.clone(),
                    existing: file_stat(&existing)?,
                    incoming: file_stat(&dir.join(filename))?,
                });
            } else {
                new_files.push(filename.clone());
            }
        }

        let record = SessionRecord {
            temp_dir: dir.to_path_buf(),
            target_dir: target_dir.to_path_buf(),
            knowledgebase: kb.to_string(),
            extracted_files: extracted,
            created_at: Utc::now().timestamp(),
            timeout_secs: self.config.session_timeout_secs,
        };
        record.save()?;

        log::info!(
            "Analysed {} for {kb}: {} new, {} conflicting (session {SESSION_PREFIX}{session_id})",
            archive_path.display(),
            new_files.len(),
            conflicts.len()
        );

        Ok(Analysis {
            session_id: session_id.to_string(),
            knowledgebase: kb.to_string(),
            total_files: record.extracted_files.len(),
            new_count: new_files.len(),
            conflict_count: conflicts.len(),
            new_files,
            conflicts,
        })
    }

    fn apply(
        &self,
        dir: &Path,
        record: &SessionRecord,
        options: &ConfirmOptions,
    ) -> Result<ImportReport> {
        let kb = &record.knowledgebase;
        let target_dir = self.storage.knowledgebase_dir(kb)?;
        if target_dir != record.target_dir {
            return Err(KbError::InvalidInput(format!(
                "Session targets {}, which is not knowledgebase {kb}",
                record.target_dir.display()
            )));
        }

        let mut report = ImportReport {
            knowledgebase: kb.clone(),
            ..ImportReport::default()
        };

        if options.remove_all_first && target_dir.is_dir() {
            for doc in self.storage.list_all(&Knowledgebase::Named(kb.clone()))? {
                match self.storage.delete(&doc.path) {
                    Ok(()) => report.removed.push(doc.filename),
                    Err(e) => report.errors.push(FileError {
                        filename: doc.filename,
                        message: e.to_string(),
                    }),
                }
            }
        }

        for filename in &record.extracted_files {
            let selected = !target_dir.join(filename).is_file()
                || options.overwrite_all
                || options.overwrite.contains(filename);
            if !selected {
                report.skipped.push(filename.clone());
                continue;
            }

            let source = dir.join(filename);
            let stored = fs::read(&source)
                .map_err(|e| KbError::io("read extracted file", &source, e))
                .and_then(|bytes| self.storage.store_file(kb, filename, &bytes));
            match stored {
                Ok(_) => report.imported.push(filename.clone()),
                Err(e) => report.errors.push(FileError {
                    filename: filename.clone(),
                    message: e.to_string(),
                }),
            }
        }

        Ok(report)
    }
}

/// Markdown files directly inside `dir`, sorted. Subdirectories are not
/// searched.
fn top_level_markdown(dir: &Path) -> Result<Vec<String>> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .map_err(|e| KbError::io("scan", dir, e))?
        .flatten()
        .filter_map(|entry| {
            let path = entry.path();
            let name = path.file_name()?.to_str()?.to_string();
            let is_markdown = path.extension().is_some_and(|e| e == MARKDOWN_EXTENSION);
            (is_markdown && !name.starts_with('.') && path.is_file()).then_some(name)
        })
        .collect();
    names.sort();
    Ok(names)
}

fn file_stat(path: &Path) -> Result<FileStat> {
    let meta = fs::metadata(path).map_err(|e| KbError::io("stat", path, e))?;
    let modified = meta
        .modified()
        .map_or(DateTime::<Utc>::UNIX_EPOCH, DateTime::<Utc>::from);
    Ok(FileStat {
        size: meta.len(),
        modified,
    })
}
