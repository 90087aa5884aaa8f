//! Local filesystem storage backend.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::config::ContentConfig;
use crate::corpus::frontmatter::{self, MetaValue, Metadata};
use crate::corpus::{
    Document, DocumentSummary, Knowledgebase, KnowledgebaseInfo, MARKDOWN_EXTENSION,
    display_name, title_from_filename,
};
use crate::error::{KbError, Result};
use crate::storage::backup::BackupStore;
use crate::storage::naming::{
    sanitize_filename, slugify_title, split_relative_path, validate_document_filename,
    validate_knowledgebase_name,
};
use crate::storage::{StorageBackend, WriteOutcome};

/// Storage backend for local filesystem operations.
pub struct LocalStorageBackend {
    root: PathBuf,
    default_knowledgebase: Option<String>,
    backups: BackupStore,
}

impl LocalStorageBackend {
    /// Create a backend from the content section of the configuration.
    #[must_use]
    pub fn new(config: &ContentConfig) -> Self {
        Self {
            root: config.root_path(),
            default_knowledgebase: config
                .default_knowledgebase
                .clone()
                .filter(|kb| !kb.trim().is_empty()),
            backups: BackupStore::new(config.backups_path(), config.max_backups),
        }
    }

    #[must_use]
    pub fn backups(&self) -> &BackupStore {
        &self.backups
    }

    /// Directory and knowledgebase name for a selector.
    fn target_dir(&self, kb: &Knowledgebase) -> Result<(PathBuf, Option<String>)> {
        match kb {
            Knowledgebase::All => Ok((self.root.clone(), None)),
            Knowledgebase::Named(name) => {
                validate_knowledgebase_name(name)?;
                Ok((self.root.join(name), Some(name.clone())))
            }
        }
    }

    /// Resolve where a write of `name` lands: `(dir, kb, base name)`.
    fn resolve_target<'a>(
        &self,
        name: &'a str,
        context: Option<&Knowledgebase>,
    ) -> Result<(PathBuf, Option<String>, &'a str)> {
        let name = name.trim();
        if name.is_empty() {
            return Err(KbError::InvalidInput(
                "Document name cannot be empty".to_string(),
            ));
        }

        let (kb, base) = match name.rsplit_once('/') {
            Some((prefix, _)) if prefix.contains('/') => {
                return Err(KbError::InvalidInput(format!(
                    "Invalid document name: {name} (at most one knowledgebase level)"
                )));
            }
            Some((prefix, base)) => (Knowledgebase::from_name(Some(prefix)), base),
            None => {
                let kb = context.cloned().unwrap_or_else(|| {
                    Knowledgebase::from_name(self.default_knowledgebase.as_deref())
                });
                (kb, name)
            }
        };

        let (dir, kb) = self.target_dir(&kb)?;
        Ok((dir, kb, base))
    }

    fn full_path(&self, kb: Option<&str>, filename: &str) -> PathBuf {
        match kb {
            Some(kb) => self.root.join(kb).join(filename),
            None => self.root.join(filename),
        }
    }

    /// Refuse paths that resolve outside the content root (e.g. via symlinks).
    fn ensure_within_root(&self, full_path: &Path) -> Result<()> {
        let canonical_root = self
            .root
            .canonicalize()
            .map_err(|e| KbError::io("access content root", &self.root, e))?;
        let canonical = full_path
            .canonicalize()
            .map_err(|e| KbError::io("resolve", full_path, e))?;

        if !canonical.starts_with(&canonical_root) {
            return Err(KbError::InvalidInput(format!(
                "Path escapes content root: {}",
                full_path.display()
            )));
        }
        Ok(())
    }

    /// Summaries of the markdown files directly inside `dir`.
    fn scan_dir(&self, dir: &Path, kb: Option<&str>, out: &mut Vec<DocumentSummary>) -> Result<()> {
        let entries = fs::read_dir(dir).map_err(|e| KbError::io("scan", dir, e))?;

        for entry in entries.flatten() {
            let path = entry.path();
            let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if filename.starts_with('.') || !is_markdown(&path) || !path.is_file() {
                continue;
            }

            match summarize(&path, kb, filename) {
                Ok((summary, _, _)) => out.push(summary),
                Err(e) => log::warn!("Skipping unreadable document {}: {e}", path.display()),
            }
        }

        Ok(())
    }

    fn title_of(path: &Path, filename: &str) -> String {
        fs::read(path).map_or_else(
            |_| title_from_filename(filename),
            |bytes| {
                let content = String::from_utf8_lossy(&bytes);
                let (metadata, _) = frontmatter::parse(&content);
                frontmatter::title(&metadata)
                    .map_or_else(|| title_from_filename(filename), str::to_string)
            },
        )
    }
}

impl StorageBackend for LocalStorageBackend {
    fn root(&self) -> &Path {
        &self.root
    }

    fn list_all(&self, kb: &Knowledgebase) -> Result<Vec<DocumentSummary>> {
        let mut documents = Vec::new();

        match kb {
            Knowledgebase::All => {
                if !self.root.is_dir() {
                    return Ok(documents);
                }
                self.scan_dir(&self.root, None, &mut documents)?;

                for (name, dir) in subdirectories(&self.root)? {
                    if let Err(e) = self.scan_dir(&dir, Some(&name), &mut documents) {
                        log::warn!("Skipping knowledgebase {name}: {e}");
                    }
                }
            }
            Knowledgebase::Named(name) => {
                let (dir, kb_name) = self.target_dir(kb)?;
                if !dir.is_dir() {
                    return Err(KbError::NotFound(format!("Knowledgebase not found: {name}")));
                }
                self.scan_dir(&dir, kb_name.as_deref(), &mut documents)?;
            }
        }

        documents.sort_by(|a, b| a.path.cmp(&b.path));
        documents.sort_by(|a, b| b.modified.cmp(&a.modified));
        Ok(documents)
    }

    fn read(&self, relative_path: &str) -> Result<Document> {
        let (kb, filename) = split_relative_path(relative_path)?;
        let full_path = self.full_path(kb, filename);

        if !full_path.is_file() {
            return Err(KbError::NotFound(format!("Document not found: {relative_path}")));
        }
        self.ensure_within_root(&full_path)?;

        let (summary, metadata, (body, raw)) = summarize(&full_path, kb, filename)?;
        Ok(Document {
            summary,
            metadata,
            body,
            raw,
        })
    }

    fn write(
        &self,
        name: &str,
        content: &str,
        title: Option<&str>,
        knowledgebase: Option<&Knowledgebase>,
    ) -> Result<WriteOutcome> {
        let (dir, kb, base) = self.resolve_target(name, knowledgebase)?;
        let filename = sanitize_filename(base);
        let current_path = dir.join(&filename);
        let existing = current_path.is_file();

        let new_filename = title
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .filter(|t| {
                let current_title = if existing {
                    Self::title_of(&current_path, &filename)
                } else {
                    title_from_filename(&filename)
                };
                *t != current_title
            })
            .map(slugify_title)
            .filter(|slug| *slug != filename);

        ensure_dir(&dir)?;

        let Some(new_filename) = new_filename else {
            if existing {
                self.backups.backup(&current_path);
            }
            let size = write_atomic(&current_path, content.as_bytes())?;
            return Ok(WriteOutcome {
                path: relative(kb.as_deref(), &filename),
                renamed_from: None,
                size,
            });
        };

        let new_path = dir.join(&new_filename);
        if new_path.is_file() && !new_filename.eq_ignore_ascii_case(&filename) {
            log::warn!(
                "Rename target {} already exists; backing it up before overwrite",
                new_path.display()
            );
            self.backups.backup(&new_path);
        }

        if existing {
            self.backups.backup(&current_path);
        }

        // Names differing only in case may be one file on case-insensitive
        // filesystems: move it first so the delete below cannot remove it.
        let case_only = existing && new_filename.eq_ignore_ascii_case(&filename);
        if case_only {
            fs::rename(&current_path, &new_path)
                .map_err(|e| KbError::io("rename", &current_path, e))?;
        }

        let size = write_atomic(&new_path, content.as_bytes())?;

        if existing && !case_only {
            fs::remove_file(&current_path)
                .map_err(|e| KbError::io("remove renamed original", &current_path, e))?;
        }

        let renamed_from = existing.then(|| relative(kb.as_deref(), &filename));
        log::info!(
            "Saved {} (renamed from {:?})",
            relative(kb.as_deref(), &new_filename),
            renamed_from
        );

        Ok(WriteOutcome {
            path: relative(kb.as_deref(), &new_filename),
            renamed_from,
            size,
        })
    }

    fn create(
        &self,
        title: &str,
        tags: &[String],
        body: &str,
        knowledgebase: Option<&Knowledgebase>,
    ) -> Result<WriteOutcome> {
        let title = title.trim();
        if title.is_empty() {
            return Err(KbError::InvalidInput("Title cannot be empty".to_string()));
        }

        let kb = knowledgebase.cloned().unwrap_or_else(|| {
            Knowledgebase::from_name(self.default_knowledgebase.as_deref())
        });
        let (dir, kb) = self.target_dir(&kb)?;
        let filename = slugify_title(title);
        let path = dir.join(&filename);

        if path.exists() {
            return Err(KbError::Conflict(format!(
                "Document already exists: {}",
                relative(kb.as_deref(), &filename)
            )));
        }

        let mut metadata = Metadata::new();
        metadata.insert("title".to_string(), MetaValue::Scalar(title.to_string()));
        metadata.insert(
            "date".to_string(),
            MetaValue::Scalar(Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string()),
        );
        if !tags.is_empty() {
            metadata.insert("tags".to_string(), MetaValue::List(tags.to_vec()));
        }
        let content = frontmatter::serialize(&metadata, body);

        ensure_dir(&dir)?;
        let size = write_atomic(&path, content.as_bytes())?;

        Ok(WriteOutcome {
            path: relative(kb.as_deref(), &filename),
            renamed_from: None,
            size,
        })
    }

    fn delete(&self, relative_path: &str) -> Result<()> {
        let (kb, filename) = split_relative_path(relative_path)?;
        let full_path = self.full_path(kb, filename);

        if !full_path.is_file() {
            return Err(KbError::NotFound(format!("Document not found: {relative_path}")));
        }
        self.ensure_within_root(&full_path)?;

        self.backups.backup(&full_path);
        fs::remove_file(&full_path).map_err(|e| KbError::io("delete", &full_path, e))?;

        log::info!("Deleted {relative_path}");
        Ok(())
    }

    fn overwrite(&self, relative_path: &str, content: &str) -> Result<u64> {
        let (kb, filename) = split_relative_path(relative_path)?;
        let full_path = self.full_path(kb, filename);

        if !full_path.is_file() {
            return Err(KbError::NotFound(format!("Document not found: {relative_path}")));
        }
        self.ensure_within_root(&full_path)?;

        self.backups.backup(&full_path);
        let size = write_atomic(&full_path, content.as_bytes())?;

        log::debug!("Overwrote {relative_path}");
        Ok(size)
    }

    fn knowledgebases(&self) -> Result<Vec<KnowledgebaseInfo>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }

        subdirectories(&self.root)?
            .into_iter()
            .map(|(name, dir)| {
                let document_count = fs::read_dir(&dir)
                    .map_err(|e| KbError::io("scan", &dir, e))?
                    .flatten()
                    .filter(|e| {
                        let path = e.path();
                        is_markdown(&path) && path.is_file()
                    })
                    .count();
                Ok(KnowledgebaseInfo {
                    display_name: display_name(&name),
                    name,
                    document_count,
                })
            })
            .collect()
    }

    fn knowledgebase_dir(&self, name: &str) -> Result<PathBuf> {
        validate_knowledgebase_name(name)?;
        Ok(self.root.join(name))
    }

    fn store_file(&self, knowledgebase: &str, filename: &str, content: &[u8]) -> Result<u64> {
        validate_document_filename(filename)?;
        let dir = self.knowledgebase_dir(knowledgebase)?;
        ensure_dir(&dir)?;

        let path = dir.join(filename);
        if path.is_file() {
            self.backups.backup(&path);
        }
        write_atomic(&path, content)
    }
}

/// Parse a document file into its summary, metadata, and `(body, raw)`.
fn summarize(
    path: &Path,
    kb: Option<&str>,
    filename: &str,
) -> Result<(DocumentSummary, Metadata, (String, String))> {
    let file_meta = fs::metadata(path).map_err(|e| KbError::io("stat", path, e))?;
    let bytes = fs::read(path).map_err(|e| KbError::io("read", path, e))?;
    let raw = String::from_utf8_lossy(&bytes).into_owned();
    let (metadata, body) = frontmatter::parse(&raw);

    let title = frontmatter::title(&metadata)
        .map_or_else(|| title_from_filename(filename), str::to_string);
    let description = metadata
        .get("description")
        .and_then(MetaValue::as_scalar)
        .map(str::to_string);
    let modified = file_meta
        .modified()
        .map_or(DateTime::<Utc>::UNIX_EPOCH, DateTime::<Utc>::from);

    let summary = DocumentSummary {
        path: relative(kb, filename),
        filename: filename.to_string(),
        knowledgebase: kb.map(str::to_string),
        title,
        tags: frontmatter::tags(&metadata),
        description,
        size: file_meta.len(),
        modified,
    };

    Ok((summary, metadata, (body, raw)))
}

/// Non-hidden first-level directories, sorted by name.
fn subdirectories(root: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut dirs: Vec<(String, PathBuf)> = fs::read_dir(root)
        .map_err(|e| KbError::io("scan", root, e))?
        .flatten()
        .filter_map(|entry| {
            let path = entry.path();
            let name = path.file_name()?.to_str()?.to_string();
            (!name.starts_with('.') && path.is_dir()).then_some((name, path))
        })
        .collect();
    dirs.sort();
    Ok(dirs)
}

fn relative(kb: Option<&str>, filename: &str) -> String {
    match kb {
        Some(kb) => format!("{kb}/{filename}"),
        None => filename.to_string(),
    }
}

fn is_markdown(path: &Path) -> bool {
    path.extension().is_some_and(|e| e == MARKDOWN_EXTENSION)
}

/// Create a directory tree; an already existing directory is not an error.
fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| KbError::io("create dir", dir, e))
}

/// Write via a hidden sibling temp file and rename, so readers never see a
/// partially written document.
fn write_atomic(path: &Path, content: &[u8]) -> Result<u64> {
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| KbError::InvalidInput(format!("Invalid path: {}", path.display())))?;
    let temp = path.with_file_name(format!(".{filename}.{}.tmp", uuid::Uuid::new_v4().simple()));

    if let Err(e) = fs::write(&temp, content) {
        let _ = fs::remove_file(&temp);
        return Err(KbError::io("write", path, e));
    }
    if let Err(e) = fs::rename(&temp, path) {
        let _ = fs::remove_file(&temp);
        return Err(KbError::io("write", path, e));
    }

    Ok(content.len() as u64)
}
