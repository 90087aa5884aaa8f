//! Timestamped copies of documents taken before every overwrite or delete.
//!
//! Backups live flat in one directory as `<timestamp>_<filename>`. At most
//! `max_per_file` copies are kept per filename; the oldest go first.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;

/// `2026-10-19T05-19-00-123`: sortable, and free of `_` so the first `_`
/// always separates timestamp from filename.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S-%3f";
const TIMESTAMP_LEN: usize = 23;

/// One retained backup file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupEntry {
    pub path: PathBuf,
    pub timestamp: String,
    pub filename: String,
}

impl BackupEntry {
    fn parse(path: PathBuf) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        let (timestamp, filename) = name.split_once('_')?;
        let stamp_bytes = timestamp.as_bytes();
        if stamp_bytes.len() < TIMESTAMP_LEN
            || filename.is_empty()
            || !stamp_bytes[..TIMESTAMP_LEN]
                .iter()
                .all(|b| b.is_ascii_digit() || matches!(b, b'-' | b'T'))
        {
            return None;
        }
        let (timestamp, filename) = (timestamp.to_string(), filename.to_string());
        Some(Self {
            path,
            timestamp,
            filename,
        })
    }

    /// Chronological key: base timestamp, then same-instant collision counter.
    fn sort_key(&self) -> (&str, u32) {
        let (base, counter) = self.timestamp.split_at(TIMESTAMP_LEN);
        let counter = counter
            .strip_prefix('-')
            .and_then(|c| c.parse().ok())
            .unwrap_or(0);
        (base, counter)
    }
}

/// Backup directory with per-filename retention.
#[derive(Debug, Clone)]
pub struct BackupStore {
    dir: PathBuf,
    max_per_file: usize,
}

impl BackupStore {
    #[must_use]
    pub fn new(dir: PathBuf, max_per_file: usize) -> Self {
        Self {
            dir,
            max_per_file: max_per_file.max(1),
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Copy `source` into the backup directory, then prune old copies.
    ///
    /// Never fails: a backup problem is logged and must not block the write
    /// or delete it precedes.
    pub fn backup(&self, source: &Path) -> Option<PathBuf> {
        match self.try_backup(source) {
            Ok(path) => {
                log::debug!("Backed up {} to {}", source.display(), path.display());
                Some(path)
            }
            Err(e) => {
                log::warn!("Backup of {} failed: {e}", source.display());
                None
            }
        }
    }

    /// Backups of `filename`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the backup directory exists but cannot be read.
    pub fn list(&self, filename: &str) -> io::Result<Vec<BackupEntry>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut entries: Vec<BackupEntry> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file())
            .filter_map(BackupEntry::parse)
            .filter(|entry| entry.filename == filename)
            .collect();

        entries.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        Ok(entries)
    }

    fn try_backup(&self, source: &Path) -> io::Result<PathBuf> {
        let filename = source
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| io::Error::other("source has no usable file name"))?;

        fs::create_dir_all(&self.dir)?;

        let timestamp = Utc::now().format(TIMESTAMP_FORMAT).to_string();
        let (path, mut target) = self.reserve(&timestamp, filename)?;

        let copied = File::open(source).and_then(|mut src| io::copy(&mut src, &mut target));
        if let Err(e) = copied {
            let _ = fs::remove_file(&path);
            return Err(e);
        }

        if let Err(e) = self.prune(filename) {
            log::warn!("Pruning backups of {filename} failed: {e}");
        }

        Ok(path)
    }

    /// Create a fresh backup file, adding a counter on same-instant collisions.
    fn reserve(&self, timestamp: &str, filename: &str) -> io::Result<(PathBuf, File)> {
        for counter in 0u32.. {
            let stamp = if counter == 0 {
                timestamp.to_string()
            } else {
                format!("{timestamp}-{counter}")
            };
            let path = self.dir.join(format!("{stamp}_{filename}"));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(e),
            }
        }
        Err(io::Error::other("backup name space exhausted"))
    }

    fn prune(&self, filename: &str) -> io::Result<usize> {
        let entries = self.list(filename)?;
        let excess = entries.len().saturating_sub(self.max_per_file);

        for entry in entries.iter().take(excess) {
            fs::remove_file(&entry.path)?;
            log::debug!("Pruned old backup {}", entry.path.display());
        }

        Ok(excess)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(temp: &TempDir, max: usize) -> BackupStore {
        BackupStore::new(temp.path().join(".backups"), max)
    }

    #[test]
    fn backup_copies_content() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("note.md");
        fs::write(&source, "v1").unwrap();

        let backups = store(&temp, 10);
        let path = backups.backup(&source).unwrap();

        assert_eq!(fs::read_to_string(path).unwrap(), "v1");
        assert_eq!(backups.list("note.md").unwrap().len(), 1);
    }

    #[test]
    fn same_instant_backups_do_not_collide() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("note.md");
        fs::write(&source, "v").unwrap();

        let backups = store(&temp, 10);
        for _ in 0..5 {
            backups.backup(&source).unwrap();
        }
        assert_eq!(backups.list("note.md").unwrap().len(), 5);
    }

    #[test]
    fn retention_keeps_newest() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("note.md");
        let backups = store(&temp, 3);

        for version in 0..6 {
            fs::write(&source, format!("v{version}")).unwrap();
            backups.backup(&source).unwrap();
        }

        let kept = backups.list("note.md").unwrap();
        assert_eq!(kept.len(), 3);
        let contents: Vec<String> = kept
            .iter()
            .map(|e| fs::read_to_string(&e.path).unwrap())
            .collect();
        assert_eq!(contents, vec!["v3", "v4", "v5"]);
    }

    #[test]
    fn retention_is_per_filename() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a.md");
        let b = temp.path().join("b_file.md");
        fs::write(&a, "a").unwrap();
        fs::write(&b, "b").unwrap();

        let backups = store(&temp, 2);
        for _ in 0..4 {
            backups.backup(&a).unwrap();
        }
        backups.backup(&b).unwrap();

        assert_eq!(backups.list("a.md").unwrap().len(), 2);
        assert_eq!(backups.list("b_file.md").unwrap().len(), 1);
    }

    #[test]
    fn missing_source_is_swallowed() {
        let temp = TempDir::new().unwrap();
        let backups = store(&temp, 10);
        assert!(backups.backup(&temp.path().join("ghost.md")).is_none());
        assert!(backups.list("ghost.md").unwrap().is_empty());
    }
}
