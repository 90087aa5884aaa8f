//! ZIP extraction for uploaded archives.

use std::fs::{self, File};
use std::io;
use std::path::Path;

use zip::ZipArchive;

use crate::error::{KbError, Result};
use crate::import::session::SESSION_FILE;

/// Extract every entry of `archive_path` into `dest`.
///
/// Entries whose names would escape `dest` are skipped, as is a top-level
/// entry named like the session record. Returns the number of files written.
///
/// # Errors
///
/// Returns `InvalidInput` for an unreadable archive or one whose declared
/// uncompressed size exceeds `max_bytes`, and `Io` for write failures.
pub fn extract(archive_path: &Path, dest: &Path, max_bytes: u64) -> Result<usize> {
    let file = File::open(archive_path).map_err(|e| KbError::io("open archive", archive_path, e))?;
    let mut archive = ZipArchive::new(file)?;

    // ZIP bomb protection: sum of uncompressed sizes declared in the archive
    let mut declared: u64 = 0;
    for i in 0..archive.len() {
        declared = declared.saturating_add(archive.by_index(i)?.size());
    }
    if declared > max_bytes {
        return Err(KbError::InvalidInput(format!(
            "Archive expands to {declared} bytes (max {max_bytes})"
        )));
    }

    let mut written = 0;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;

        let Some(relative) = entry.enclosed_name().map(Path::to_path_buf) else {
            log::warn!("Skipping unsafe archive entry {}", entry.name());
            continue;
        };
        if relative == Path::new(SESSION_FILE) {
            log::warn!("Skipping archive entry with reserved name {SESSION_FILE}");
            continue;
        }

        let out = dest.join(&relative);
        if entry.is_dir() {
            fs::create_dir_all(&out).map_err(|e| KbError::io("create dir", &out, e))?;
            continue;
        }
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent).map_err(|e| KbError::io("create dir", parent, e))?;
        }

        let mut target = File::create(&out).map_err(|e| KbError::io("extract", &out, e))?;
        io::copy(&mut entry, &mut target).map_err(|e| KbError::io("extract", &out, e))?;
        written += 1;
    }

    log::debug!(
        "Extracted {written} file(s) from {} into {}",
        archive_path.display(),
        dest.display()
    );
    Ok(written)
}
