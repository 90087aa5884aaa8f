//! Bundle documents into a ZIP archive with a generated index.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use zip::CompressionMethod;
use zip::write::FileOptions;

use crate::corpus::{DocumentSummary, Knowledgebase, frontmatter};
use crate::error::{KbError, Result};
use crate::storage::StorageBackend;

pub const INDEX_FILE: &str = "index.md";
pub const INFO_FILE: &str = "export_info.json";

const FORMAT_VERSION: &str = "1.0";

/// One exported document as listed in the index.
#[derive(Debug, Clone, Serialize)]
pub struct ExportEntry {
    /// Name inside the archive.
    pub name: String,
    pub title: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// Contents of `export_info.json`.
#[derive(Debug, Clone, Serialize)]
pub struct ExportInfo {
    pub export_date: String,
    pub file_count: usize,
    pub source: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub file_count: usize,
    pub total_size: u64,
    /// Archive name of the generated index.
    pub index_file: String,
}

pub struct Exporter<'a> {
    storage: &'a dyn StorageBackend,
    site_title: &'a str,
}

impl<'a> Exporter<'a> {
    #[must_use]
    pub fn new(storage: &'a dyn StorageBackend, site_title: &'a str) -> Self {
        Self {
            storage,
            site_title,
        }
    }

    /// Default archive name: `<site-title>-export_<date>.zip`.
    #[must_use]
    pub fn default_filename(&self, now: DateTime<Local>) -> String {
        format!(
            "{}-export_{}.zip",
            title_slug(self.site_title),
            now.format("%Y-%m-%d_%H-%M-%S")
        )
    }

    /// Write every document in `kb` to a ZIP archive at `output`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when there is nothing to export, and `Io` when the
    /// archive cannot be written. A partially written archive is removed.
    pub fn export(&self, kb: &Knowledgebase, output: &Path) -> Result<ExportSummary> {
        let documents = self.storage.list_all(kb)?;
        if documents.is_empty() {
            return Err(KbError::NotFound(format!(
                "No markdown files found to export in {kb}"
            )));
        }

        let result = self.write_archive(kb, &documents, output);
        if result.is_err() {
            let _ = fs::remove_file(output);
        }
        result
    }

    fn write_archive(
        &self,
        kb: &Knowledgebase,
        documents: &[DocumentSummary],
        output: &Path,
    ) -> Result<ExportSummary> {
        let archive_err = |e: zip::result::ZipError| KbError::Io {
            context: format!("write archive {}", output.display()),
            source: e.into(),
        };
        let write_err = |e: std::io::Error| KbError::io("write archive", output, e);

        let file = File::create(output).map_err(write_err)?;
        let mut zip = zip::ZipWriter::new(file);
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

        let mut entries = Vec::with_capacity(documents.len());
        for summary in documents {
            let doc = match self.storage.read(&summary.path) {
                Ok(doc) => doc,
                Err(e) => {
                    log::warn!("Skipping {} in export: {e}", summary.path);
                    continue;
                }
            };

            let name = match kb {
                Knowledgebase::Named(_) => summary.filename.clone(),
                Knowledgebase::All => summary.path.clone(),
            };
            zip.start_file(name.as_str(), options).map_err(archive_err)?;
            zip.write_all(doc.raw.as_bytes()).map_err(write_err)?;

            entries.push(ExportEntry {
                title: export_title(&doc.raw, &summary.filename),
                size: doc.raw.len() as u64,
                modified: summary.modified,
                name,
            });
        }

        let taken: HashSet<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        let index_file = free_entry_name(INDEX_FILE, &taken);
        let info_file = free_entry_name(INFO_FILE, &taken);
        if index_file != INDEX_FILE {
            log::warn!("A document is named {INDEX_FILE}; writing the index as {index_file}");
        }

        let now = Local::now();
        zip.start_file(index_file.as_str(), options).map_err(archive_err)?;
        zip.write_all(index_markdown(&entries, self.site_title, now).as_bytes())
            .map_err(write_err)?;

        let info = ExportInfo {
            export_date: now.format("%Y-%m-%d %H:%M:%S").to_string(),
            file_count: entries.len(),
            source: self.site_title.to_string(),
            version: FORMAT_VERSION.to_string(),
        };
        let info_json = serde_json::to_string_pretty(&info).map_err(|e| KbError::Io {
            context: "encode export info".to_string(),
            source: e.into(),
        })?;
        zip.start_file(info_file.as_str(), options).map_err(archive_err)?;
        zip.write_all(info_json.as_bytes()).map_err(write_err)?;

        zip.finish().map_err(archive_err)?;

        let total_size = entries.iter().map(|e| e.size).sum();
        log::info!(
            "Exported {} document(s) from {kb} to {}",
            entries.len(),
            output.display()
        );
        Ok(ExportSummary {
            path: output.to_path_buf(),
            file_count: entries.len(),
            total_size,
            index_file,
        })
    }
}

/// `base`, prefixed with underscores until no document entry uses it.
fn free_entry_name(base: &str, taken: &HashSet<&str>) -> String {
    let mut name = base.to_string();
    while taken.contains(name.as_str()) {
        name.insert(0, '_');
    }
    name
}

/// Frontmatter title, else the first `# ` heading, else the filename stem.
#[must_use]
pub fn export_title(raw: &str, filename: &str) -> String {
    let (metadata, body) = frontmatter::parse(raw);
    if let Some(title) = frontmatter::title(&metadata) {
        return title.to_string();
    }

    body.lines()
        .find_map(|line| line.strip_prefix("# ").map(str::trim))
        .filter(|t| !t.is_empty())
        .map_or_else(
            || filename.strip_suffix(".md").unwrap_or(filename).to_string(),
            str::to_string,
        )
}

/// Human-readable index of the exported documents, grouped by the first
/// letter of their title.
#[must_use]
pub fn index_markdown(entries: &[ExportEntry], site_title: &str, now: DateTime<Local>) -> String {
    let mut sorted: Vec<&ExportEntry> = entries.iter().collect();
    sorted.sort_by_key(|e| e.title.to_lowercase());

    let mut groups: Vec<(String, Vec<&ExportEntry>)> = Vec::new();
    for entry in sorted {
        let letter = match entry.title.chars().next() {
            Some(c) if c.is_alphabetic() => c.to_uppercase().collect(),
            _ => "#".to_string(),
        };
        match groups.iter_mut().find(|(l, _)| *l == letter) {
            Some((_, group)) => group.push(entry),
            None => groups.push((letter, vec![entry])),
        }
    }

    let date = now.format("%Y-%m-%d");
    let time = now.format("%H:%M");
    let total_size: u64 = entries.iter().map(|e| e.size).sum();

    let mut md = String::new();
    md.push_str(&format!("# {site_title}\n\n"));
    md.push_str("## Knowledge Base Export\n\n");
    md.push_str(&format!(
        "This knowledge base was exported on **{date}** at **{time}**.\n\n"
    ));
    md.push_str("### Statistics\n\n");
    md.push_str(&format!("- **Total Files:** {}\n", entries.len()));
    md.push_str(&format!("- **Total Size:** {}\n", format_bytes(total_size)));
    md.push_str(&format!("- **Export Date:** {date} {time}\n\n"));
    md.push_str("---\n\n## File Index\n\n");

    for (letter, group) in groups {
        md.push_str(&format!("### {letter}\n\n"));
        for entry in group {
            md.push_str(&format!(
                "- **[{}]({})** *({}, modified: {})*\n",
                entry.title,
                entry.name,
                format_bytes(entry.size),
                entry.modified.format("%Y-%m-%d")
            ));
        }
        md.push('\n');
    }

    md.push_str("---\n\n");
    md.push_str("This export can be imported back with `mdkb import`.\n");
    md
}

/// `1536` → `1.5 KB`. Two decimal places at most, units up to GB.
#[must_use]
pub fn format_bytes(size: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    if size == 0 {
        return "0 B".to_string();
    }

    #[allow(clippy::cast_precision_loss)]
    let mut value = size as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = (value * 100.0).round() / 100.0;
    format!("{rounded} {}", UNITS[unit])
}

/// Site title made safe for a filename; non-ASCII letters survive.
fn title_slug(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.chars() {
        let c = if c.is_whitespace() || "<>:\"|*?/\\".contains(c) {
            '-'
        } else {
            c
        };
        if c == '-' && (slug.is_empty() || slug.ends_with('-')) {
            continue;
        }
        slug.extend(c.to_lowercase());
    }
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "knowledge-base".to_string()
    } else {
        slug.to_string()
    }
}
