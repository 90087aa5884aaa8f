//! Command implementations shared by CLI and MCP server.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::config::Config;
use crate::corpus::{Document, DocumentSummary, Knowledgebase, KnowledgebaseInfo};
use crate::export::{ExportSummary, Exporter};
use crate::import::{Analysis, ConfirmOptions, ImportReport, Importer};
use crate::search::{SearchEngine, SearchHit, SearchOptions};
use crate::storage::local::LocalStorageBackend;
use crate::storage::{StorageBackend, WriteOutcome};
use crate::tags::{TagCloudEntry, TagCount, TagIndex, TagStats, TagTree, TaggedDocument};

/// Maximum length for user-provided strings (title, tag).
const MAX_INPUT_LENGTH: usize = 200;

/// Characters that would break the inline tag list in frontmatter.
const TAG_FORBIDDEN_CHARS: &[char] = &[',', '[', ']', '"'];

fn open() -> anyhow::Result<(Config, LocalStorageBackend)> {
    let config = Config::load()?;
    let storage = LocalStorageBackend::new(&config.content);
    Ok((config, storage))
}

fn validate_title(title: &str) -> anyhow::Result<()> {
    if title.trim().is_empty() {
        anyhow::bail!("Title cannot be empty");
    }
    if title.chars().count() > MAX_INPUT_LENGTH {
        anyhow::bail!(
            "Title too long: {} chars (max {MAX_INPUT_LENGTH})",
            title.chars().count()
        );
    }
    Ok(())
}

/// Validate a user-provided tag.
///
/// Free text is allowed, except characters that would corrupt the
/// frontmatter list and control characters.
fn validate_tag(tag: &str) -> anyhow::Result<()> {
    if tag.is_empty() {
        anyhow::bail!("Tag cannot be empty");
    }

    if tag.chars().count() > MAX_INPUT_LENGTH {
        anyhow::bail!(
            "Tag too long: {} chars (max {MAX_INPUT_LENGTH})",
            tag.chars().count()
        );
    }

    if let Some(c) = tag
        .chars()
        .find(|c| TAG_FORBIDDEN_CHARS.contains(c) || c.is_control())
    {
        anyhow::bail!("Tag contains invalid character: {c:?}");
    }

    Ok(())
}

/// Parse comma-separated tags into a vector.
///
/// Splits the input on commas, trims whitespace, and filters out empty strings.
/// Does not validate tag format - callers should validate if needed.
#[must_use]
pub fn parse_tags(tags: Option<String>) -> Vec<String> {
    tags.map(|t| {
        t.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

/// List documents, newest first.
///
/// # Errors
///
/// Returns an error if config loading fails or the knowledgebase is unknown.
pub fn list(kb: Option<&str>) -> anyhow::Result<Vec<DocumentSummary>> {
    let (_, storage) = open()?;
    Ok(storage.list_all(&Knowledgebase::from_name(kb))?)
}

/// Get a document by its relative path.
///
/// # Errors
///
/// Returns an error if the path is invalid or the document does not exist.
pub fn get(doc_path: &str) -> anyhow::Result<Document> {
    let (_, storage) = open()?;
    Ok(storage.read(doc_path)?)
}

/// Write a document, renaming it when `title` changes.
///
/// # Errors
///
/// Returns an error if the title or name is invalid or the write fails.
pub fn save(
    name: &str,
    content: &str,
    title: Option<&str>,
    kb: Option<&str>,
) -> anyhow::Result<WriteOutcome> {
    if let Some(title) = title {
        validate_title(title)?;
    }
    let (_, storage) = open()?;
    let context = kb.map(|kb| Knowledgebase::from_name(Some(kb)));
    Ok(storage.write(name, content, title, context.as_ref())?)
}

/// Create a new document with generated frontmatter.
///
/// # Errors
///
/// Returns an error if the title or a tag is invalid, or a document with the
/// same name already exists.
pub fn create(
    title: &str,
    content: &str,
    tags: &[String],
    kb: Option<&str>,
) -> anyhow::Result<WriteOutcome> {
    validate_title(title)?;
    for tag in tags {
        validate_tag(tag)?;
    }

    let (_, storage) = open()?;
    let context = kb.map(|kb| Knowledgebase::from_name(Some(kb)));
    Ok(storage.create(title, tags, content, context.as_ref())?)
}

/// Back up and delete a document.
///
/// # Errors
///
/// Returns an error if the document does not exist or cannot be removed.
pub fn delete(doc_path: &str) -> anyhow::Result<()> {
    let (_, storage) = open()?;
    Ok(storage.delete(doc_path)?)
}

/// Relevance-ranked search.
///
/// # Errors
///
/// Returns an error if config loading fails, the query is invalid, or the
/// knowledgebase is unknown.
pub fn search(query: &str, limit: usize, kb: Option<&str>) -> anyhow::Result<Vec<SearchHit>> {
    let (_, storage) = open()?;
    let options = SearchOptions {
        limit: Some(limit),
        knowledgebase: Knowledgebase::from_name(kb),
    };
    Ok(SearchEngine::new(&storage).search(query, &options)?)
}

/// Complete a partial search term from document words.
///
/// # Errors
///
/// Returns an error if config loading fails or the prefix is invalid.
pub fn suggest(prefix: &str, limit: usize, kb: Option<&str>) -> anyhow::Result<Vec<String>> {
    let (_, storage) = open()?;
    Ok(SearchEngine::new(&storage).suggest(prefix, limit, &Knowledgebase::from_name(kb))?)
}

/// Named knowledgebases under the content root.
///
/// # Errors
///
/// Returns an error if config loading fails or the root cannot be read.
pub fn knowledgebases() -> anyhow::Result<Vec<KnowledgebaseInfo>> {
    let (_, storage) = open()?;
    Ok(storage.knowledgebases()?)
}

/// Tag operations over one knowledgebase selector.
pub mod tags {
    use super::{
        Knowledgebase, TagCloudEntry, TagCount, TagIndex, TagStats, TagTree, TaggedDocument, open,
        validate_tag,
    };

    /// # Errors
    ///
    /// Returns an error if config loading or listing fails.
    pub fn list(kb: Option<&str>) -> anyhow::Result<Vec<TagCount>> {
        let (_, storage) = open()?;
        Ok(TagIndex::new(&storage).all_tags(&Knowledgebase::from_name(kb))?)
    }

    /// # Errors
    ///
    /// Returns an error if config loading or listing fails.
    pub fn related(tag: &str, limit: usize, kb: Option<&str>) -> anyhow::Result<Vec<TagCount>> {
        let (_, storage) = open()?;
        Ok(TagIndex::new(&storage).related_tags(tag, limit, &Knowledgebase::from_name(kb))?)
    }

    /// # Errors
    ///
    /// Returns an error if config loading or listing fails.
    pub fn tree(kb: Option<&str>) -> anyhow::Result<TagTree> {
        let (_, storage) = open()?;
        Ok(TagIndex::new(&storage).hierarchy(&Knowledgebase::from_name(kb))?)
    }

    /// # Errors
    ///
    /// Returns an error if config loading or listing fails.
    pub fn cloud(kb: Option<&str>) -> anyhow::Result<Vec<TagCloudEntry>> {
        let (_, storage) = open()?;
        Ok(TagIndex::new(&storage).cloud(&Knowledgebase::from_name(kb))?)
    }

    /// # Errors
    ///
    /// Returns an error if config loading or listing fails.
    pub fn suggest(text: &str, limit: usize, kb: Option<&str>) -> anyhow::Result<Vec<String>> {
        let (_, storage) = open()?;
        Ok(TagIndex::new(&storage).suggest_tags(text, limit, &Knowledgebase::from_name(kb))?)
    }

    /// # Errors
    ///
    /// Returns an error if config loading or listing fails.
    pub fn stats(kb: Option<&str>) -> anyhow::Result<TagStats> {
        let (_, storage) = open()?;
        Ok(TagIndex::new(&storage).stats(&Knowledgebase::from_name(kb))?)
    }

    /// # Errors
    ///
    /// Returns an error if config loading or listing fails.
    pub fn files(tag: &str, exact: bool, kb: Option<&str>) -> anyhow::Result<Vec<TaggedDocument>> {
        let (_, storage) = open()?;
        Ok(TagIndex::new(&storage).files_by_tag(tag, exact, &Knowledgebase::from_name(kb))?)
    }

    /// # Errors
    ///
    /// Returns an error if the new tag is invalid or a rewrite fails.
    pub fn rename(old: &str, new: &str, kb: Option<&str>) -> anyhow::Result<usize> {
        validate_tag(new.trim())?;
        let (_, storage) = open()?;
        Ok(TagIndex::new(&storage).rename_tag(old, new, &Knowledgebase::from_name(kb))?)
    }

    /// # Errors
    ///
    /// Returns an error if config loading fails or a rewrite fails.
    pub fn remove(tag: &str, kb: Option<&str>) -> anyhow::Result<usize> {
        let (_, storage) = open()?;
        Ok(TagIndex::new(&storage).remove_tag(tag, &Knowledgebase::from_name(kb))?)
    }
}

/// Phase one of an import: extract and diff.
///
/// # Errors
///
/// Returns an error if the archive is missing, not a ZIP, or too large.
pub fn import_analyze(archive: &Path, kb: Option<&str>) -> anyhow::Result<Analysis> {
    let (config, storage) = open()?;
    let importer = Importer::new(&storage, &config.import, &config.content);
    Ok(importer.analyze(archive, kb)?)
}

/// Phase two of an import: apply overwrite decisions.
///
/// # Errors
///
/// Returns an error if the session id is invalid or the session expired.
pub fn import_confirm(
    session_id: &str,
    overwrite_all: bool,
    remove_all_first: bool,
    overwrite: Vec<String>,
) -> anyhow::Result<ImportReport> {
    let (config, storage) = open()?;
    let importer = Importer::new(&storage, &config.import, &config.content);
    let options = ConfirmOptions {
        overwrite_all,
        remove_all_first,
        overwrite: overwrite.into_iter().collect::<BTreeSet<_>>(),
    };
    Ok(importer.confirm(session_id, &options)?)
}

/// Analyse and confirm in one step.
///
/// # Errors
///
/// Same as [`import_analyze`] and [`import_confirm`].
pub fn import_direct(
    archive: &Path,
    kb: Option<&str>,
    overwrite_all: bool,
    remove_all_first: bool,
) -> anyhow::Result<ImportReport> {
    let (config, storage) = open()?;
    let importer = Importer::new(&storage, &config.import, &config.content);
    let options = ConfirmOptions {
        overwrite_all,
        remove_all_first,
        ..ConfirmOptions::default()
    };
    Ok(importer.direct(archive, kb, &options)?)
}

/// Remove stale import directories.
///
/// # Errors
///
/// Returns an error if config loading fails.
pub fn import_sweep() -> anyhow::Result<usize> {
    let (config, storage) = open()?;
    Ok(Importer::new(&storage, &config.import, &config.content).sweep())
}

/// Export a knowledgebase (or everything) to a ZIP archive.
///
/// Without `output`, the archive is written to the current directory under
/// a name derived from the site title and the current time.
///
/// # Errors
///
/// Returns an error if there is nothing to export or the archive cannot be
/// written.
pub fn export(kb: Option<&str>, output: Option<PathBuf>) -> anyhow::Result<ExportSummary> {
    let (config, storage) = open()?;
    let exporter = Exporter::new(&storage, &config.export.site_title);
    let output = output.unwrap_or_else(|| PathBuf::from(exporter.default_filename(Local::now())));
    Ok(exporter.export(&Knowledgebase::from_name(kb), &output)?)
}
