//! Relevance-ranked search over the documents in a knowledgebase.

pub mod query;
pub mod scoring;

use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use serde::Serialize;

use crate::corpus::{DocumentSummary, Knowledgebase};
use crate::error::{KbError, Result};
use crate::search::query::{ParsedQuery, TagMatch};
use crate::search::scoring::{Candidate, Scorer};
use crate::storage::StorageBackend;
use crate::tags::TagIndex;

/// Maximum accepted query length, in characters.
pub const MAX_QUERY_LENGTH: usize = 1000;

/// Default number of term suggestions.
pub const DEFAULT_SUGGESTIONS: usize = 5;

#[allow(clippy::expect_used)]
static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\w{3,}\b").expect("word pattern compiles"));

/// Options for filtering and limiting search results.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub limit: Option<usize>,
    pub knowledgebase: Knowledgebase,
}

/// A single search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub summary: DocumentSummary,
    pub score: u32,
    pub excerpt: String,
    pub highlights: Vec<String>,
}

/// Search engine reading documents through a storage backend.
pub struct SearchEngine<'a> {
    storage: &'a dyn StorageBackend,
}

impl<'a> SearchEngine<'a> {
    #[must_use]
    pub fn new(storage: &'a dyn StorageBackend) -> Self {
        Self { storage }
    }

    /// Rank documents against `query`, highest score first. Equal scores
    /// keep listing order (newest first).
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an over-long query or one containing NUL,
    /// and storage errors from listing.
    pub fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchHit>> {
        validate_query(query)?;

        let parsed = query::parse(query);
        if parsed.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits = match parsed.as_tag_listing() {
            Some(group) => self.tag_listing(group, &options.knowledgebase)?,
            None => self.ranked(&parsed, &options.knowledgebase)?,
        };

        hits.sort_by(|a, b| b.score.cmp(&a.score));
        if let Some(limit) = options.limit {
            hits.truncate(limit);
        }

        log::debug!("Query {query:?} matched {} document(s)", hits.len());
        Ok(hits)
    }

    /// Words of three or more characters starting with `prefix`, most
    /// frequent first.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an invalid prefix, and storage errors from
    /// listing.
    pub fn suggest(&self, prefix: &str, limit: usize, kb: &Knowledgebase) -> Result<Vec<String>> {
        validate_query(prefix)?;
        let prefix = scoring::fold(prefix.trim());
        if prefix.is_empty() {
            return Ok(Vec::new());
        }

        let mut freq: HashMap<String, usize> = HashMap::new();

        for summary in self.storage.list_all(kb)? {
            let doc = match self.storage.read(&summary.path) {
                Ok(doc) => doc,
                Err(e) => {
                    log::warn!("Skipping {} for suggestions: {e}", summary.path);
                    continue;
                }
            };
            let body = scoring::fold(&doc.body);
            for m in WORD_RE.find_iter(&body) {
                if m.as_str().starts_with(prefix.as_str()) {
                    *freq.entry(m.as_str().to_string()).or_default() += 1;
                }
            }
        }

        let mut words: Vec<(String, usize)> = freq.into_iter().collect();
        words.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(words.into_iter().take(limit).map(|(w, _)| w).collect())
    }

    fn ranked(&self, parsed: &ParsedQuery, kb: &Knowledgebase) -> Result<Vec<SearchHit>> {
        let now = Utc::now();
        let terms = parsed.highlight_terms();
        let scorer = Scorer::new(parsed);
        let mut hits = Vec::new();

        for summary in self.storage.list_all(kb)? {
            let doc = match self.storage.read(&summary.path) {
                Ok(doc) => doc,
                Err(e) => {
                    log::warn!("Skipping {} during search: {e}", summary.path);
                    continue;
                }
            };

            let candidate = Candidate {
                title: &summary.title,
                body: &doc.body,
                description: summary.description.as_deref(),
                tags: &summary.tags,
                modified: summary.modified,
            };
            let Some(score) = scorer.score(&candidate, now) else {
                continue;
            };

            hits.push(SearchHit {
                excerpt: scoring::excerpt(&doc.body, &terms),
                highlights: scoring::highlights(&doc.body, &terms),
                summary,
                score,
            });
        }

        Ok(hits)
    }

    fn tag_listing(&self, group: &query::TagGroup, kb: &Knowledgebase) -> Result<Vec<SearchHit>> {
        let exact = group.mode == TagMatch::Exact;
        let index = TagIndex::new(self.storage);

        // Alternatives of one group: a document scores by its best alternative.
        let mut best: Vec<(DocumentSummary, u32)> = Vec::new();
        for alternative in &group.alternatives {
            for tagged in index.files_by_tag(alternative, exact, kb)? {
                match best.iter_mut().find(|(s, _)| s.path == tagged.summary.path) {
                    Some(entry) => entry.1 = entry.1.max(tagged.score),
                    None => best.push((tagged.summary, tagged.score)),
                }
            }
        }
        best.sort_by(|a, b| b.0.modified.cmp(&a.0.modified));

        Ok(best
            .into_iter()
            .map(|(summary, score)| {
                let excerpt = self
                    .storage
                    .read(&summary.path)
                    .map(|doc| scoring::excerpt(&doc.body, &[]))
                    .unwrap_or_default();
                SearchHit {
                    summary,
                    score,
                    excerpt,
                    highlights: Vec::new(),
                }
            })
            .collect())
    }
}

fn validate_query(query: &str) -> Result<()> {
    if query.chars().count() > MAX_QUERY_LENGTH {
        return Err(KbError::InvalidInput(format!(
            "Query too long: {} chars (max {MAX_QUERY_LENGTH})",
            query.chars().count()
        )));
    }

    if query.contains('\0') {
        return Err(KbError::InvalidInput(
            "Query contains invalid null character".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::storage::local::LocalStorageBackend;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn setup() -> (TempDir, LocalStorageBackend) {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("content");
        fs::create_dir_all(root.join("work")).unwrap();
        write(&root, "alpha.md", "Alpha Guide", "x, y", "Getting started with alpha.");
        write(&root, "beta.md", "Beta", "y", "Second document.");
        write(&root, "work/gamma.md", "Gamma", "rust, yaml", "Mentions alpha once.");
        let storage = LocalStorageBackend::new(&Config::with_content_root(&root).content);
        (temp, storage)
    }

    fn write(root: &Path, rel: &str, title: &str, tags: &str, body: &str) {
        fs::write(
            root.join(rel),
            format!("---\ntitle: \"{title}\"\ntags: [{tags}]\n---\n{body}\n"),
        )
        .unwrap();
    }

    fn paths(hits: &[SearchHit]) -> Vec<&str> {
        hits.iter().map(|h| h.summary.path.as_str()).collect()
    }

    #[test]
    fn title_hit_ranks_first() {
        let (_temp, storage) = setup();
        let hits = SearchEngine::new(&storage)
            .search("alpha", &SearchOptions::default())
            .unwrap();

        assert_eq!(paths(&hits), vec!["alpha.md", "work/gamma.md"]);
        assert!(hits[0].score >= 100);
        assert!(hits[0].excerpt.contains("alpha"));
    }

    #[test]
    fn knowledgebase_scope() {
        let (_temp, storage) = setup();
        let options = SearchOptions {
            knowledgebase: Knowledgebase::Named("work".into()),
            ..SearchOptions::default()
        };
        let hits = SearchEngine::new(&storage).search("alpha", &options).unwrap();
        assert_eq!(paths(&hits), vec!["work/gamma.md"]);
    }

    #[test]
    fn tag_listing_uses_tag_scores() {
        let (_temp, storage) = setup();
        let engine = SearchEngine::new(&storage);

        let hits = engine.search("tag:y", &SearchOptions::default()).unwrap();
        // gamma only has "yaml", a prefix match
        let scores: HashMap<&str, u32> = hits
            .iter()
            .map(|h| (h.summary.path.as_str(), h.score))
            .collect();
        assert_eq!(scores["alpha.md"], 100);
        assert_eq!(scores["beta.md"], 100);
        assert_eq!(scores["work/gamma.md"], 80);
        assert_eq!(hits.last().unwrap().summary.path, "work/gamma.md");

        let exact = engine.search("tag:\"y\"", &SearchOptions::default()).unwrap();
        assert_eq!(exact.len(), 2);
    }

    #[test]
    fn limit_truncates() {
        let (_temp, storage) = setup();
        let options = SearchOptions {
            limit: Some(1),
            ..SearchOptions::default()
        };
        let hits = SearchEngine::new(&storage).search("alpha", &options).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn rejects_bad_queries() {
        let (_temp, storage) = setup();
        let engine = SearchEngine::new(&storage);
        let long = "a".repeat(MAX_QUERY_LENGTH + 1);
        assert!(matches!(
            engine.search(&long, &SearchOptions::default()),
            Err(KbError::InvalidInput(_))
        ));
        assert!(matches!(
            engine.search("a\0b", &SearchOptions::default()),
            Err(KbError::InvalidInput(_))
        ));
        assert!(engine.search("   ", &SearchOptions::default()).unwrap().is_empty());
    }

    #[test]
    fn suggestions_complete_prefixes() {
        let (_temp, storage) = setup();
        let words = SearchEngine::new(&storage)
            .suggest("se", DEFAULT_SUGGESTIONS, &Knowledgebase::All)
            .unwrap();
        assert_eq!(words, vec!["second"]);

        let words = SearchEngine::new(&storage)
            .suggest("AL", DEFAULT_SUGGESTIONS, &Knowledgebase::All)
            .unwrap();
        assert_eq!(words, vec!["alpha"]);
    }
}
