//! Tag aggregation derived from document frontmatter.
//!
//! Nothing is persisted: every call rescans the documents in scope.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;

use crate::corpus::frontmatter::{self, MetaValue};
use crate::corpus::{DocumentSummary, Knowledgebase};
use crate::error::{KbError, Result};
use crate::storage::StorageBackend;

/// Default number of related tags and suggestions returned.
pub const DEFAULT_LIMIT: usize = 5;

/// Score for a document tag equal to the requested tag.
const EXACT_TAG_SCORE: u32 = 100;
const PREFIX_TAG_SCORE: u32 = 80;
const CONTAINS_TAG_SCORE: u32 = 60;

/// Common words never proposed as tags.
const STOP_WORDS: &[&str] = &[
    "the", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by", "is", "are",
    "was", "were", "be", "been", "have", "has", "had", "do", "does", "did", "will", "would",
    "could", "should", "may", "might", "can", "this", "that", "these", "those", "a", "an",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagCount {
    pub tag: String,
    pub count: usize,
}

/// A tag with its usage normalised to `0.0..=1.0` against the least and
/// most used tags.
#[derive(Debug, Clone, Serialize)]
pub struct TagCloudEntry {
    pub tag: String,
    pub count: usize,
    pub weight: f64,
}

/// A node of the tag hierarchy built from `a/b/c` or `a:b:c` tags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TagTree {
    pub children: BTreeMap<String, TagTree>,
}

impl TagTree {
    fn insert(&mut self, parts: &[&str]) {
        let mut node = self;
        for part in parts {
            node = node.children.entry((*part).to_string()).or_default();
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TagStats {
    pub total_tags: usize,
    pub total_usages: usize,
    /// Average over documents that carry at least one tag.
    pub avg_tags_per_document: f64,
    pub most_used_tag: Option<String>,
    pub least_used_tag: Option<String>,
    pub documents_without_tags: usize,
}

/// A document matched by tag, with its summed tag score.
#[derive(Debug, Clone, Serialize)]
pub struct TaggedDocument {
    #[serde(flatten)]
    pub summary: DocumentSummary,
    pub score: u32,
}

/// Tag queries over one storage backend.
pub struct TagIndex<'a> {
    storage: &'a dyn StorageBackend,
}

impl<'a> TagIndex<'a> {
    #[must_use]
    pub fn new(storage: &'a dyn StorageBackend) -> Self {
        Self { storage }
    }

    /// Every tag with its document count, most used first.
    ///
    /// # Errors
    ///
    /// Returns an error if the documents in scope cannot be listed.
    pub fn all_tags(&self, kb: &Knowledgebase) -> Result<Vec<TagCount>> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for doc in self.storage.list_all(kb)? {
            for tag in doc.tags {
                *counts.entry(tag).or_default() += 1;
            }
        }
        Ok(sorted_counts(counts))
    }

    /// Tags that co-occur with `tag`, ranked by shared-document count.
    ///
    /// # Errors
    ///
    /// Returns an error if the documents in scope cannot be listed.
    pub fn related_tags(
        &self,
        tag: &str,
        limit: usize,
        kb: &Knowledgebase,
    ) -> Result<Vec<TagCount>> {
        let target = tag.trim().to_lowercase();
        let mut counts: HashMap<String, usize> = HashMap::new();

        for doc in self.storage.list_all(kb)? {
            if !doc.tags.iter().any(|t| t.to_lowercase() == target) {
                continue;
            }
            for other in doc.tags {
                if other.to_lowercase() != target {
                    *counts.entry(other).or_default() += 1;
                }
            }
        }

        let mut related = sorted_counts(counts);
        related.truncate(limit);
        Ok(related)
    }

    /// Tags grouped into a tree by splitting on `/`, or on `:` when a tag
    /// has no `/`.
    ///
    /// # Errors
    ///
    /// Returns an error if the documents in scope cannot be listed.
    pub fn hierarchy(&self, kb: &Knowledgebase) -> Result<TagTree> {
        let mut tree = TagTree::default();
        for TagCount { tag, .. } in self.all_tags(kb)? {
            let separator = if tag.contains('/') { '/' } else { ':' };
            let parts: Vec<&str> = tag
                .split(separator)
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .collect();
            tree.insert(&parts);
        }
        Ok(tree)
    }

    /// Tags weighted for display.
    ///
    /// # Errors
    ///
    /// Returns an error if the documents in scope cannot be listed.
    pub fn cloud(&self, kb: &Knowledgebase) -> Result<Vec<TagCloudEntry>> {
        let tags = self.all_tags(kb)?;
        let (Some(max), Some(min)) = (
            tags.iter().map(|t| t.count).max(),
            tags.iter().map(|t| t.count).min(),
        ) else {
            return Ok(Vec::new());
        };

        #[allow(clippy::cast_precision_loss)]
        let weight = |count: usize| {
            if max == min {
                1.0
            } else {
                (count - min) as f64 / (max - min) as f64
            }
        };

        Ok(tags
            .into_iter()
            .map(|TagCount { tag, count }| TagCloudEntry {
                weight: weight(count),
                tag,
                count,
            })
            .collect())
    }

    /// Suggest tags for `text`: existing tags it mentions, then frequent
    /// words that are not yet tags.
    ///
    /// # Errors
    ///
    /// Returns an error if the documents in scope cannot be listed.
    pub fn suggest_tags(&self, text: &str, limit: usize, kb: &Knowledgebase) -> Result<Vec<String>> {
        let text: String = text
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '_' { c } else { ' ' })
            .collect();

        let existing = self.all_tags(kb)?;
        let existing_lower: HashSet<String> =
            existing.iter().map(|t| t.tag.to_lowercase()).collect();

        let mut suggestions: HashMap<String, usize> = HashMap::new();
        for TagCount { tag, .. } in existing {
            let needle = tag.to_lowercase();
            if needle.is_empty() {
                continue;
            }
            let hits = text.matches(needle.as_str()).count();
            if hits > 0 {
                suggestions.insert(tag, hits);
            }
        }

        let mut word_freq: HashMap<&str, usize> = HashMap::new();
        for word in text.split_whitespace() {
            if word.chars().all(char::is_alphabetic) {
                *word_freq.entry(word).or_default() += 1;
            }
        }
        for (word, freq) in word_freq {
            if freq > 1
                && word.chars().count() > 3
                && !STOP_WORDS.contains(&word)
                && !existing_lower.contains(word)
            {
                suggestions.insert(word.to_string(), freq);
            }
        }

        let mut ranked = sorted_counts(suggestions);
        ranked.truncate(limit);
        Ok(ranked.into_iter().map(|t| t.tag).collect())
    }

    /// Summary statistics over tag usage.
    ///
    /// # Errors
    ///
    /// Returns an error if the documents in scope cannot be listed.
    pub fn stats(&self, kb: &Knowledgebase) -> Result<TagStats> {
        let documents = self.storage.list_all(kb)?;
        let mut counts: HashMap<String, usize> = HashMap::new();
        let mut tagged = 0usize;
        let mut untagged = 0usize;
        let mut usages = 0usize;

        for doc in documents {
            if doc.tags.is_empty() {
                untagged += 1;
                continue;
            }
            tagged += 1;
            usages += doc.tags.len();
            for tag in doc.tags {
                *counts.entry(tag).or_default() += 1;
            }
        }

        let tags = sorted_counts(counts);
        #[allow(clippy::cast_precision_loss)]
        let avg = if tagged == 0 {
            0.0
        } else {
            (usages as f64 / tagged as f64 * 100.0).round() / 100.0
        };

        Ok(TagStats {
            total_tags: tags.len(),
            total_usages: usages,
            avg_tags_per_document: avg,
            most_used_tag: tags.first().map(|t| t.tag.clone()),
            least_used_tag: tags.last().map(|t| t.tag.clone()),
            documents_without_tags: untagged,
        })
    }

    /// Documents carrying `tag`, ranked exact (100) over starts-with (80)
    /// over contains (60), summed over each document's tags. `exact`
    /// restricts matching to the exact case.
    ///
    /// # Errors
    ///
    /// Returns an error if the documents in scope cannot be listed.
    pub fn files_by_tag(
        &self,
        tag: &str,
        exact: bool,
        kb: &Knowledgebase,
    ) -> Result<Vec<TaggedDocument>> {
        let wanted = tag.trim().to_lowercase();
        if wanted.is_empty() {
            return Ok(Vec::new());
        }

        let mut matches: Vec<TaggedDocument> = self
            .storage
            .list_all(kb)?
            .into_iter()
            .filter_map(|summary| {
                let score: u32 = summary
                    .tags
                    .iter()
                    .map(|t| tag_score(&t.to_lowercase(), &wanted, exact))
                    .sum();
                (score > 0).then_some(TaggedDocument { summary, score })
            })
            .collect();

        matches.sort_by(|a, b| b.score.cmp(&a.score));
        Ok(matches)
    }

    /// Replace `old` with `new` in every document's tags. Returns the number
    /// of documents rewritten.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an empty tag, or the first storage error.
    pub fn rename_tag(&self, old: &str, new: &str, kb: &Knowledgebase) -> Result<usize> {
        let (old, new) = (old.trim(), new.trim());
        if old.is_empty() || new.is_empty() {
            return Err(KbError::InvalidInput("Tag cannot be empty".to_string()));
        }
        if old == new {
            return Ok(0);
        }

        self.rewrite_tags(kb, old, |tags| {
            let mut out: Vec<String> = Vec::with_capacity(tags.len());
            for tag in tags {
                let tag = if tag == old { new.to_string() } else { tag };
                if !out.contains(&tag) {
                    out.push(tag);
                }
            }
            out
        })
    }

    /// Remove `tag` from every document. Returns the number of documents
    /// rewritten.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an empty tag, or the first storage error.
    pub fn remove_tag(&self, tag: &str, kb: &Knowledgebase) -> Result<usize> {
        let tag = tag.trim();
        if tag.is_empty() {
            return Err(KbError::InvalidInput("Tag cannot be empty".to_string()));
        }

        self.rewrite_tags(kb, tag, |tags| tags.into_iter().filter(|t| t != tag).collect())
    }

    /// Rewrite the tags of each document carrying `tag` and persist it
    /// through the storage backend, which backs up the previous version.
    fn rewrite_tags<F>(&self, kb: &Knowledgebase, tag: &str, update: F) -> Result<usize>
    where
        F: Fn(Vec<String>) -> Vec<String>,
    {
        let mut rewritten = 0;

        for summary in self.storage.list_all(kb)? {
            if !summary.tags.iter().any(|t| t == tag) {
                continue;
            }

            let doc = self.storage.read(&summary.path)?;
            let mut metadata = doc.metadata;
            let tags = update(frontmatter::tags(&metadata));
            if tags.is_empty() {
                metadata.remove("tags");
            } else {
                metadata.insert("tags".to_string(), MetaValue::List(tags));
            }

            let content = frontmatter::serialize(&metadata, &doc.body);
            self.storage.overwrite(&summary.path, &content)?;
            rewritten += 1;
        }

        log::info!("Rewrote tags in {rewritten} document(s)");
        Ok(rewritten)
    }
}

fn tag_score(doc_tag: &str, wanted: &str, exact: bool) -> u32 {
    if doc_tag == wanted {
        EXACT_TAG_SCORE
    } else if exact {
        0
    } else if doc_tag.starts_with(wanted) {
        PREFIX_TAG_SCORE
    } else if doc_tag.contains(wanted) {
        CONTAINS_TAG_SCORE
    } else {
        0
    }
}

/// Counts sorted by count descending, then name.
fn sorted_counts(counts: HashMap<String, usize>) -> Vec<TagCount> {
    let mut out: Vec<TagCount> = counts
        .into_iter()
        .map(|(tag, count)| TagCount { tag, count })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.tag.cmp(&b.tag)));
    out
}
