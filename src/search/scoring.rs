//! Additive relevance scoring, excerpts and highlights.

use chrono::{DateTime, Duration, Utc};
use regex::Regex;

use crate::search::query::ParsedQuery;

pub const TAG_GROUP_SCORE: u32 = 50;
pub const PHRASE_BODY_SCORE: u32 = 100;
pub const PHRASE_TITLE_SCORE: u32 = 200;
pub const TITLE_OCCURRENCE_SCORE: u32 = 100;
pub const BODY_OCCURRENCE_SCORE: u32 = 10;
pub const WORD_BOUNDARY_SCORE: u32 = 20;
pub const HEADING_SCORE: u32 = 30;
pub const DESCRIPTION_SCORE: u32 = 25;
pub const RECENT_WEEK_SCORE: u32 = 5;
pub const RECENT_MONTH_SCORE: u32 = 2;

const EXCERPT_WINDOW: usize = 100;
const EXCERPT_LEAD: usize = 50;
const EXCERPT_LENGTH: usize = 200;
const HIGHLIGHT_RADIUS: usize = 30;
const HIGHLIGHTS_PER_TERM: usize = 3;
const ELLIPSIS: &str = "...";

/// The fields of one document that a query is scored against.
pub struct Candidate<'a> {
    pub title: &'a str,
    pub body: &'a str,
    pub description: Option<&'a str>,
    pub tags: &'a [String],
    pub modified: DateTime<Utc>,
}

/// Lower-case each character to exactly one character, so that character
/// offsets in the folded text match the original.
#[must_use]
pub fn fold(text: &str) -> String {
    text.chars()
        .map(|c| c.to_lowercase().next().unwrap_or(c))
        .collect()
}

/// Score `doc` against `query`, or `None` when it is not a hit.
///
/// Compiles the query's word-boundary patterns on every call; use a
/// [`Scorer`] when scoring many documents against one query.
#[must_use]
pub fn score(query: &ParsedQuery, doc: &Candidate<'_>, now: DateTime<Utc>) -> Option<u32> {
    Scorer::new(query).score(doc, now)
}

/// A query prepared for scoring many documents.
pub struct Scorer<'q> {
    query: &'q ParsedQuery,
    boundaries: Vec<Option<Regex>>,
}

impl<'q> Scorer<'q> {
    /// Compile one word-boundary pattern per term.
    #[must_use]
    pub fn new(query: &'q ParsedQuery) -> Self {
        let boundaries = query
            .terms
            .iter()
            .map(|term| Regex::new(&format!(r"\b{}\b", regex::escape(term))).ok())
            .collect();
        Self { query, boundaries }
    }

    /// Score `doc`, or `None` when it is not a hit.
    ///
    /// A hit satisfies every tag group, contains no exclusion in its body,
    /// contains every phrase in its title or body, and matches at least one
    /// term when the query has terms. Totals saturate at `u32::MAX`.
    #[must_use]
    pub fn score(&self, doc: &Candidate<'_>, now: DateTime<Utc>) -> Option<u32> {
        let query = self.query;
        let title = fold(doc.title);
        let body = fold(doc.body);
        let description = doc.description.map(fold);
        let mut total = 0u32;

        for group in &query.tag_groups {
            if !group.matches(doc.tags) {
                return None;
            }
            total = total.saturating_add(TAG_GROUP_SCORE);
        }

        if query.excludes.iter().any(|ex| body.contains(ex.as_str())) {
            return None;
        }

        for phrase in &query.phrases {
            let in_body = body.contains(phrase.as_str());
            let in_title = title.contains(phrase.as_str());
            if !in_body && !in_title {
                return None;
            }
            if in_body {
                total = total.saturating_add(PHRASE_BODY_SCORE);
            }
            if in_title {
                total = total.saturating_add(PHRASE_TITLE_SCORE);
            }
        }

        let mut term_matched = false;

        for (term, boundary) in query.terms.iter().zip(&self.boundaries) {
            let title_hits = count(&title, term);
            let body_hits = count(&body, term);
            total = total
                .saturating_add(TITLE_OCCURRENCE_SCORE.saturating_mul(title_hits))
                .saturating_add(BODY_OCCURRENCE_SCORE.saturating_mul(body_hits));

            if body_hits > 0 {
                if boundary.as_ref().is_some_and(|re| re.is_match(&body)) {
                    total = total.saturating_add(WORD_BOUNDARY_SCORE);
                }
                if in_heading(doc.body, term) {
                    total = total.saturating_add(HEADING_SCORE);
                }
            }

            let in_description = description
                .as_deref()
                .is_some_and(|d| d.contains(term.as_str()));
            if in_description {
                total = total.saturating_add(DESCRIPTION_SCORE);
            }

            term_matched |= title_hits > 0 || body_hits > 0 || in_description;
        }

        for term in &query.title_terms {
            let hits = count(&title, term);
            total = total.saturating_add(TITLE_OCCURRENCE_SCORE.saturating_mul(hits));
            term_matched |= hits > 0;
        }

        let has_terms = !query.terms.is_empty() || !query.title_terms.is_empty();
        if has_terms && !term_matched {
            return None;
        }
        if !has_terms && query.phrases.is_empty() && query.tag_groups.is_empty() {
            return None;
        }

        Some(total.saturating_add(recency_bonus(doc.modified, now)))
    }
}

#[must_use]
pub fn recency_bonus(modified: DateTime<Utc>, now: DateTime<Utc>) -> u32 {
    let age = now - modified;
    if age < Duration::days(7) {
        RECENT_WEEK_SCORE
    } else if age < Duration::days(30) {
        RECENT_MONTH_SCORE
    } else {
        0
    }
}

/// An excerpt of about 200 characters around the densest cluster of
/// `terms`, with `...` marking truncated ends.
#[must_use]
pub fn excerpt(body: &str, terms: &[&str]) -> String {
    let chars: Vec<char> = body.chars().collect();
    let folded = fold(body);

    let mut best_start = 0;
    let mut best_hits = 0;

    for term in terms {
        let Some(pos) = char_positions(&folded, term).into_iter().next() else {
            continue;
        };
        let window_start = pos.saturating_sub(EXCERPT_WINDOW);
        let window_end = (pos + EXCERPT_WINDOW).min(chars.len());
        let window: String = folded
            .chars()
            .skip(window_start)
            .take(window_end - window_start)
            .collect();
        let hits: u32 = terms.iter().map(|t| count(&window, t)).sum();

        if hits > best_hits {
            best_hits = hits;
            best_start = pos.saturating_sub(EXCERPT_LEAD);
        }
    }

    let end = (best_start + EXCERPT_LENGTH).min(chars.len());
    let text = collapse_whitespace(&chars[best_start..end]);

    let mut out = String::with_capacity(text.len() + 2 * ELLIPSIS.len());
    if best_start > 0 {
        out.push_str(ELLIPSIS);
    }
    out.push_str(&text);
    if end < chars.len() {
        out.push_str(ELLIPSIS);
    }
    out
}

/// Up to three short snippets per term, each about 30 characters either
/// side of an occurrence. Duplicates are dropped.
#[must_use]
pub fn highlights(body: &str, terms: &[&str]) -> Vec<String> {
    let chars: Vec<char> = body.chars().collect();
    let folded = fold(body);
    let mut out: Vec<String> = Vec::new();

    for term in terms {
        for pos in char_positions(&folded, term)
            .into_iter()
            .take(HIGHLIGHTS_PER_TERM)
        {
            let start = pos.saturating_sub(HIGHLIGHT_RADIUS);
            let end = (start + 2 * HIGHLIGHT_RADIUS).min(chars.len());

            let mut snippet = String::new();
            if start > 0 {
                snippet.push_str(ELLIPSIS);
            }
            snippet.push_str(&collapse_whitespace(&chars[start..end]));
            if end < chars.len() {
                snippet.push_str(ELLIPSIS);
            }

            if !out.contains(&snippet) {
                out.push(snippet);
            }
        }
    }

    out
}

/// Non-overlapping occurrences of `needle` in `haystack`.
fn count(haystack: &str, needle: &str) -> u32 {
    if needle.is_empty() {
        return 0;
    }
    u32::try_from(haystack.matches(needle).count()).unwrap_or(u32::MAX)
}

/// Character offsets of non-overlapping occurrences of `needle`.
fn char_positions(haystack: &str, needle: &str) -> Vec<usize> {
    if needle.is_empty() {
        return Vec::new();
    }
    let mut positions = Vec::new();
    let mut chars_seen = 0;
    let mut last_byte = 0;
    for (byte, _) in haystack.match_indices(needle) {
        chars_seen += haystack[last_byte..byte].chars().count();
        last_byte = byte;
        positions.push(chars_seen);
    }
    positions
}

/// Whether `term` occurs on a markdown heading line (`#` to `######`).
fn in_heading(body: &str, term: &str) -> bool {
    body.lines().any(|line| {
        let hashes = line.chars().take_while(|c| *c == '#').count();
        (1..=6).contains(&hashes)
            && line[hashes..].starts_with(char::is_whitespace)
            && fold(line).contains(term)
    })
}

fn collapse_whitespace(chars: &[char]) -> String {
    let mut out = String::with_capacity(chars.len());
    let mut pending_space = false;
    for &c in chars {
        if c.is_whitespace() {
            pending_space = !out.is_empty();
        } else {
            if pending_space {
                out.push(' ');
                pending_space = false;
            }
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::query::parse;

    fn candidate<'a>(title: &'a str, body: &'a str, tags: &'a [String]) -> Candidate<'a> {
        Candidate {
            title,
            body,
            description: None,
            tags,
            modified: Utc::now() - Duration::days(365),
        }
    }

    #[test]
    fn title_outweighs_body() {
        let q = parse("alpha");
        let in_title = score(&q, &candidate("Alpha Guide", "nothing", &[]), Utc::now());
        let in_body = score(&q, &candidate("Other", "alpha", &[]), Utc::now());
        assert_eq!(in_title, Some(100));
        assert_eq!(in_body, Some(10 + 20));
    }

    #[test]
    fn heading_and_description_bonuses() {
        let q = parse("setup");
        let mut doc = candidate("Doc", "# Setup steps\nrun setup", &[]);
        doc.description = Some("Setup notes");
        // two body hits, boundary, heading, description
        assert_eq!(score(&q, &doc, Utc::now()), Some(20 + 20 + 30 + 25));
    }

    #[test]
    fn word_boundary_needs_whole_word() {
        let q = parse("cat");
        let s = score(&q, &candidate("x", "concatenate", &[]), Utc::now());
        assert_eq!(s, Some(10));
    }

    #[test]
    fn unmatched_document_is_not_a_hit() {
        let q = parse("zebra");
        let mut doc = candidate("Fresh", "new text", &[]);
        doc.modified = Utc::now();
        assert_eq!(score(&q, &doc, Utc::now()), None);
    }

    #[test]
    fn exclusion_rejects_on_body_match() {
        let q = parse("alpha -draft");
        assert_eq!(
            score(&q, &candidate("Alpha", "this is a DRAFT", &[]), Utc::now()),
            None
        );
        assert!(score(&q, &candidate("Alpha draft", "final", &[]), Utc::now()).is_some());
    }

    #[test]
    fn phrases_are_required() {
        let q = parse(r#""error handling""#);
        let hit = score(&q, &candidate("Error handling", "error handling", &[]), Utc::now());
        assert_eq!(hit, Some(300));
        assert_eq!(
            score(&q, &candidate("Errors", "handling errors", &[]), Utc::now()),
            None
        );
    }

    #[test]
    fn tag_groups_filter_and_score() {
        let tags = vec!["rust".to_string()];
        let q = parse("tag:rust alpha");
        assert_eq!(
            score(&q, &candidate("Alpha", "", &tags), Utc::now()),
            Some(50 + 100)
        );
        assert_eq!(score(&q, &candidate("Alpha", "", &[]), Utc::now()), None);
    }

    #[test]
    fn title_terms_ignore_body() {
        let q = parse("title:guide");
        assert_eq!(score(&q, &candidate("Notes", "guide guide", &[]), Utc::now()), None);
        assert_eq!(score(&q, &candidate("Guide", "", &[]), Utc::now()), Some(100));
    }

    #[test]
    fn recency_is_not_cumulative() {
        let now = Utc::now();
        assert_eq!(recency_bonus(now - Duration::days(1), now), 5);
        assert_eq!(recency_bonus(now - Duration::days(10), now), 2);
        assert_eq!(recency_bonus(now - Duration::days(60), now), 0);
    }

    #[test]
    fn more_occurrences_never_lower_score() {
        let q = parse("alpha beta");
        let mut body = String::from("start ");
        let mut last = 0;
        for _ in 0..20 {
            body.push_str("alpha ");
            let s = score(&q, &candidate("t", &body, &[]), Utc::now()).unwrap();
            assert!(s >= last);
            last = s;
        }
    }

    #[test]
    fn prepared_scorer_matches_one_shot_scoring() {
        let q = parse("cat setup");
        let scorer = Scorer::new(&q);
        let now = Utc::now();
        for body in ["cat", "concatenate", "# Setup\nthe cat", "dog"] {
            let doc = candidate("x", body, &[]);
            assert_eq!(scorer.score(&doc, now), score(&q, &doc, now));
        }
    }

    #[test]
    fn huge_occurrence_counts_saturate() {
        let q = parse("a title:a");
        let title = "a".repeat(25_000_000);
        let doc = candidate(&title, &title, &[]);
        assert_eq!(score(&q, &doc, Utc::now()), Some(u32::MAX));
    }

    #[test]
    fn excerpt_centres_on_dense_region() {
        let body = format!("{}needle needle{}", "a ".repeat(200), " b".repeat(200));
        let ex = excerpt(&body, &["needle"]);
        assert!(ex.starts_with("..."));
        assert!(ex.ends_with("..."));
        assert!(ex.contains("needle needle"));
    }

    #[test]
    fn excerpt_of_short_body_is_whole_body() {
        assert_eq!(excerpt("Short\n\n body", &["body"]), "Short body");
        assert_eq!(excerpt("", &["x"]), "");
    }

    #[test]
    fn highlights_cap_per_term() {
        let body = "x ".repeat(100) + &"term ".repeat(10);
        let hl = highlights(&body, &["term"]);
        assert!(!hl.is_empty() && hl.len() <= 3);
        assert!(hl.iter().all(|h| h.contains("term")));
    }

    #[test]
    fn fold_preserves_char_count() {
        let text = "Straße İstanbul ÅSA";
        assert_eq!(fold(text).chars().count(), text.chars().count());
    }
}
