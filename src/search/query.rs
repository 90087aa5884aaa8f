//! Query grammar.
//!
//! Tokens are whitespace separated, with double quotes grouping:
//!
//! - `"exact phrase"`: must occur in the title or body
//! - `tag:x`: document needs a tag containing `x`; `tag:"x"` needs tag `x`
//!   exactly; `tag:a,b` accepts either
//! - `title:x`: term matched against the title only
//! - `-x`: any body occurrence rejects the document
//! - anything else is a free term matched against title and body
//!
//! All values are lower-cased.

/// How a tag group compares against document tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagMatch {
    Contains,
    Exact,
}

/// One `tag:` token. Satisfied when any alternative matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagGroup {
    pub alternatives: Vec<String>,
    pub mode: TagMatch,
}

impl TagGroup {
    #[must_use]
    pub fn matches(&self, tags: &[String]) -> bool {
        tags.iter().any(|tag| {
            let tag = tag.to_lowercase();
            self.alternatives.iter().any(|alt| match self.mode {
                TagMatch::Exact => tag == *alt,
                TagMatch::Contains => tag.contains(alt.as_str()),
            })
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedQuery {
    pub terms: Vec<String>,
    pub title_terms: Vec<String>,
    pub phrases: Vec<String>,
    pub tag_groups: Vec<TagGroup>,
    pub excludes: Vec<String>,
}

impl ParsedQuery {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
            && self.title_terms.is_empty()
            && self.phrases.is_empty()
            && self.tag_groups.is_empty()
            && self.excludes.is_empty()
    }

    /// A query consisting of a single `tag:` token is a tag listing rather
    /// than a free-text search.
    #[must_use]
    pub fn as_tag_listing(&self) -> Option<&TagGroup> {
        match self.tag_groups.as_slice() {
            [group]
                if self.terms.is_empty()
                    && self.title_terms.is_empty()
                    && self.phrases.is_empty()
                    && self.excludes.is_empty() =>
            {
                Some(group)
            }
            _ => None,
        }
    }

    /// Terms used for excerpts and highlights, in query order.
    #[must_use]
    pub fn highlight_terms(&self) -> Vec<&str> {
        self.phrases
            .iter()
            .chain(&self.terms)
            .chain(&self.title_terms)
            .map(String::as_str)
            .collect()
    }
}

/// Parse a query string. Unbalanced quotes run to the end of the input.
#[must_use]
pub fn parse(query: &str) -> ParsedQuery {
    let mut parsed = ParsedQuery::default();

    for token in tokenize(query) {
        if token.starts_with('"') {
            push_value(&mut parsed.phrases, &token);
        } else if let Some(value) = strip_prefix_ignore_case(&token, "tag:") {
            let mode = if value.starts_with('"') {
                TagMatch::Exact
            } else {
                TagMatch::Contains
            };
            let alternatives: Vec<String> = unquote(value)
                .split(',')
                .map(|alt| alt.trim().to_lowercase())
                .filter(|alt| !alt.is_empty())
                .collect();
            if !alternatives.is_empty() {
                parsed.tag_groups.push(TagGroup { alternatives, mode });
            }
        } else if let Some(value) = strip_prefix_ignore_case(&token, "title:") {
            push_value(&mut parsed.title_terms, value);
        } else if let Some(value) = token.strip_prefix('-') {
            push_value(&mut parsed.excludes, value);
        } else {
            push_value(&mut parsed.terms, &token);
        }
    }

    parsed
}

/// Split on whitespace outside double quotes, keeping the quotes.
fn tokenize(query: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in query.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}

fn push_value(into: &mut Vec<String>, raw: &str) {
    let value = unquote(raw).trim().to_lowercase();
    if !value.is_empty() && !into.contains(&value) {
        into.push(value);
    }
}

fn unquote(raw: &str) -> String {
    raw.chars().filter(|c| *c != '"').collect()
}

fn strip_prefix_ignore_case<'a>(token: &'a str, prefix: &str) -> Option<&'a str> {
    let head = token.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &token[prefix.len()..])
}
