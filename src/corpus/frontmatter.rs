//! Parse and serialize the `---` delimited metadata header of a document.
//!
//! Hand-rolled rather than full YAML: only `key: value` lines are understood,
//! with `[a, b]` inline lists. Anything malformed degrades to "no metadata"
//! and the whole text becomes the body.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Delimiter line opening and closing the metadata block.
pub const DELIMITER: &str = "---";

/// A single metadata value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Scalar(String),
    List(Vec<String>),
}

impl MetaValue {
    #[must_use]
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Self::Scalar(s) => Some(s),
            Self::List(_) => None,
        }
    }
}

/// Metadata keyed by field name.
pub type Metadata = BTreeMap<String, MetaValue>;

/// Split `content` into `(metadata, body)`. Never fails.
#[must_use]
pub fn parse(content: &str) -> (Metadata, String) {
    match split(content) {
        Some((block, body)) => (parse_block(block), body.to_string()),
        None => (Metadata::new(), content.to_string()),
    }
}

/// Body with any metadata block removed.
#[must_use]
pub fn strip(content: &str) -> &str {
    split(content).map_or(content, |(_, body)| body)
}

/// Render `metadata` as a header followed by `body`.
#[must_use]
pub fn serialize(metadata: &Metadata, body: &str) -> String {
    let mut out = String::with_capacity(body.len() + 64);
    out.push_str(DELIMITER);
    out.push('\n');

    for (key, value) in metadata {
        out.push_str(key);
        out.push_str(": ");
        match value {
            MetaValue::Scalar(s) => out.push_str(&quote(s)),
            MetaValue::List(items) => {
                out.push('[');
                let quoted: Vec<String> = items.iter().map(|i| quote(i)).collect();
                out.push_str(&quoted.join(", "));
                out.push(']');
            }
        }
        out.push('\n');
    }

    out.push_str(DELIMITER);
    out.push('\n');
    out.push_str(body);
    out
}

/// Frontmatter title, if present and non-empty.
#[must_use]
pub fn title(metadata: &Metadata) -> Option<&str> {
    metadata
        .get("title")
        .and_then(MetaValue::as_scalar)
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Tags from the `tags` field, trimmed and deduplicated.
///
/// A scalar `tags` value is treated as a comma-separated list.
#[must_use]
pub fn tags(metadata: &Metadata) -> Vec<String> {
    let raw: Vec<String> = match metadata.get("tags") {
        Some(MetaValue::List(items)) => items.clone(),
        Some(MetaValue::Scalar(s)) => s.split(',').map(str::to_string).collect(),
        None => return Vec::new(),
    };

    let mut out: Vec<String> = Vec::with_capacity(raw.len());
    for tag in raw {
        let tag = tag.trim();
        if !tag.is_empty() && !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}

/// Split off the header block. Returns `(block, body)` when the content starts
/// with a delimiter line and a closing delimiter line follows.
fn split(content: &str) -> Option<(&str, &str)> {
    let mut lines = content.split_inclusive('\n');
    let first = lines.next()?;
    if !first.ends_with('\n') || !is_delimiter(first) {
        return None;
    }

    let block_start = first.len();
    let mut offset = block_start;
    for line in lines {
        if is_delimiter(line) {
            return Some((&content[block_start..offset], &content[offset + line.len()..]));
        }
        offset += line.len();
    }

    None
}

fn is_delimiter(line: &str) -> bool {
    line.trim_end() == DELIMITER
}

fn parse_block(block: &str) -> Metadata {
    let mut metadata = Metadata::new();

    for line in block.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let Some((key, value)) = trimmed.split_once(':') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }

        let value = value.trim();
        let parsed = if value.starts_with('[') && value.ends_with(']') && value.len() >= 2 {
            MetaValue::List(parse_inline_list(&value[1..value.len() - 1]))
        } else {
            MetaValue::Scalar(unquote(value))
        };
        metadata.insert(key.to_string(), parsed);
    }

    metadata
}

/// Parse the inside of `[...]`, splitting on commas outside quotes.
fn parse_inline_list(inner: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut quote_char: Option<char> = None;
    let mut escaped = false;

    for c in inner.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match quote_char {
            Some('"') if c == '\\' => {
                current.push(c);
                escaped = true;
            }
            Some(q) if c == q => {
                current.push(c);
                quote_char = None;
            }
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                current.push(c);
                quote_char = Some(c);
            }
            None if c == ',' => {
                push_list_item(&mut items, &current);
                current.clear();
            }
            None => current.push(c),
        }
    }
    push_list_item(&mut items, &current);

    items
}

fn push_list_item(items: &mut Vec<String>, raw: &str) {
    let raw = raw.trim();
    if !raw.is_empty() {
        items.push(unquote(raw));
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Remove surrounding quotes, resolving escapes inside double quotes.
fn unquote(s: &str) -> String {
    let s = s.trim();
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        unescape(&s[1..s.len() - 1])
    } else if s.len() >= 2 && s.starts_with('\'') && s.ends_with('\'') {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
