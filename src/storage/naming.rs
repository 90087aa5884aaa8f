//! Filename sanitization, title slugs, and path validation.

use chrono::Utc;

use crate::corpus::ROOT_KNOWLEDGEBASE;
use crate::error::{KbError, Result};

/// Characters that are unsafe in filenames on at least one common filesystem.
const ILLEGAL_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Maximum length of a filename stem, in characters.
pub const MAX_STEM_CHARS: usize = 200;

/// Maximum length for knowledgebase names.
const MAX_KB_NAME_LENGTH: usize = 100;

/// Turn arbitrary input into a safe `.md` filename.
///
/// Strips filesystem-illegal and control characters, collapses whitespace runs
/// to a hyphen, keeps non-ASCII letters, and forces the `.md` extension.
/// Idempotent: sanitizing an already sanitized name returns it unchanged.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let name = name.trim();
    let stem = clean_stem(strip_md_extension(name));
    if stem.is_empty() {
        "untitled.md".to_string()
    } else {
        format!("{stem}.md")
    }
}

/// Filename for a document titled `title`: sanitized and lower-cased.
///
/// Titles that sanitize to nothing get a timestamped name instead of failing.
#[must_use]
pub fn slugify_title(title: &str) -> String {
    let stem = clean_stem(&title.trim().to_lowercase());
    if stem.is_empty() {
        format!("untitled-{}.md", Utc::now().timestamp())
    } else {
        format!("{stem}.md")
    }
}

/// Directory name for an imported knowledgebase.
///
/// Keeps letters, digits, hyphens, and underscores; whitespace becomes a
/// hyphen; the result is lower-cased. Falls back to a timestamped name.
#[must_use]
pub fn sanitize_knowledgebase_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.trim().chars() {
        let mapped = if c.is_whitespace() { '-' } else { c };
        if !(mapped.is_alphanumeric() || mapped == '-' || mapped == '_') {
            continue;
        }
        if mapped == '-' && out.ends_with('-') {
            continue;
        }
        out.push(mapped);
    }

    let name: String = out
        .trim_matches(|c| c == '-' || c == '_')
        .chars()
        .take(MAX_KB_NAME_LENGTH)
        .collect::<String>()
        .to_lowercase();
    if name.is_empty() || name == ROOT_KNOWLEDGEBASE {
        format!("knowledgebase-{}", Utc::now().timestamp())
    } else {
        name
    }
}

/// Validate a knowledgebase name supplied by a caller.
///
/// Must start with a letter or number and contain only letters, numbers,
/// hyphens, underscores, dots, and spaces.
///
/// # Errors
///
/// Returns `KbError::InvalidInput` describing the first problem found.
pub fn validate_knowledgebase_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(KbError::InvalidInput(
            "Knowledgebase name cannot be empty".to_string(),
        ));
    }

    if name.chars().count() > MAX_KB_NAME_LENGTH {
        return Err(KbError::InvalidInput(format!(
            "Knowledgebase name too long: {} chars (max {MAX_KB_NAME_LENGTH})",
            name.chars().count()
        )));
    }

    if !name.chars().next().is_some_and(char::is_alphanumeric) {
        return Err(KbError::InvalidInput(
            "Knowledgebase name must start with a letter or number".to_string(),
        ));
    }

    for c in name.chars() {
        if !c.is_alphanumeric() && !matches!(c, '-' | '_' | '.' | ' ') {
            return Err(KbError::InvalidInput(format!(
                "Knowledgebase name contains invalid character: '{c}'"
            )));
        }
    }

    Ok(())
}

/// Validate a document path relative to the content root.
///
/// Accepts `name.md` or `kb/name.md`. Returns the knowledgebase (if any) and
/// the filename.
///
/// # Errors
///
/// Returns `KbError::InvalidInput` for empty or absolute paths, `..`
/// components, nesting deeper than one knowledgebase, or non-markdown names.
pub fn split_relative_path(path: &str) -> Result<(Option<&str>, &str)> {
    let path = path.trim();
    if path.is_empty() {
        return Err(KbError::InvalidInput("Document path cannot be empty".to_string()));
    }
    if path.starts_with('/') || path.contains('\\') || path.contains('\0') {
        return Err(KbError::InvalidInput(format!(
            "Invalid document path: {path}"
        )));
    }

    let segments: Vec<&str> = path.split('/').collect();
    if segments.iter().any(|s| *s == "..") {
        return Err(KbError::InvalidInput(
            "Invalid document path: contains '..' component".to_string(),
        ));
    }

    let (kb, filename) = match segments.as_slice() {
        [filename] => (None, *filename),
        [kb, filename] if kb.eq_ignore_ascii_case(ROOT_KNOWLEDGEBASE) => (None, *filename),
        [kb, filename] => {
            validate_knowledgebase_name(kb)?;
            (Some(*kb), *filename)
        }
        _ => {
            return Err(KbError::InvalidInput(format!(
                "Invalid document path: {path} (at most one knowledgebase level)"
            )));
        }
    };

    validate_document_filename(filename)?;
    Ok((kb, filename))
}

/// A bare document filename: non-hidden, no separators, `.md` extension.
///
/// # Errors
///
/// Returns `KbError::InvalidInput` if the name does not qualify.
pub fn validate_document_filename(filename: &str) -> Result<()> {
    if filename.is_empty()
        || filename.starts_with('.')
        || filename.contains(['/', '\\', '\0'])
        || !filename.ends_with(".md")
    {
        return Err(KbError::InvalidInput(format!(
            "Invalid document filename: '{filename}'"
        )));
    }
    Ok(())
}

fn strip_md_extension(name: &str) -> &str {
    let cut = name.len().saturating_sub(3);
    match name.get(cut..) {
        Some(ext) if ext.eq_ignore_ascii_case(".md") => &name[..cut],
        _ => name,
    }
}

fn clean_stem(stem: &str) -> String {
    let mut out = String::with_capacity(stem.len());
    let mut in_whitespace = false;

    for c in stem.chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                out.push('-');
                in_whitespace = true;
            }
            continue;
        }
        in_whitespace = false;
        if ILLEGAL_CHARS.contains(&c) || c.is_control() {
            continue;
        }
        out.push(c);
    }

    let trimmed: String = out
        .trim_matches('.')
        .chars()
        .take(MAX_STEM_CHARS)
        .collect();
    trimmed.trim_matches('.').to_string()
}
