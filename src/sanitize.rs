//! Filesystem-safe name mangling for page titles and image files.
//!
//! Two policies: [`sanitize_title`] keeps titles human-readable (spaces,
//! case, most punctuation survive), [`sanitize_image_name`] produces
//! lowercase `[a-z0-9.-]` names suitable for the shared image store.
//!
//! Both functions are total — they never fail and never return an empty
//! string — and idempotent, so a name that has already been sanitized
//! passes through unchanged. That matters because titles flow into
//! directory names and later back into child-page path construction.

/// Fallback used when sanitization leaves nothing behind.
const PLACEHOLDER: &str = "untitled";

/// Make a page or section title safe to use as a file or directory name
/// while preserving readability.
///
/// Path separators become dashes, control characters are stripped, runs of
/// dashes or spaces collapse to one, and leading/trailing spaces, dashes,
/// and dots are trimmed.
pub fn sanitize_title(name: &str) -> String {
    let mapped: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' { '-' } else { c })
        .filter(|c| !is_control(*c))
        .collect();

    let collapsed = collapse_runs(&mapped);
    let trimmed = collapsed.trim_matches([' ', '-', '.']);

    if trimmed.is_empty() {
        PLACEHOLDER.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Make an image name safe for the shared `images/` directory: lowercase,
/// with everything outside `[a-z0-9.-]` replaced by a dash.
pub fn sanitize_image_name(name: &str) -> String {
    let mapped: String = name
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();

    let collapsed = collapse_runs(&mapped);
    let trimmed = collapsed.trim_matches(['-', '.']);

    if trimmed.is_empty() {
        PLACEHOLDER.to_string()
    } else {
        trimmed.to_string()
    }
}

/// C0 and C1 control ranges (the DEL..=U+009F block included).
fn is_control(c: char) -> bool {
    ('\u{0000}'..='\u{001F}').contains(&c) || ('\u{007F}'..='\u{009F}').contains(&c)
}

/// Collapse runs of dashes and runs of spaces down to a single occurrence.
fn collapse_runs(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev: Option<char> = None;
    for c in s.chars() {
        if (c == '-' || c == ' ') && prev == Some(c) {
            continue;
        }
        out.push(c);
        prev = Some(c);
    }
    out
}
