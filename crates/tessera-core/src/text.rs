//! Pure text utilities: label normalization and marker-based quote extraction.

use regex::{Regex, RegexBuilder};
use std::sync::OnceLock;

use crate::defaults;

static WHITESPACE_RE: OnceLock<Regex> = OnceLock::new();
static NON_LABEL_RE: OnceLock<Regex> = OnceLock::new();

fn whitespace_re() -> &'static Regex {
    WHITESPACE_RE.get_or_init(|| Regex::new(r"\s+").expect("static regex is valid"))
}

fn non_label_re() -> &'static Regex {
    NON_LABEL_RE.get_or_init(|| Regex::new(r"[^\w\s-]").expect("static regex is valid"))
}

/// Replace consecutive whitespace (spaces, tabs, newlines) with a single space
/// and trim leading/trailing whitespace.
pub fn normalize_whitespace(s: &str) -> String {
    if s.is_empty() {
        return String::new();
    }
    whitespace_re().replace_all(s, " ").trim().to_string()
}

/// Map a free-form label to the canonical form stored in the graph.
///
/// Lowercases, trims, strips characters that are neither word characters,
/// whitespace, nor hyphen, and collapses whitespace runs. Hyphens survive so
/// compound proper names ("Spanish-American") keep their shape.
///
/// Leading articles ("the", "a") are NOT stripped: the graph's lookup is
/// exact-match, so "The Pequod" and "Pequod" must normalize to distinct keys
/// or previously stored entities become unfindable.
///
/// Idempotent: `normalize_label(normalize_label(s)) == normalize_label(s)`.
pub fn normalize_label(label: &str) -> String {
    let lowered = label.to_lowercase();
    let stripped = non_label_re().replace_all(lowered.trim(), "");
    whitespace_re().replace_all(&stripped, " ").trim().to_string()
}

/// Build a marker pattern that tolerates whitespace differences: each token is
/// regex-escaped and tokens are joined by `\s+`. Returns `None` for markers
/// that contain no tokens at all.
fn flexible_marker_pattern(marker: &str) -> Option<String> {
    let tokens: Vec<String> = marker.split_whitespace().map(regex::escape).collect();
    if tokens.is_empty() {
        return None;
    }
    Some(tokens.join(r"\s+"))
}

fn compile_marker(marker: &str) -> Option<Regex> {
    let pattern = flexible_marker_pattern(marker)?;
    RegexBuilder::new(&pattern).case_insensitive(true).build().ok()
}

/// Locate the substring of `text` bracketed by two short phrase markers.
///
/// The span runs inclusively from the start of the first `quote_start` match
/// through the end of the first `quote_end` match at or after that offset.
/// Matching is case-insensitive and whitespace-flexible. Returns `None` when
/// either marker is empty or absent, the source is empty, or the span exceeds
/// [`defaults::QUOTE_MAX_CHARS`] characters (a long span almost always means
/// the end marker matched far past the intended sentence).
///
/// The returned string has internal whitespace collapsed to single spaces.
pub fn extract_quote(text: &str, quote_start: &str, quote_end: &str) -> Option<String> {
    if text.is_empty() || quote_start.is_empty() || quote_end.is_empty() {
        return None;
    }

    let start_re = compile_marker(quote_start)?;
    let end_re = compile_marker(quote_end)?;

    let start_match = start_re.find(text)?;
    let tail = &text[start_match.start()..];
    let end_match = end_re.find(tail)?;

    let span = &tail[..end_match.end()];
    if span.chars().count() > defaults::QUOTE_MAX_CHARS {
        return None;
    }

    Some(normalize_whitespace(span))
}
