//! Per-document parsing: date candidate extraction, title and snippet
//! derivation, and `ParsedEntry` construction.

use std::path::Path;

use indexmap::IndexSet;
use time::{Date, OffsetDateTime};
use unicode_segmentation::UnicodeSegmentation;

use crate::normalize;

pub mod dates;

pub const UNTITLED_PLACEHOLDER: &str = "untitled";
pub const EMPTY_SNIPPET_PLACEHOLDER: &str = "(no content)";
const ELLIPSIS: &str = "…";

/// Derivation knobs, sourced from config so list and reading views share one
/// code path.
#[derive(Debug, Clone, Copy)]
pub struct DeriveOptions {
    pub title_max_chars: usize,
    pub snippet_budget: usize,
}

impl Default for DeriveOptions {
    fn default() -> Self {
        Self {
            title_max_chars: 42,
            snippet_budget: 38,
        }
    }
}

/// One document after the parse pipeline has run. Recomputed whenever the raw
/// corpus changes; never persisted. `name` is the stable identity key.
#[derive(Debug, Clone)]
pub struct ParsedEntry {
    pub name: String,
    pub title: String,
    /// Raw `title` field as stored, kept so re-derivation under a different
    /// budget starts from the same inputs.
    pub stored_title: String,
    pub body_text: String,
    pub rich_text: String,
    pub snippet: String,
    pub parsed_date: Option<Date>,
    pub day_key: Option<String>,
    pub imported_at: i64,
}

impl ParsedEntry {
    pub fn is_dated(&self) -> bool {
        self.parsed_date.is_some()
    }

    /// ISO day key, present iff a date was recovered.
    pub fn day_key(&self) -> Option<&str> {
        self.day_key.as_deref()
    }
}

/// Run the full per-document pipeline: normalize, extract candidates, match a
/// date, derive title and snippet. Total: no input can make this fail.
pub fn parse_document(
    name: &str,
    stored_title: &str,
    plain_text: &str,
    rich_text: &str,
    imported_at: i64,
    opts: &DeriveOptions,
) -> ParsedEntry {
    let normalized = normalize::normalize_document(plain_text, rich_text);
    let lines = normalize::meaningful_lines(&normalized);

    let parsed_date = date_candidates(name, stored_title, &lines)
        .iter()
        .find_map(|fragment| dates::match_date(fragment));
    let day_key = parsed_date.map(dates::day_key);

    let base = title_base(name, stored_title);
    let (title, title_line) = derive_title(&base, &lines, opts.title_max_chars);
    let snippet = derive_snippet(&lines, title_line, &normalized, opts.snippet_budget);

    ParsedEntry {
        name: name.to_string(),
        title,
        stored_title: stored_title.to_string(),
        body_text: normalized,
        rich_text: rich_text.to_string(),
        snippet,
        parsed_date,
        day_key,
        imported_at: effective_imported_at(name, imported_at),
    }
}

/// Ordered, de-duplicated fragments worth testing for an embedded date:
/// filename stem, stored title, first two meaningful lines, last two.
pub fn date_candidates(name: &str, stored_title: &str, lines: &[String]) -> Vec<String> {
    let mut candidates: IndexSet<String> = IndexSet::new();
    let mut push = |fragment: &str| {
        let trimmed = fragment.trim();
        if !trimmed.is_empty() {
            candidates.insert(trimmed.to_string());
        }
    };

    push(&file_stem(name));
    push(stored_title);
    for line in lines.iter().take(2) {
        push(line);
    }
    for line in lines.iter().skip(lines.len().saturating_sub(2)) {
        push(line);
    }

    candidates.into_iter().collect()
}

/// Display title and, when it came from the body, the index of the line it
/// was lifted from (so the snippet can exclude it).
fn derive_title(base: &str, lines: &[String], title_max_chars: usize) -> (String, Option<usize>) {
    let stripped = dates::strip_embedded_date(base);
    if !stripped.is_empty() {
        return (stripped, None);
    }
    let picked = lines.iter().position(|line| {
        !dates::is_date_only(line) && line.chars().count() <= title_max_chars
    });
    match picked {
        Some(index) => (lines[index].clone(), Some(index)),
        None => (UNTITLED_PLACEHOLDER.to_string(), None),
    }
}

/// Bounded preview: all meaningful lines except the chosen title line and any
/// date-shaped lines, joined with spaces, falling back to the full normalized
/// text and finally to a placeholder.
fn derive_snippet(
    lines: &[String],
    title_line: Option<usize>,
    normalized: &str,
    budget: usize,
) -> String {
    let joined = lines
        .iter()
        .enumerate()
        .filter(|(index, line)| Some(*index) != title_line && !dates::is_date_only(line))
        .map(|(_, line)| line.as_str())
        .collect::<Vec<_>>()
        .join(" ");

    let source = if joined.trim().is_empty() {
        normalized
    } else {
        &joined
    };
    let collapsed = source.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return EMPTY_SNIPPET_PLACEHOLDER.to_string();
    }
    truncate_graphemes(&collapsed, budget)
}

fn truncate_graphemes(text: &str, budget: usize) -> String {
    let mut graphemes = text.graphemes(true);
    let mut out: String = graphemes.by_ref().take(budget).collect();
    if graphemes.next().is_some() {
        out.push_str(ELLIPSIS);
    }
    out
}

fn title_base(name: &str, stored_title: &str) -> String {
    let trimmed = stored_title.trim();
    if trimmed.is_empty() {
        file_stem(name)
    } else {
        trimmed.to_string()
    }
}

fn file_stem(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string())
}

/// Malformed import timestamps are replaced with the current time rather than
/// rejecting the document.
fn effective_imported_at(name: &str, imported_at: i64) -> i64 {
    if imported_at > 0 {
        imported_at
    } else {
        tracing::debug!(name, imported_at, "malformed import timestamp, using now");
        (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(name: &str, body: &str) -> ParsedEntry {
        parse_document(name, "", body, "", 1_700_000_000_000, &DeriveOptions::default())
    }

    #[test]
    fn dated_filename_yields_date_title_and_snippet() {
        let entry = parse("2023-08-15 想你.txt", "今天很累");
        assert_eq!(entry.day_key.as_deref(), Some("2023-08-15"));
        assert_eq!(entry.title, "想你");
        assert_eq!(entry.snippet, "今天很累");
        assert!(entry.is_dated());
    }

    #[test]
    fn undated_document_stays_undated() {
        let entry = parse("note1.txt", "groceries\nmilk and eggs");
        assert!(entry.parsed_date.is_none());
        assert!(entry.day_key.is_none());
        assert_eq!(entry.title, "note1");
    }

    #[test]
    fn date_only_filename_falls_back_to_body_line() {
        let entry = parse("2024-01-02.txt", "a quiet morning\nmore text afterwards");
        assert_eq!(entry.title, "a quiet morning");
        assert_eq!(entry.snippet, "more text afterwards");
    }

    #[test]
    fn date_in_body_is_recovered_when_filename_has_none() {
        let entry = parse("untagged.txt", "2021年3月9日\nwrote a little");
        assert_eq!(entry.day_key.as_deref(), Some("2021-03-09"));
        // The date-shaped first line is excluded from the snippet.
        assert_eq!(entry.snippet, "wrote a little");
    }

    #[test]
    fn trailing_lines_are_date_candidates() {
        let entry = parse("untagged.txt", "thoughts\nmore thoughts\nfiller\n8/15/2023");
        assert_eq!(entry.day_key.as_deref(), Some("2023-08-15"));
    }

    #[test]
    fn empty_document_uses_placeholders() {
        let entry = parse("2024-01-02.txt", "");
        assert_eq!(entry.title, UNTITLED_PLACEHOLDER);
        assert_eq!(entry.snippet, EMPTY_SNIPPET_PLACEHOLDER);
    }

    #[test]
    fn long_bodies_are_truncated_with_ellipsis() {
        let body = "word ".repeat(40);
        let entry = parse("musings.txt", &body);
        assert!(entry.snippet.ends_with(ELLIPSIS));
        let budget = DeriveOptions::default().snippet_budget;
        assert_eq!(
            entry.snippet.graphemes(true).count(),
            budget + ELLIPSIS.graphemes(true).count()
        );
    }

    #[test]
    fn long_first_line_is_skipped_for_title() {
        let long = "x".repeat(60);
        let entry = parse("2024-01-02.txt", &format!("{long}\nshort title\nrest"));
        assert_eq!(entry.title, "short title");
    }

    #[test]
    fn derivation_is_deterministic() {
        let a = parse("2023-08-15 想你.txt", "今天很累");
        let b = parse("2023-08-15 想你.txt", "今天很累");
        assert_eq!(a.title, b.title);
        assert_eq!(a.snippet, b.snippet);
        assert_eq!(a.day_key, b.day_key);
    }

    #[test]
    fn malformed_import_timestamp_is_replaced() {
        let entry = parse_document("x.txt", "", "body", "", 0, &DeriveOptions::default());
        assert!(entry.imported_at > 0);
    }

    #[test]
    fn candidates_are_deduplicated_in_order() {
        let lines: Vec<String> = vec!["alpha".into(), "beta".into(), "gamma".into(), "alpha".into()];
        let candidates = date_candidates("alpha.txt", "alpha", &lines);
        assert_eq!(candidates, vec!["alpha", "beta", "gamma"]);
    }
}
