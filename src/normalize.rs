use once_cell::sync::Lazy;
use regex::Regex;

static LINE_TERMINATORS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\r\n|\r|\u{2028}|\u{2029}").expect("valid line terminator regex"));
static BLANK_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("valid blank-run regex"));
static BREAK_TAGS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<br\s*/?\s*>").expect("valid break-tag regex"));
static BLOCK_CLOSERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)</(?:p|div|li|h[1-6]|ul|ol|blockquote|tr|section|article)\s*>")
        .expect("valid block-closer regex")
});
static ANY_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid tag regex"));
static NEWLINE_RUNS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n+").expect("valid newline-run regex"));

/// Fold a raw plain-text body into canonical form: NBSP becomes a regular
/// space, every line terminator becomes `\n`, runs of three or more newlines
/// collapse to a single blank line, and the whole string is trimmed.
pub fn normalize_plain(raw: &str) -> String {
    let spaced = raw.replace('\u{00A0}', " ");
    let unified = LINE_TERMINATORS.replace_all(&spaced, "\n");
    let collapsed = BLANK_RUNS.replace_all(&unified, "\n\n");
    collapsed.trim().to_string()
}

/// Reduce a rich-text body to normalized plain text. Block-level boundaries
/// and `<br>` variants become newlines before tags are stripped, so text in
/// adjacent paragraphs never runs together.
pub fn normalize_rich(raw: &str) -> String {
    let broken = BREAK_TAGS.replace_all(raw, "\n");
    let blocked = BLOCK_CLOSERS.replace_all(&broken, "\n");
    let stripped = ANY_TAG.replace_all(&blocked, "");
    normalize_plain(&decode_entities(&stripped))
}

/// Normalize whichever body representation a document carries, preferring the
/// plain-text field when it has content.
pub fn normalize_document(plain: &str, rich: &str) -> String {
    if !plain.trim().is_empty() {
        normalize_plain(plain)
    } else {
        normalize_rich(rich)
    }
}

/// Split normalized text into trimmed, non-empty lines with zero-width
/// characters removed.
pub fn meaningful_lines(normalized: &str) -> Vec<String> {
    NEWLINE_RUNS
        .split(normalized)
        .map(strip_zero_width)
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .collect()
}

fn strip_zero_width(line: &str) -> String {
    line.chars()
        .filter(|ch| !matches!(ch, '\u{200B}'..='\u{200D}' | '\u{FEFF}' | '\u{2060}'))
        .collect()
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_normalization_unifies_terminators_and_blanks() {
        let raw = "first\r\nsecond\r\r\n\n\n\nthird\u{00A0}word  ";
        let normalized = normalize_plain(raw);
        assert_eq!(normalized, "first\nsecond\n\nthird word");
    }

    #[test]
    fn normalization_is_idempotent() {
        let raw = "  a\r\nb\n\n\n\nc  ";
        let once = normalize_plain(raw);
        assert_eq!(normalize_plain(&once), once);
    }

    #[test]
    fn rich_blocks_become_line_boundaries() {
        let raw = "<div>one</div><p>two<br>three</p><span>four</span>";
        assert_eq!(normalize_rich(raw), "one\ntwo\nthree\nfour");
    }

    #[test]
    fn rich_entities_are_decoded_after_stripping() {
        assert_eq!(normalize_rich("<p>a &amp; b&nbsp;c</p>"), "a & b c");
    }

    #[test]
    fn meaningful_lines_drop_blanks_and_zero_width() {
        let lines = meaningful_lines("one\n\n\u{200B}\n  two  \n\u{FEFF}three");
        assert_eq!(lines, vec!["one", "two", "three"]);
    }

    #[test]
    fn document_prefers_plain_body() {
        assert_eq!(normalize_document("plain", "<p>rich</p>"), "plain");
        assert_eq!(normalize_document("   ", "<p>rich</p>"), "rich");
    }
}
