//! Calendar-aware date recovery from free-form text fragments.
//!
//! Patterns are applied in a fixed priority order and every structural hit is
//! validated by constructing a real `time::Date`, so impossible triplets such
//! as `2024-02-30` silently fail over to the next candidate.

use std::ops::Range;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use time::Date;

const YEAR_MIN: i32 = 1900;
const YEAR_MAX: i32 = 2099;

/// Characters that may surround or separate date components.
const DATE_SEPARATORS: &[char] = &['-', '_', '.', '/', ' ', '年', '月', '日'];

struct DatePatterns {
    /// `2023年8月15日`, `2023-08-15`, `2023.8.15`, `2023_08_15`, `2023/8/15`
    labeled_ymd: Regex,
    /// `20230815`
    compact_ymd: Regex,
    /// `8/15/2023`, `8.15.2023`, `8-15-2023`
    slash_mdy: Regex,
}

static PATTERNS: Lazy<DatePatterns> = Lazy::new(|| DatePatterns {
    labeled_ymd: Regex::new(
        r"((?:19|20)\d{2})\s*[年\-_./ ]\s*(\d{1,2})\s*[月\-_./ ]\s*(\d{1,2})日?",
    )
    .expect("valid labeled y-m-d regex"),
    compact_ymd: Regex::new(r"((?:19|20)\d{2})(\d{2})(\d{2})").expect("valid compact y-m-d regex"),
    slash_mdy: Regex::new(r"(\d{1,2})[/.\-](\d{1,2})[/.\-]((?:19|20)\d{2})")
        .expect("valid m/d/y regex"),
});

/// Validate a structural (year, month, day) triplet by constructing the real
/// calendar date. Returns `None` for anything outside 1900-2099 or for days
/// that do not exist in the given month.
pub fn calendar_date(year: i32, month: u32, day: u32) -> Option<Date> {
    if !(YEAR_MIN..=YEAR_MAX).contains(&year) {
        return None;
    }
    let month = time::Month::try_from(u8::try_from(month).ok()?).ok()?;
    Date::from_calendar_date(year, month, u8::try_from(day).ok()?).ok()
}

/// Apply the ordered pattern chain to one fragment. The first pattern whose
/// structural match survives calendar validation wins.
pub fn match_date(fragment: &str) -> Option<Date> {
    find_date(fragment).map(|(date, _)| date)
}

/// Canonical `YYYY-MM-DD` identity for a recovered date.
pub fn day_key(date: Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

/// True when a line is essentially just a date: the matcher succeeds and
/// removing digits, separators, and unit labels leaves at most two characters.
pub fn is_date_only(line: &str) -> bool {
    if match_date(line).is_none() {
        return false;
    }
    let residue = line
        .chars()
        .filter(|ch| {
            !ch.is_ascii_digit() && !ch.is_whitespace() && !DATE_SEPARATORS.contains(ch)
        })
        .count();
    residue <= 2
}

/// Remove the first embedded date (plus the separators hugging it) from a
/// fragment and collapse the remaining whitespace. Used for filename-derived
/// title fallbacks.
pub fn strip_embedded_date(text: &str) -> String {
    let Some((_, span)) = find_date(text) else {
        return collapse_whitespace(text);
    };
    let mut start = span.start;
    let mut end = span.end;
    while let Some(ch) = text[..start].chars().next_back() {
        if DATE_SEPARATORS.contains(&ch) || ch.is_whitespace() {
            start -= ch.len_utf8();
        } else {
            break;
        }
    }
    let mut tail = text[end..].chars();
    while let Some(ch) = tail.next() {
        if DATE_SEPARATORS.contains(&ch) || ch.is_whitespace() {
            end += ch.len_utf8();
        } else {
            break;
        }
    }
    collapse_whitespace(&format!("{} {}", &text[..start], &text[end..]))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn find_date(fragment: &str) -> Option<(Date, Range<usize>)> {
    let patterns = &*PATTERNS;
    scan(fragment, &patterns.labeled_ymd, extract_ymd)
        .or_else(|| scan(fragment, &patterns.compact_ymd, extract_ymd))
        .or_else(|| scan(fragment, &patterns.slash_mdy, extract_mdy))
}

/// Walk every structural match of one pattern, skipping hits that butt up
/// against another digit, and return the first that validates.
fn scan(
    fragment: &str,
    pattern: &Regex,
    extract: fn(&Captures) -> Option<(i32, u32, u32)>,
) -> Option<(Date, Range<usize>)> {
    for caps in pattern.captures_iter(fragment) {
        let whole = caps.get(0).expect("capture 0 always present");
        if digit_adjacent(fragment, whole.range()) {
            continue;
        }
        let Some((year, month, day)) = extract(&caps) else {
            continue;
        };
        if let Some(date) = calendar_date(year, month, day) {
            return Some((date, whole.range()));
        }
    }
    None
}

fn digit_adjacent(fragment: &str, span: Range<usize>) -> bool {
    let before = fragment[..span.start]
        .chars()
        .next_back()
        .is_some_and(|ch| ch.is_ascii_digit());
    let after = fragment[span.end..]
        .chars()
        .next()
        .is_some_and(|ch| ch.is_ascii_digit());
    before || after
}

fn extract_ymd(caps: &Captures) -> Option<(i32, u32, u32)> {
    Some((
        caps.get(1)?.as_str().parse().ok()?,
        caps.get(2)?.as_str().parse().ok()?,
        caps.get(3)?.as_str().parse().ok()?,
    ))
}

fn extract_mdy(caps: &Captures) -> Option<(i32, u32, u32)> {
    Some((
        caps.get(3)?.as_str().parse().ok()?,
        caps.get(1)?.as_str().parse().ok()?,
        caps.get(2)?.as_str().parse().ok()?,
    ))
}
