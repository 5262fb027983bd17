//! Deterministic ordering of parsed entries and timeline view-state:
//! month grouping, same-day ordinals, and inter-entry day gaps.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use time::Date;

use crate::parse::ParsedEntry;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn toggled(self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }
}

/// The full parsed set split into dated and undated groups, each sorted.
#[derive(Debug, Clone, Default)]
pub struct PartitionedEntries {
    pub known: Vec<ParsedEntry>,
    pub undated: Vec<ParsedEntry>,
}

impl PartitionedEntries {
    pub fn total(&self) -> usize {
        self.known.len() + self.undated.len()
    }
}

/// One known entry annotated for rendering. Ephemeral: recomputed on every
/// render pass, never persisted.
#[derive(Debug, Clone)]
pub struct TimelineRow {
    pub entry: ParsedEntry,
    pub month_header_before: bool,
    pub same_day_ordinal: u32,
    pub gap_days_after: u32,
}

/// Partition entries by whether a date was recovered, then order each group.
/// Re-derivable from the same input regardless of prior sort state.
pub fn partition_and_sort(
    entries: Vec<ParsedEntry>,
    direction: SortDirection,
) -> PartitionedEntries {
    let (mut known, mut undated): (Vec<_>, Vec<_>) =
        entries.into_iter().partition(ParsedEntry::is_dated);
    sort_known(&mut known, direction);
    sort_undated(&mut undated, direction);
    PartitionedEntries { known, undated }
}

/// Known entries: parsed date, then import time, then name. Total order, so
/// toggling the direction twice restores the original arrangement.
pub fn sort_known(entries: &mut [ParsedEntry], direction: SortDirection) {
    entries.sort_by(|a, b| directed(compare_known(a, b), direction));
}

/// Undated entries: import time, then name.
pub fn sort_undated(entries: &mut [ParsedEntry], direction: SortDirection) {
    entries.sort_by(|a, b| directed(compare_undated(a, b), direction));
}

fn compare_known(a: &ParsedEntry, b: &ParsedEntry) -> Ordering {
    entry_date(a)
        .cmp(&entry_date(b))
        .then_with(|| a.imported_at.cmp(&b.imported_at))
        .then_with(|| compare_names(&a.name, &b.name))
}

fn compare_undated(a: &ParsedEntry, b: &ParsedEntry) -> Ordering {
    a.imported_at
        .cmp(&b.imported_at)
        .then_with(|| compare_names(&a.name, &b.name))
}

/// Case-insensitive comparison with the original spelling as the final
/// tiebreak, keeping the order total.
fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

fn directed(ordering: Ordering, direction: SortDirection) -> Ordering {
    match direction {
        SortDirection::Ascending => ordering,
        SortDirection::Descending => ordering.reverse(),
    }
}

fn entry_date(entry: &ParsedEntry) -> Date {
    entry.parsed_date.unwrap_or(Date::MIN)
}

/// `YYYY-MM` heading shown before the first entry of each month group.
pub fn month_heading(date: Date) -> String {
    format!("{:04}-{:02}", date.year(), u8::from(date.month()))
}

/// Annotate sorted known entries with month headers, same-day ordinals, and
/// whole-day gaps toward the following entry.
pub fn assemble_timeline(known: &[ParsedEntry]) -> Vec<TimelineRow> {
    let mut rows = Vec::with_capacity(known.len());
    for (index, entry) in known.iter().enumerate() {
        let date = entry_date(entry);
        let month_header_before = match index.checked_sub(1).map(|i| entry_date(&known[i])) {
            None => true,
            Some(prev) => (prev.year(), prev.month()) != (date.year(), date.month()),
        };

        let mut same_day_ordinal = 1;
        let mut back = index;
        while back > 0 && known[back - 1].day_key == entry.day_key {
            same_day_ordinal += 1;
            back -= 1;
        }

        let gap_days_after = known
            .get(index + 1)
            .map(|next| {
                (i64::from(entry_date(next).to_julian_day()) - i64::from(date.to_julian_day()))
                    .unsigned_abs() as u32
            })
            .unwrap_or(0);

        rows.push(TimelineRow {
            entry: entry.clone(),
            month_header_before,
            same_day_ordinal,
            gap_days_after,
        });
    }
    rows
}
