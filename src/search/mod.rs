//! Category filtering, substring search, and the active reading pool.

use std::collections::HashSet;

use rand::Rng;
use strum::{Display, EnumString};

use crate::parse::ParsedEntry;
use crate::timeline::PartitionedEntries;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum FilterKind {
    #[default]
    All,
    Favorites,
    Undated,
}

/// Apply the category filter and free-text query to both partitions.
/// Favorites intersects against the favorite-name set; `undated` empties the
/// known subset entirely. A whitespace-only query is deliberately treated as
/// no query at all, so stray spaces in the input never match every entry.
pub fn apply_filter(
    partitioned: &PartitionedEntries,
    favorites: &HashSet<String>,
    filter: FilterKind,
    query: &str,
) -> PartitionedEntries {
    let keep = |entry: &ParsedEntry| match filter {
        FilterKind::All => true,
        FilterKind::Favorites => favorites.contains(&entry.name),
        FilterKind::Undated => true,
    };

    let needle = query.trim().to_lowercase();
    let matches = |entry: &ParsedEntry| needle.is_empty() || entry_matches(entry, &needle);

    let known = if filter == FilterKind::Undated {
        Vec::new()
    } else {
        partitioned
            .known
            .iter()
            .filter(|entry| keep(entry) && matches(entry))
            .cloned()
            .collect()
    };
    let undated = partitioned
        .undated
        .iter()
        .filter(|entry| keep(entry) && matches(entry))
        .cloned()
        .collect();

    PartitionedEntries { known, undated }
}

/// The entry set eligible for sequential and random navigation. Falls back to
/// the full unfiltered set only when nothing is actually narrowing the view,
/// so an empty favorites filter stays empty. Mirrors [`apply_filter`] in
/// treating a whitespace-only query as empty.
pub fn active_pool(
    partitioned: &PartitionedEntries,
    filtered: &PartitionedEntries,
    filter: FilterKind,
    query: &str,
) -> Vec<ParsedEntry> {
    let mut pool: Vec<ParsedEntry> = filtered
        .known
        .iter()
        .chain(filtered.undated.iter())
        .cloned()
        .collect();
    if pool.is_empty() && filter == FilterKind::All && query.trim().is_empty() {
        pool = partitioned
            .known
            .iter()
            .chain(partitioned.undated.iter())
            .cloned()
            .collect();
    }
    pool
}

/// Uniform pick over the current pool with an unseeded generator.
pub fn pick_random(pool: &[ParsedEntry]) -> Option<&ParsedEntry> {
    if pool.is_empty() {
        return None;
    }
    let index = rand::thread_rng().gen_range(0..pool.len());
    pool.get(index)
}

/// Lower-cased substring match over the concatenation of the derived fields
/// plus, for dated entries, the ISO date string.
fn entry_matches(entry: &ParsedEntry, needle: &str) -> bool {
    let haystack = format!(
        "{}\n{}\n{}\n{}\n{}",
        entry.title,
        entry.snippet,
        entry.body_text,
        entry.name,
        entry.day_key().unwrap_or("")
    )
    .to_lowercase();
    haystack.contains(needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::{parse_document, DeriveOptions};
    use crate::timeline::{partition_and_sort, SortDirection};

    fn entry(name: &str, body: &str) -> ParsedEntry {
        parse_document(name, "", body, "", 1_000, &DeriveOptions::default())
    }

    fn corpus() -> PartitionedEntries {
        partition_and_sort(
            vec![
                entry("2024-01-01 walk.txt", "2024-01-01\nlong walk by the river"),
                entry("2024-02-10 rain.txt", "2024-02-10\nrain all afternoon"),
                entry("loose.txt", "no date in here"),
            ],
            SortDirection::Ascending,
        )
    }

    #[test]
    fn all_filter_with_empty_query_keeps_everything() {
        let partitioned = corpus();
        let filtered = apply_filter(&partitioned, &HashSet::new(), FilterKind::All, "");
        assert_eq!(filtered.total(), 3);
    }

    #[test]
    fn favorites_filter_with_no_favorites_yields_empty_pool() {
        let partitioned = corpus();
        let filtered = apply_filter(&partitioned, &HashSet::new(), FilterKind::Favorites, "");
        assert_eq!(filtered.total(), 0);
        let pool = active_pool(&partitioned, &filtered, FilterKind::Favorites, "");
        assert!(pool.is_empty());
    }

    #[test]
    fn favorites_filter_intersects_both_partitions() {
        let partitioned = corpus();
        let favorites: HashSet<String> =
            ["loose.txt".to_string(), "2024-02-10 rain.txt".to_string()].into();
        let filtered = apply_filter(&partitioned, &favorites, FilterKind::Favorites, "");
        assert_eq!(filtered.known.len(), 1);
        assert_eq!(filtered.undated.len(), 1);
    }

    #[test]
    fn undated_filter_forces_known_subset_empty() {
        let partitioned = corpus();
        let filtered = apply_filter(&partitioned, &HashSet::new(), FilterKind::Undated, "");
        assert!(filtered.known.is_empty());
        assert_eq!(filtered.undated.len(), 1);
    }

    #[test]
    fn query_matches_body_and_iso_date() {
        let partitioned = corpus();
        let by_body = apply_filter(&partitioned, &HashSet::new(), FilterKind::All, "RIVER");
        assert_eq!(by_body.total(), 1);
        assert_eq!(by_body.known[0].name, "2024-01-01 walk.txt");

        let by_date = apply_filter(&partitioned, &HashSet::new(), FilterKind::All, "2024-02");
        assert_eq!(by_date.total(), 1);
        assert_eq!(by_date.known[0].name, "2024-02-10 rain.txt");
    }

    #[test]
    fn whitespace_only_query_is_treated_as_empty() {
        let partitioned = corpus();
        let filtered = apply_filter(&partitioned, &HashSet::new(), FilterKind::All, "   ");
        assert_eq!(filtered.total(), 3);
        let pool = active_pool(
            &partitioned,
            &PartitionedEntries::default(),
            FilterKind::All,
            "   ",
        );
        assert_eq!(pool.len(), 3);
    }

    #[test]
    fn non_matching_query_does_not_fall_back() {
        let partitioned = corpus();
        let filtered = apply_filter(&partitioned, &HashSet::new(), FilterKind::All, "zzz");
        let pool = active_pool(&partitioned, &filtered, FilterKind::All, "zzz");
        assert!(pool.is_empty());
    }

    #[test]
    fn empty_view_falls_back_only_under_all_with_empty_query() {
        let partitioned = corpus();
        let empty = PartitionedEntries::default();
        let pool = active_pool(&partitioned, &empty, FilterKind::All, "");
        assert_eq!(pool.len(), 3);
        let no_pool = active_pool(&partitioned, &empty, FilterKind::Favorites, "");
        assert!(no_pool.is_empty());
    }

    #[test]
    fn random_pick_comes_from_the_pool() {
        let partitioned = corpus();
        let filtered = apply_filter(&partitioned, &HashSet::new(), FilterKind::All, "");
        let pool = active_pool(&partitioned, &filtered, FilterKind::All, "");
        for _ in 0..20 {
            let picked = pick_random(&pool).expect("non-empty pool");
            assert!(pool.iter().any(|entry| entry.name == picked.name));
        }
        assert!(pick_random(&[]).is_none());
    }
}
