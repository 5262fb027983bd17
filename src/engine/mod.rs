//! The viewer engine: owns the storage handle, the body cache, and the
//! injected preference port, and recomputes all derived view state whenever
//! the corpus, sort direction, filter, query, or favorite set changes.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use thiserror::Error;

use crate::config::AppConfig;
use crate::parse::{parse_document, ParsedEntry};
use crate::search::{self, FilterKind};
use crate::storage::{DocumentBody, PreferenceStore, StorageHandle};
use crate::timeline::{self, PartitionedEntries, SortDirection, TimelineRow};

pub mod state;

pub use state::{BodyCache, MemoryPrefs, BODY_FETCH_PLACEHOLDER};

const FAVORITES_PREF_KEY: &str = "favorites";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no entry named '{0}'")]
    UnknownEntry(String),
}

/// Display counts surfaced to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Counts {
    pub total: usize,
    pub filtered: usize,
    pub favorites: usize,
}

pub struct Engine {
    config: Arc<AppConfig>,
    storage: StorageHandle,
    prefs: Box<dyn PreferenceStore>,
    cache: BodyCache,
    /// Insertion-ordered so the preference round-trips as an ordered list.
    favorites: Vec<String>,
    direction: SortDirection,
    filter: FilterKind,
    query: String,
    selected: Option<String>,
    partitioned: PartitionedEntries,
    filtered: PartitionedEntries,
    pool: Vec<ParsedEntry>,
    rows: Vec<TimelineRow>,
}

impl Engine {
    /// Wire the engine against the default sqlite-backed preference store.
    pub fn open(config: Arc<AppConfig>, storage: StorageHandle) -> Result<Self> {
        let prefs = Box::new(storage.clone());
        Self::with_prefs(config, storage, prefs)
    }

    pub fn with_prefs(
        config: Arc<AppConfig>,
        storage: StorageHandle,
        prefs: Box<dyn PreferenceStore>,
    ) -> Result<Self> {
        let favorites = prefs.read_list(FAVORITES_PREF_KEY);
        let direction = config.view.default_sort;
        let mut engine = Self {
            config,
            storage,
            prefs,
            cache: BodyCache::default(),
            favorites,
            direction,
            filter: FilterKind::All,
            query: String::new(),
            selected: None,
            partitioned: PartitionedEntries::default(),
            filtered: PartitionedEntries::default(),
            pool: Vec::new(),
            rows: Vec::new(),
        };
        engine.recompute()?;
        Ok(engine)
    }

    /// Re-parse the whole corpus and rebuild every derived view. Bodies come
    /// through the session cache, so only unseen documents hit storage.
    pub fn recompute(&mut self) -> Result<()> {
        let docs = self.storage.load_all().context("bulk corpus load")?;
        let opts = self.config.view.list_derive_options();
        let mut entries = Vec::with_capacity(docs.len());
        for doc in &docs {
            let body = self.fetch_body(&doc.name);
            entries.push(parse_document(
                &doc.name,
                &doc.title,
                &body.plain_text,
                &body.rich_text,
                doc.imported_at,
                &opts,
            ));
        }
        self.partitioned = timeline::partition_and_sort(entries, self.direction);
        self.refresh_view();
        Ok(())
    }

    fn fetch_body(&mut self, name: &str) -> DocumentBody {
        if let Some(body) = self.cache.get(name) {
            return body.clone();
        }
        if !self.cache.mark_pending(name) {
            // A fetch for this key is already underway in this pass; serve
            // the placeholder until the cache fills.
            return DocumentBody::default();
        }
        let body = match self.storage.load_body(name) {
            Ok(body) => body,
            Err(error) => {
                tracing::warn!(name, %error, "body fetch failed, caching placeholder");
                DocumentBody {
                    plain_text: BODY_FETCH_PLACEHOLDER.to_string(),
                    rich_text: String::new(),
                }
            }
        };
        self.cache.set(name, body.clone());
        body
    }

    /// Re-derive filter, pool, timeline rows, and selection from the current
    /// partitioned set. Pure over the engine's inputs.
    fn refresh_view(&mut self) {
        let favorite_set: HashSet<String> = self.favorites.iter().cloned().collect();
        self.filtered =
            search::apply_filter(&self.partitioned, &favorite_set, self.filter, &self.query);
        self.pool = search::active_pool(&self.partitioned, &self.filtered, self.filter, &self.query);
        self.rows = timeline::assemble_timeline(&self.filtered.known);

        let still_present = self
            .selected
            .as_ref()
            .is_some_and(|name| self.pool.iter().any(|entry| &entry.name == name));
        if !still_present {
            self.selected = self.pool.first().map(|entry| entry.name.clone());
        }
    }

    pub fn set_filter(&mut self, filter: FilterKind) {
        self.filter = filter;
        self.refresh_view();
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
        self.refresh_view();
    }

    pub fn set_direction(&mut self, direction: SortDirection) {
        if self.direction != direction {
            self.direction = direction;
            timeline::sort_known(&mut self.partitioned.known, direction);
            timeline::sort_undated(&mut self.partitioned.undated, direction);
        }
        self.refresh_view();
    }

    pub fn toggle_direction(&mut self) {
        self.set_direction(self.direction.toggled());
    }

    /// Flip favorite membership and persist immediately. The active pool is
    /// untouched until the next view refresh. A write failure is logged and
    /// the in-memory flip kept, so the session stays usable.
    pub fn toggle_favorite(&mut self, name: &str) -> Result<bool, EngineError> {
        if !self.contains_entry(name) {
            return Err(EngineError::UnknownEntry(name.to_string()));
        }
        let now_favorite = match self.favorites.iter().position(|fav| fav == name) {
            Some(index) => {
                self.favorites.remove(index);
                false
            }
            None => {
                self.favorites.push(name.to_string());
                true
            }
        };
        if let Err(error) = self.prefs.write_list(FAVORITES_PREF_KEY, &self.favorites) {
            tracing::warn!(name, %error, "favorite persist failed, keeping in-memory state");
        }
        Ok(now_favorite)
    }

    pub fn select(&mut self, name: &str) -> Result<(), EngineError> {
        if !self.pool.iter().any(|entry| entry.name == name) {
            return Err(EngineError::UnknownEntry(name.to_string()));
        }
        self.selected = Some(name.to_string());
        Ok(())
    }

    pub fn select_next(&mut self) {
        self.step_selection(1);
    }

    pub fn select_prev(&mut self) {
        self.step_selection(-1);
    }

    fn step_selection(&mut self, delta: isize) {
        if self.pool.is_empty() {
            self.selected = None;
            return;
        }
        let current = self
            .selected
            .as_ref()
            .and_then(|name| self.pool.iter().position(|entry| &entry.name == name))
            .unwrap_or(0);
        let last = self.pool.len() - 1;
        let next = current.saturating_add_signed(delta).min(last);
        self.selected = Some(self.pool[next].name.clone());
    }

    pub fn pick_random(&self) -> Option<&ParsedEntry> {
        search::pick_random(&self.pool)
    }

    pub fn selected(&self) -> Option<&ParsedEntry> {
        let name = self.selected.as_ref()?;
        self.pool.iter().find(|entry| &entry.name == name)
    }

    /// Re-derive one entry with the wider reading-view snippet budget.
    pub fn reading_entry(&self, name: &str) -> Option<ParsedEntry> {
        let entry = self.entry(name)?;
        let opts = self.config.view.reading_derive_options();
        Some(parse_document(
            &entry.name,
            &entry.stored_title,
            &entry.body_text,
            &entry.rich_text,
            entry.imported_at,
            &opts,
        ))
    }

    pub fn entry(&self, name: &str) -> Option<&ParsedEntry> {
        self.partitioned
            .known
            .iter()
            .chain(self.partitioned.undated.iter())
            .find(|entry| entry.name == name)
    }

    pub fn timeline_rows(&self) -> &[TimelineRow] {
        &self.rows
    }

    pub fn active_pool(&self) -> &[ParsedEntry] {
        &self.pool
    }

    pub fn partitioned(&self) -> &PartitionedEntries {
        &self.partitioned
    }

    pub fn filtered(&self) -> &PartitionedEntries {
        &self.filtered
    }

    pub fn favorites(&self) -> &[String] {
        &self.favorites
    }

    pub fn is_favorite(&self, name: &str) -> bool {
        self.favorites.iter().any(|fav| fav == name)
    }

    pub fn filter(&self) -> FilterKind {
        self.filter
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn direction(&self) -> SortDirection {
        self.direction
    }

    pub fn counts(&self) -> Counts {
        Counts {
            total: self.partitioned.total(),
            filtered: self.filtered.total(),
            favorites: self.favorites.len(),
        }
    }

    fn contains_entry(&self, name: &str) -> bool {
        self.entry(name).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigPaths, StorageOptions};
    use crate::storage;
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    fn setup() -> Result<(TempDir, StorageHandle, Arc<AppConfig>)> {
        let temp = TempDir::new()?;
        let root = temp.path();
        let paths = ConfigPaths {
            config_dir: root.join("config"),
            config_file: root.join("config/config.toml"),
            data_dir: root.join("data"),
            database_path: root.join("data/archive.db"),
            cache_dir: root.join("cache"),
            log_dir: root.join("logs"),
            state_dir: root.join("state"),
        };
        let mut options = StorageOptions::default();
        options.database_path = paths.database_path.clone();
        let storage = storage::init(&paths, &options)?;
        Ok((temp, storage, Arc::new(AppConfig::default())))
    }

    fn seed(storage: &StorageHandle) -> Result<()> {
        storage.upsert_document("2023-08-15 想你.txt", "", "今天很累", "", 10)?;
        storage.upsert_document("2023-08-20 rain.txt", "", "2023-08-20\nrain all day", "", 20)?;
        storage.upsert_document("note1.txt", "", "no date anywhere", "", 30)?;
        Ok(())
    }

    fn engine(storage: &StorageHandle, config: &Arc<AppConfig>) -> Result<Engine> {
        Engine::with_prefs(
            config.clone(),
            storage.clone(),
            Box::new(MemoryPrefs::default()),
        )
    }

    #[test]
    fn recompute_partitions_and_builds_timeline() -> Result<()> {
        let (_temp, storage, config) = setup()?;
        seed(&storage)?;
        let engine = engine(&storage, &config)?;

        assert_eq!(engine.counts().total, 3);
        assert_eq!(engine.partitioned().known.len(), 2);
        assert_eq!(engine.partitioned().undated.len(), 1);
        assert_eq!(engine.timeline_rows().len(), 2);
        assert_eq!(engine.timeline_rows()[0].gap_days_after, 5);
        Ok(())
    }

    #[test]
    fn undated_entry_never_joins_the_timeline() -> Result<()> {
        let (_temp, storage, config) = setup()?;
        seed(&storage)?;
        let engine = engine(&storage, &config)?;
        assert!(engine
            .timeline_rows()
            .iter()
            .all(|row| row.entry.name != "note1.txt"));
        assert!(engine
            .partitioned()
            .undated
            .iter()
            .any(|entry| entry.name == "note1.txt"));
        Ok(())
    }

    #[test]
    fn favorites_filter_and_counts_follow_toggles() -> Result<()> {
        let (_temp, storage, config) = setup()?;
        seed(&storage)?;
        let mut engine = engine(&storage, &config)?;

        engine.set_filter(FilterKind::Favorites);
        assert!(engine.active_pool().is_empty());

        assert!(engine.toggle_favorite("note1.txt").expect("entry exists"));
        // Pool construction only changes on the next recomputation.
        assert!(engine.active_pool().is_empty());
        engine.set_filter(FilterKind::Favorites);
        assert_eq!(engine.active_pool().len(), 1);
        assert_eq!(engine.counts().favorites, 1);

        assert!(!engine.toggle_favorite("note1.txt").expect("entry exists"));
        engine.set_filter(FilterKind::Favorites);
        assert!(engine.active_pool().is_empty());
        Ok(())
    }

    #[test]
    fn favorites_persist_through_the_preference_port() -> Result<()> {
        let (_temp, storage, config) = setup()?;
        seed(&storage)?;
        let mut engine = Engine::open(config.clone(), storage.clone())?;
        engine.toggle_favorite("note1.txt").expect("entry exists");
        drop(engine);

        let engine = Engine::open(config, storage)?;
        assert_eq!(engine.favorites(), ["note1.txt"]);
        Ok(())
    }

    #[test]
    fn unknown_names_are_rejected() -> Result<()> {
        let (_temp, storage, config) = setup()?;
        seed(&storage)?;
        let mut engine = engine(&storage, &config)?;
        assert_matches!(
            engine.toggle_favorite("ghost.txt"),
            Err(EngineError::UnknownEntry(_))
        );
        assert_matches!(engine.select("ghost.txt"), Err(EngineError::UnknownEntry(_)));
        Ok(())
    }

    #[test]
    fn selection_survives_refilter_when_possible() -> Result<()> {
        let (_temp, storage, config) = setup()?;
        seed(&storage)?;
        let mut engine = engine(&storage, &config)?;

        engine.select("note1.txt").expect("in pool");
        engine.set_query("no date");
        assert_eq!(engine.selected().map(|e| e.name.as_str()), Some("note1.txt"));

        engine.set_query("rain");
        assert_eq!(
            engine.selected().map(|e| e.name.as_str()),
            Some("2023-08-20 rain.txt")
        );
        Ok(())
    }

    #[test]
    fn sequential_navigation_clamps_at_pool_edges() -> Result<()> {
        let (_temp, storage, config) = setup()?;
        seed(&storage)?;
        let mut engine = engine(&storage, &config)?;

        let first = engine.selected().expect("pool non-empty").name.clone();
        engine.select_prev();
        assert_eq!(engine.selected().expect("still selected").name, first);

        for _ in 0..10 {
            engine.select_next();
        }
        let last = engine.active_pool().last().expect("pool non-empty").name.clone();
        assert_eq!(engine.selected().expect("still selected").name, last);
        Ok(())
    }

    #[test]
    fn direction_toggle_reverses_known_order() -> Result<()> {
        let (_temp, storage, config) = setup()?;
        seed(&storage)?;
        let mut engine = engine(&storage, &config)?;

        let ascending: Vec<_> = engine
            .partitioned()
            .known
            .iter()
            .map(|e| e.name.clone())
            .collect();
        engine.toggle_direction();
        let descending: Vec<_> = engine
            .partitioned()
            .known
            .iter()
            .map(|e| e.name.clone())
            .collect();
        let mut reversed = ascending.clone();
        reversed.reverse();
        assert_eq!(descending, reversed);

        engine.toggle_direction();
        let restored: Vec<_> = engine
            .partitioned()
            .known
            .iter()
            .map(|e| e.name.clone())
            .collect();
        assert_eq!(restored, ascending);
        Ok(())
    }

    #[test]
    fn reading_entry_uses_the_wider_snippet_budget() -> Result<()> {
        let (_temp, storage, config) = setup()?;
        let line = "a".repeat(50);
        storage.upsert_document("long.txt", "", &line, "", 1)?;
        let engine = engine(&storage, &config)?;

        let list = engine.entry("long.txt").expect("present");
        assert!(list.snippet.ends_with('…'));
        let reading = engine.reading_entry("long.txt").expect("present");
        assert_eq!(reading.snippet, line);
        Ok(())
    }

    #[test]
    fn reading_entry_keeps_the_stored_title() -> Result<()> {
        let (_temp, storage, config) = setup()?;
        storage.upsert_document("a.txt", "My Day", "body text", "", 1)?;
        let engine = engine(&storage, &config)?;

        assert_eq!(engine.entry("a.txt").expect("present").title, "My Day");
        let reading = engine.reading_entry("a.txt").expect("present");
        assert_eq!(reading.title, "My Day");
        Ok(())
    }

    #[test]
    fn second_recompute_serves_bodies_from_cache() -> Result<()> {
        let (_temp, storage, config) = setup()?;
        seed(&storage)?;
        let mut engine = engine(&storage, &config)?;
        let first_total = engine.counts().total;
        engine.recompute()?;
        assert_eq!(engine.counts().total, first_total);
        assert_eq!(engine.cache.len(), first_total);
        Ok(())
    }
}
