use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use anyhow::Result;

use crate::storage::{DocumentBody, PreferenceStore};

/// Body text substituted when a per-document fetch fails; the document stays
/// browsable through its title and snippet.
pub const BODY_FETCH_PLACEHOLDER: &str = "(content unavailable)";

/// Session-scoped in-memory body cache with a pending-fetch guard. Content
/// per key is immutable, so last-write-wins on `set` is safe.
#[derive(Debug, Default)]
pub struct BodyCache {
    entries: HashMap<String, DocumentBody>,
    pending: HashSet<String>,
}

impl BodyCache {
    pub fn get(&self, name: &str) -> Option<&DocumentBody> {
        self.entries.get(name)
    }

    pub fn set(&mut self, name: &str, body: DocumentBody) {
        self.pending.remove(name);
        self.entries.insert(name.to_string(), body);
    }

    pub fn has_pending(&self, name: &str) -> bool {
        self.pending.contains(name)
    }

    /// Claim a fetch slot. Returns false when the body is already cached or a
    /// fetch is already underway, so no two fetches for one key ever start.
    pub fn mark_pending(&mut self, name: &str) -> bool {
        if self.entries.contains_key(name) || self.pending.contains(name) {
            return false;
        }
        self.pending.insert(name.to_string());
        true
    }

    /// Drop a cached body so the next recompute fetches it again.
    pub fn invalidate(&mut self, name: &str) {
        self.entries.remove(name);
        self.pending.remove(name);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Preference store that never touches disk; used by tests and by a read-only
/// mode when no database is available.
#[derive(Debug, Default)]
pub struct MemoryPrefs {
    values: RefCell<HashMap<String, Vec<String>>>,
}

impl PreferenceStore for MemoryPrefs {
    fn read_list(&self, key: &str) -> Vec<String> {
        self.values.borrow().get(key).cloned().unwrap_or_default()
    }

    fn write_list(&self, key: &str, values: &[String]) -> Result<()> {
        self.values
            .borrow_mut()
            .insert(key.to_string(), values.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_guard_blocks_duplicate_fetches() {
        let mut cache = BodyCache::default();
        assert!(cache.mark_pending("a.txt"));
        assert!(!cache.mark_pending("a.txt"));
        assert!(cache.has_pending("a.txt"));

        cache.set("a.txt", DocumentBody::default());
        assert!(!cache.has_pending("a.txt"));
        assert!(!cache.mark_pending("a.txt"));
        assert!(cache.get("a.txt").is_some());
    }

    #[test]
    fn invalidate_reopens_the_fetch_slot() {
        let mut cache = BodyCache::default();
        cache.set("a.txt", DocumentBody::default());
        cache.invalidate("a.txt");
        assert!(cache.get("a.txt").is_none());
        assert!(cache.mark_pending("a.txt"));
    }

    #[test]
    fn memory_prefs_round_trip() {
        let prefs = MemoryPrefs::default();
        assert!(prefs.read_list("favorites").is_empty());
        prefs
            .write_list("favorites", &["a".into()])
            .expect("memory write cannot fail");
        assert_eq!(prefs.read_list("favorites"), vec!["a"]);
    }
}
