//! Memory Store Module
//!
//! Volatile tier: decoded objects keyed by [`CacheKey`], bounded by a byte
//! budget and trimmed through an [`EvictionPolicy`].

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::cache::{CacheKey, EvictionPolicy, LruTracker, MemoryEntry};

// == Memory Store ==
/// Size-bounded associative store. A budget of 0 means unbounded.
///
/// Not synchronized; the coordinator wraps it in a mutex.
#[derive(Debug)]
pub struct MemoryStore<V> {
    /// Decoded objects
    entries: HashMap<CacheKey, MemoryEntry<V>>,
    /// Recency tracking for size-tracked entries
    policy: Box<dyn EvictionPolicy>,
    /// Byte budget, 0 = unbounded
    budget: u64,
    /// Sum of size hints of tracked entries
    tracked_bytes: u64,
}

impl<V> MemoryStore<V> {
    // == Constructor ==
    /// Creates a store with the default LRU policy.
    pub fn new(budget: u64) -> Self {
        Self::with_policy(budget, Box::new(LruTracker::new()))
    }

    pub fn with_policy(budget: u64, policy: Box<dyn EvictionPolicy>) -> Self {
        Self {
            entries: HashMap::new(),
            policy,
            budget,
            tracked_bytes: 0,
        }
    }

    // == Set ==
    /// Stores an object, replacing any previous entry for `key`.
    ///
    /// The size hint only counts when a budget is configured; otherwise the
    /// entry is untracked. Returns the number of entries evicted to get back
    /// under budget.
    ///
    /// An entry larger than the whole budget is not kept: it would force
    /// out every other tracked entry and then itself. The previous entry
    /// for `key` is still dropped.
    pub fn set(&mut self, key: CacheKey, value: Arc<V>, size_hint: u64) -> usize {
        self.remove(&key);

        if self.budget > 0 && size_hint > self.budget {
            debug!(
                key = %key,
                size = size_hint,
                budget = self.budget,
                "Entry exceeds memory budget"
            );
            return 0;
        }

        let size = if self.budget > 0 { size_hint } else { 0 };
        let entry = MemoryEntry::new(value, size);
        if entry.is_tracked() {
            self.tracked_bytes += size;
            self.policy.touch(&key);
        }
        self.entries.insert(key, entry);

        self.evict_until(self.budget)
    }

    // == Get ==
    /// Returns the object for `key` and marks it recently used.
    pub fn get(&mut self, key: &CacheKey) -> Option<Arc<V>> {
        let entry = self.entries.get(key)?;
        if entry.is_tracked() {
            self.policy.touch(key);
        }
        Some(Arc::clone(&entry.value))
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    // == Remove ==
    /// Removes an entry. Absent keys are ignored.
    pub fn remove(&mut self, key: &CacheKey) -> Option<Arc<V>> {
        let entry = self.entries.remove(key)?;
        if entry.is_tracked() {
            self.tracked_bytes -= entry.size;
            self.policy.remove(key);
        }
        Some(entry.value)
    }

    // == Clear ==
    /// Drops every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.policy.clear();
        self.tracked_bytes = 0;
    }

    // == Resize ==
    /// Sets a new budget and evicts immediately if usage exceeds it.
    pub fn resize(&mut self, budget: u64) -> usize {
        self.resize_range(budget, budget)
    }

    /// Sets the budget to `max`. If usage exceeds `max`, evicts down to
    /// `min` (clamped to `max`) so the next inserts have headroom.
    pub fn resize_range(&mut self, min: u64, max: u64) -> usize {
        self.budget = max;
        if max == 0 || self.tracked_bytes <= max {
            return 0;
        }
        self.evict_until(min.min(max))
    }

    /// Evicts least valuable tracked entries until usage is at most `target`.
    fn evict_until(&mut self, target: u64) -> usize {
        if self.budget == 0 {
            return 0;
        }

        let mut evicted = 0;
        while self.tracked_bytes > target {
            let Some(victim) = self.policy.evict() else {
                break;
            };
            if let Some(entry) = self.entries.remove(&victim) {
                self.tracked_bytes -= entry.size;
                evicted += 1;
                debug!(key = %victim, size = entry.size, "Evicted memory entry");
            }
        }
        evicted
    }

    // == Accessors ==
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn budget(&self) -> u64 {
        self.budget
    }

    pub fn tracked_bytes(&self) -> u64 {
        self.tracked_bytes
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn k(s: &str) -> CacheKey {
        CacheKey::new(s)
    }

    fn v(s: &str) -> Arc<String> {
        Arc::new(s.to_string())
    }

    #[test]
    fn test_store_new() {
        let store: MemoryStore<String> = MemoryStore::new(0);
        assert!(store.is_empty());
        assert_eq!(store.budget(), 0);
    }

    #[test]
    fn test_store_set_and_get() {
        let mut store = MemoryStore::new(0);
        store.set(k("key1"), v("value1"), 0);

        assert_eq!(store.get(&k("key1")).as_deref(), Some(&"value1".to_string()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_overwrite_adjusts_usage() {
        let mut store = MemoryStore::new(100);
        store.set(k("key1"), v("a"), 40);
        store.set(k("key1"), v("b"), 10);

        assert_eq!(store.len(), 1);
        assert_eq!(store.tracked_bytes(), 10);
        assert_eq!(store.get(&k("key1")).as_deref(), Some(&"b".to_string()));
    }

    #[test]
    fn test_unbounded_store_ignores_hints() {
        let mut store = MemoryStore::new(0);
        store.set(k("key1"), v("a"), 1_000_000);
        assert_eq!(store.tracked_bytes(), 0);
    }

    #[test]
    fn test_budget_evicts_least_recently_used() {
        let mut store = MemoryStore::new(30);
        store.set(k("key1"), v("1"), 10);
        store.set(k("key2"), v("2"), 10);
        store.set(k("key3"), v("3"), 10);

        // key1 becomes most recent, so key2 goes first
        store.get(&k("key1"));
        let evicted = store.set(k("key4"), v("4"), 10);

        assert_eq!(evicted, 1);
        assert!(!store.contains(&k("key2")));
        assert!(store.contains(&k("key1")));
        assert!(store.tracked_bytes() <= 30);
    }

    #[test]
    fn test_budget_plus_one_evicts() {
        let mut store = MemoryStore::new(10);
        store.set(k("old"), v("o"), 5);
        store.set(k("new"), v("n"), 6);

        assert!(!store.contains(&k("old")));
        assert!(store.contains(&k("new")));
        assert_eq!(store.tracked_bytes(), 6);
    }

    #[test]
    fn test_entry_larger_than_budget_is_not_kept() {
        let mut store = MemoryStore::new(100);
        store.set(k("a"), v("a"), 50);
        store.set(k("b"), v("b"), 40);

        let evicted = store.set(k("big"), v("big"), 150);

        assert_eq!(evicted, 0);
        assert!(!store.contains(&k("big")));
        assert!(store.contains(&k("a")));
        assert!(store.contains(&k("b")));
        assert_eq!(store.tracked_bytes(), 90);
    }

    #[test]
    fn test_oversized_replacement_drops_previous_value() {
        let mut store = MemoryStore::new(10);
        store.set(k("a"), v("small"), 5);
        store.set(k("a"), v("huge"), 11);

        assert!(!store.contains(&k("a")));
        assert_eq!(store.tracked_bytes(), 0);
    }

    #[test]
    fn test_untracked_entries_survive_eviction() {
        let mut store = MemoryStore::new(10);
        store.set(k("pinned"), v("p"), 0);
        store.set(k("a"), v("a"), 8);
        store.set(k("b"), v("b"), 8);

        assert!(store.contains(&k("pinned")));
        assert!(!store.contains(&k("a")));
        assert!(store.contains(&k("b")));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut store = MemoryStore::new(10);
        store.set(k("a"), v("a"), 4);

        assert!(store.remove(&k("a")).is_some());
        assert!(store.remove(&k("a")).is_none());
        assert!(store.remove(&k("never")).is_none());
        assert_eq!(store.tracked_bytes(), 0);
    }

    #[test]
    fn test_clear() {
        let mut store = MemoryStore::new(100);
        store.set(k("a"), v("a"), 4);
        store.set(k("b"), v("b"), 0);
        store.clear();

        assert!(store.is_empty());
        assert_eq!(store.tracked_bytes(), 0);
    }

    #[test]
    fn test_resize_lower_evicts_immediately() {
        let mut store = MemoryStore::new(100);
        for i in 0..5 {
            store.set(k(&format!("k{i}")), v("x"), 20);
        }
        assert_eq!(store.tracked_bytes(), 100);

        let evicted = store.resize(45);
        assert_eq!(evicted, 3);
        assert_eq!(store.tracked_bytes(), 40);
        assert!(store.contains(&k("k3")));
        assert!(store.contains(&k("k4")));
    }

    #[test]
    fn test_resize_range_trims_to_min() {
        let mut store = MemoryStore::new(100);
        for i in 0..5 {
            store.set(k(&format!("k{i}")), v("x"), 20);
        }

        let evicted = store.resize_range(20, 80);
        assert_eq!(evicted, 4);
        assert_eq!(store.budget(), 80);
        assert_eq!(store.tracked_bytes(), 20);
    }

    #[test]
    fn test_resize_to_unbounded_keeps_everything() {
        let mut store = MemoryStore::new(100);
        store.set(k("a"), v("a"), 60);
        assert_eq!(store.resize(0), 0);
        store.set(k("b"), v("b"), 60);
        assert_eq!(store.len(), 2);
    }
}
