//! Eviction Policy Module
//!
//! Recency tracking for the memory tier. The store only asks a policy which
//! key to give up next; LRU is the default implementation.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;

use crate::cache::CacheKey;

// == Eviction Policy ==
/// Chooses eviction victims among the keys the memory tier tracks.
///
/// Only size-tracked entries are ever reported to a policy, so untracked
/// entries can never be chosen.
pub trait EvictionPolicy: Send + Debug {
    /// A key was inserted or read.
    fn touch(&mut self, key: &CacheKey);

    /// A key left the store for a reason other than eviction.
    fn remove(&mut self, key: &CacheKey);

    /// Returns and forgets the next key to evict.
    fn evict(&mut self) -> Option<CacheKey>;

    fn clear(&mut self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// == LRU Tracker ==
/// Least-recently-used ordering.
///
/// Every touch stamps the key with a fresh tick; the smallest tick is the
/// least recently used key.
#[derive(Debug, Default)]
pub struct LruTracker {
    /// Tick of the latest touch per key
    ticks: HashMap<CacheKey, u64>,
    /// Keys ordered by tick, oldest first
    order: BTreeMap<u64, CacheKey>,
    next_tick: u64,
}

impl LruTracker {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EvictionPolicy for LruTracker {
    fn touch(&mut self, key: &CacheKey) {
        let tick = self.next_tick;
        self.next_tick += 1;
        if let Some(previous) = self.ticks.insert(key.clone(), tick) {
            self.order.remove(&previous);
        }
        self.order.insert(tick, key.clone());
    }

    fn remove(&mut self, key: &CacheKey) {
        if let Some(tick) = self.ticks.remove(key) {
            self.order.remove(&tick);
        }
    }

    fn evict(&mut self) -> Option<CacheKey> {
        let (_, key) = self.order.pop_first()?;
        self.ticks.remove(&key);
        Some(key)
    }

    fn clear(&mut self) {
        self.ticks.clear();
        self.order.clear();
    }

    fn len(&self) -> usize {
        self.ticks.len()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn k(s: &str) -> CacheKey {
        CacheKey::new(s)
    }

    #[test]
    fn test_lru_new() {
        let lru = LruTracker::new();
        assert!(lru.is_empty());
        assert_eq!(lru.len(), 0);
    }

    #[test]
    fn test_lru_touch_existing_key() {
        let mut lru = LruTracker::new();

        lru.touch(&k("key1"));
        lru.touch(&k("key2"));
        lru.touch(&k("key3"));

        // key1 moves to the most recent position
        lru.touch(&k("key1"));

        assert_eq!(lru.len(), 3);
        assert_eq!(lru.evict(), Some(k("key2")));
    }

    #[test]
    fn test_lru_evict_order() {
        let mut lru = LruTracker::new();

        lru.touch(&k("a"));
        lru.touch(&k("b"));
        lru.touch(&k("c"));
        lru.touch(&k("a"));
        lru.touch(&k("c"));
        lru.touch(&k("b"));

        assert_eq!(lru.evict(), Some(k("a")));
        assert_eq!(lru.evict(), Some(k("c")));
        assert_eq!(lru.evict(), Some(k("b")));
        assert_eq!(lru.evict(), None);
    }

    #[test]
    fn test_lru_remove() {
        let mut lru = LruTracker::new();

        lru.touch(&k("key1"));
        lru.touch(&k("key2"));
        lru.remove(&k("key1"));
        lru.remove(&k("missing"));

        assert_eq!(lru.len(), 1);
        assert_eq!(lru.evict(), Some(k("key2")));
        assert_eq!(lru.evict(), None);
    }

    #[test]
    fn test_lru_touch_same_key_multiple_times() {
        let mut lru = LruTracker::new();

        lru.touch(&k("key1"));
        lru.touch(&k("key1"));
        lru.touch(&k("key1"));

        assert_eq!(lru.len(), 1);
        assert_eq!(lru.evict(), Some(k("key1")));
        assert!(lru.is_empty());
    }

    #[test]
    fn test_lru_clear() {
        let mut lru = LruTracker::new();
        lru.touch(&k("a"));
        lru.touch(&k("b"));
        lru.clear();
        assert!(lru.is_empty());
        assert_eq!(lru.evict(), None);
    }
}
