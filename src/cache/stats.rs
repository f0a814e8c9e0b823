//! Cache Statistics Module
//!
//! Tracks hit, fetch and eviction counters across both tiers.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Cache Stats ==
/// Point-in-time snapshot of cache counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups answered from memory
    pub memory_hits: u64,
    /// Lookups answered from disk (and promoted to memory)
    pub disk_hits: u64,
    /// Remote fetches issued
    pub fetches: u64,
    /// Requests that joined an already running fetch
    pub coalesced: u64,
    /// Fetches that failed to fetch or decode
    pub fetch_failures: u64,
    /// Memory entries evicted by the budget policy
    pub evictions: u64,
    /// Disk writes that failed
    pub disk_write_failures: u64,
    /// Entries currently held in memory
    pub memory_entries: usize,
    /// Bytes currently counted against the memory budget
    pub memory_bytes: u64,
}

impl CacheStats {
    /// Share of resolutions served without a remote fetch.
    ///
    /// Returns 0.0 if nothing has been resolved yet.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.memory_hits + self.disk_hits;
        let total = hits + self.fetches;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

// == Stats Recorder ==
/// Lock-free counters shared by the coordinator and the disk writer.
#[derive(Debug, Default)]
pub struct StatsRecorder {
    memory_hits: AtomicU64,
    disk_hits: AtomicU64,
    fetches: AtomicU64,
    coalesced: AtomicU64,
    fetch_failures: AtomicU64,
    evictions: AtomicU64,
    disk_write_failures: AtomicU64,
}

impl StatsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_memory_hit(&self) {
        self.memory_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_disk_hit(&self) {
        self.disk_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch(&self) {
        self.fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_coalesced(&self) {
        self.coalesced.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch_failure(&self) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evictions(&self, count: usize) {
        if count > 0 {
            self.evictions.fetch_add(count as u64, Ordering::Relaxed);
        }
    }

    pub fn record_disk_write_failure(&self) {
        self.disk_write_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Builds a snapshot; memory occupancy comes from the store itself.
    pub fn snapshot(&self, memory_entries: usize, memory_bytes: u64) -> CacheStats {
        CacheStats {
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            disk_hits: self.disk_hits.load(Ordering::Relaxed),
            fetches: self.fetches.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            disk_write_failures: self.disk_write_failures.load(Ordering::Relaxed),
            memory_entries,
            memory_bytes,
        }
    }
}
