//! Cache Facade Module
//!
//! Public surface of one cache instance: local-only accessors, the
//! asynchronous resolver, direct mutation, and budget management.

use std::path::Path;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::cache::key::resolve_key;
use crate::cache::{
    CacheKey, CacheStats, EvictionPolicy, FetchCoordinator, Locator, LruTracker, MemoryStore,
    Resolution, ResolutionSink, TrimReport, Waiter,
};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::source::{Codec, Fetcher};

// == Cache ==
/// A two-tier cache instance. Clones share the same tiers.
///
/// Two operation shapes exist. `get_cached` and `get_from_disk` are
/// synchronous and touch only local state. `get`, `get_with` and `request`
/// resolve through memory, disk and network and report through a future,
/// a callback or a sink.
pub struct Cache<C: Codec> {
    coordinator: Arc<FetchCoordinator<C>>,
}

impl<C: Codec> Clone for Cache<C> {
    fn clone(&self) -> Self {
        Self {
            coordinator: Arc::clone(&self.coordinator),
        }
    }
}

impl<C: Codec> Cache<C> {
    // == Constructors ==
    /// Creates an instance on the current tokio runtime.
    pub fn new(config: &Config, fetcher: Arc<dyn Fetcher>, codec: C) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| CacheError::Runtime(e.to_string()))?;
        Ok(Self::with_runtime(config, fetcher, codec, runtime))
    }

    /// Creates an instance whose background work runs on `runtime`.
    /// Usable from threads outside the runtime.
    pub fn with_runtime(
        config: &Config,
        fetcher: Arc<dyn Fetcher>,
        codec: C,
        runtime: Handle,
    ) -> Self {
        Self::with_policy(config, fetcher, codec, runtime, Box::new(LruTracker::new()))
    }

    /// Like [`with_runtime`](Self::with_runtime), with `policy` choosing
    /// which memory entries to give up when over budget.
    pub fn with_policy(
        config: &Config,
        fetcher: Arc<dyn Fetcher>,
        codec: C,
        runtime: Handle,
        policy: Box<dyn EvictionPolicy>,
    ) -> Self {
        info!(
            cache_dir = %config.cache_dir.display(),
            memory_budget = config.memory_budget,
            policy = ?policy,
            "Cache instance created"
        );
        let coordinator = FetchCoordinator::new(
            config.cache_dir.clone(),
            MemoryStore::with_policy(config.memory_budget, policy),
            config.size_fetched_entries,
            fetcher,
            codec,
            runtime,
        );
        Self {
            coordinator: Arc::new(coordinator),
        }
    }

    // == Local Accessors ==
    /// Memory-only lookup. Never touches disk or network.
    pub fn get_cached(&self, locator: &Locator) -> Option<Arc<C::Object>> {
        self.coordinator.memory.lock().get(&locator.to_key())
    }

    /// Disk-only lookup; does not populate memory.
    ///
    /// Missing, unreadable and undecodable records all read as `None`.
    pub fn get_from_disk(&self, locator: &Locator) -> Option<Arc<C::Object>> {
        self.get_from_disk_with_size(locator).map(|(object, _)| object)
    }

    /// Like [`get_from_disk`](Self::get_from_disk), also returning the
    /// number of bytes read.
    pub fn get_from_disk_with_size(&self, locator: &Locator) -> Option<(Arc<C::Object>, u64)> {
        let key = locator.to_key();
        let bytes = match self.coordinator.disk.read(&key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %key, error = %e, "Disk read failed");
                return None;
            }
        };
        match self.coordinator.codec.decode(&bytes) {
            Ok(object) => Some((Arc::new(object), bytes.len() as u64)),
            Err(e) => {
                warn!(key = %key, error = %e, "Corrupt disk record");
                None
            }
        }
    }

    // == Resolver ==
    /// Resolves `url` through memory, disk and network.
    ///
    /// Concurrent calls for the same key share one fetch. Failures come
    /// back as a resolution without an object.
    pub async fn get(&self, url: &str, key: Option<CacheKey>) -> Resolution<C::Object> {
        let key = resolve_key(url, key);
        let (tx, rx) = oneshot::channel();
        self.coordinator
            .resolve(url, Some(key.clone()), Waiter::Channel(tx));
        rx.await.unwrap_or_else(|_| {
            Resolution::failed(
                url.to_string(),
                key.clone(),
                Arc::new(CacheError::Abandoned(key.to_string())),
            )
        })
    }

    /// Callback form of [`get`](Self::get). Returns at once; a memory hit
    /// runs `on_complete` before returning, anything else runs it later on
    /// the runtime.
    pub fn get_with<F>(&self, url: &str, key: Option<CacheKey>, on_complete: F)
    where
        F: FnOnce(Resolution<C::Object>) + Send + 'static,
    {
        self.coordinator
            .resolve(url, key, Waiter::callback(on_complete));
    }

    /// Starts resolving `url` and reports only to `sink`.
    pub fn request(
        &self,
        url: &str,
        key: Option<CacheKey>,
        sink: Arc<dyn ResolutionSink<C::Object>>,
    ) {
        self.coordinator.resolve(url, key, Waiter::Sink(sink));
    }

    /// Whether a fetch for this entry is currently in flight.
    pub fn is_pending(&self, locator: &Locator) -> bool {
        self.coordinator.pending.contains(&locator.to_key())
    }

    // == Mutation ==
    /// Stores `object` in memory and queues its encoded form for disk.
    ///
    /// `size_hint` only counts when a memory budget is configured; an object
    /// hinted larger than the whole budget goes to disk only.
    pub fn set(
        &self,
        object: C::Object,
        locator: &Locator,
        size_hint: Option<u64>,
    ) -> Arc<C::Object> {
        let key = locator.to_key();
        let bytes = self.coordinator.codec.encode(&object);
        let object = Arc::new(object);
        self.coordinator
            .store(key.clone(), Arc::clone(&object), size_hint.unwrap_or(0));
        self.queue_write(key, bytes);
        object
    }

    /// Decodes `bytes`, then stores like [`set`](Self::set). The bytes are
    /// written to disk as given.
    pub fn set_raw(&self, bytes: Vec<u8>, locator: &Locator) -> Result<Arc<C::Object>> {
        let key = locator.to_key();
        let object = Arc::new(self.coordinator.codec.decode(&bytes)?);
        let size = self.coordinator.auto_size(bytes.len());
        self.coordinator.store(key.clone(), Arc::clone(&object), size);
        self.queue_write(key, bytes);
        Ok(object)
    }

    /// Like [`set`](Self::set), but waits until the disk record is written
    /// and reports a failed write instead of only logging it.
    pub async fn set_and_wait(
        &self,
        object: C::Object,
        locator: &Locator,
        size_hint: Option<u64>,
    ) -> Result<Arc<C::Object>> {
        let key = locator.to_key();
        let bytes = self.coordinator.codec.encode(&object);
        let object = Arc::new(object);
        self.coordinator
            .store(key.clone(), Arc::clone(&object), size_hint.unwrap_or(0));
        self.coordinator.disk.write_and_wait(key, bytes).await?;
        Ok(object)
    }

    /// Removes the entry from memory and queues its disk removal.
    /// Absent entries are ignored.
    pub fn remove(&self, locator: &Locator) {
        let key = locator.to_key();
        self.coordinator.memory.lock().remove(&key);
        if let Err(e) = self.coordinator.disk.remove(key.clone()) {
            warn!(key = %key, error = %e, "Could not queue disk removal");
        }
        debug!(key = %key, "Removed entry");
    }

    /// Drops every memory entry; disk is untouched.
    pub fn clear_memory(&self) {
        self.coordinator.memory.lock().clear();
        debug!("Memory tier cleared");
    }

    fn queue_write(&self, key: CacheKey, bytes: Vec<u8>) {
        if let Err(e) = self.coordinator.disk.write(key.clone(), bytes) {
            self.coordinator.stats.record_disk_write_failure();
            warn!(key = %key, error = %e, "Could not queue disk write");
        }
    }

    // == Budget ==
    /// Sets the memory budget (0 = unbounded), evicting at once if needed.
    /// Returns the number of evicted entries.
    pub fn resize_memory_budget(&self, max: u64) -> usize {
        self.resize_memory_budget_range(max, max)
    }

    /// Sets the memory budget to `max`; when usage exceeds it, evicts down
    /// to `min`.
    pub fn resize_memory_budget_range(&self, min: u64, max: u64) -> usize {
        let evicted = self.coordinator.memory.lock().resize_range(min, max);
        self.coordinator.stats.record_evictions(evicted);
        info!(min, max, evicted, "Memory budget resized");
        evicted
    }

    pub fn memory_budget(&self) -> u64 {
        self.coordinator.memory.lock().budget()
    }

    // == Disk Maintenance ==
    /// Trims the disk tier on the writer: when it exceeds `max` bytes, the
    /// least recently used records go until it is within `min`.
    pub async fn trim_disk(&self, min: u64, max: u64) -> Result<TrimReport> {
        self.coordinator.disk.shrink_to_fit(min, max).await
    }

    pub async fn trim_disk_to(&self, bytes: u64) -> Result<TrimReport> {
        self.trim_disk(bytes, bytes).await
    }

    pub fn disk_size(&self) -> Result<u64> {
        self.coordinator.disk.total_size()
    }

    /// Waits until every disk operation queued so far has been applied.
    pub async fn flush(&self) -> Result<()> {
        self.coordinator.disk.flush().await
    }

    pub fn root(&self) -> &Path {
        self.coordinator.disk.root()
    }

    // == Stats ==
    pub fn stats(&self) -> CacheStats {
        let (entries, bytes) = {
            let memory = self.coordinator.memory.lock();
            (memory.len(), memory.tracked_bytes())
        };
        self.coordinator.stats.snapshot(entries, bytes)
    }
}
