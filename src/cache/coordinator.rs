//! Fetch Coordinator Module
//!
//! Resolves `(url, key)` pairs against memory, then disk, then the
//! [`Fetcher`], with at most one fetch in flight per key.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::cache::key::resolve_key;
use crate::cache::{
    CacheKey, DiskStore, Join, MemoryStore, Origin, PendingGuard, PendingRegistry, Resolution,
    StatsRecorder, Waiter,
};
use crate::error::CacheError;
use crate::source::{Codec, Fetcher};

// == Fetch Coordinator ==
/// Shared state of one cache instance. Always used behind an `Arc` since
/// fetch tasks keep it alive until they complete.
pub struct FetchCoordinator<C: Codec> {
    pub(crate) memory: Mutex<MemoryStore<C::Object>>,
    pub(crate) disk: DiskStore,
    pub(crate) pending: Arc<PendingRegistry<C::Object>>,
    pub(crate) fetcher: Arc<dyn Fetcher>,
    pub(crate) codec: Arc<C>,
    pub(crate) stats: Arc<StatsRecorder>,
    pub(crate) runtime: Handle,
    /// Count fetched and promoted entries by their encoded size
    size_fetched_entries: bool,
}

impl<C: Codec> FetchCoordinator<C> {
    // == Constructor ==
    /// Builds the coordinator over `memory` and starts the disk writer for
    /// `root`.
    pub fn new(
        root: PathBuf,
        memory: MemoryStore<C::Object>,
        size_fetched_entries: bool,
        fetcher: Arc<dyn Fetcher>,
        codec: C,
        runtime: Handle,
    ) -> Self {
        let stats = Arc::new(StatsRecorder::new());
        let (disk, _writer) = DiskStore::open(root, &runtime, Arc::clone(&stats));
        Self {
            memory: Mutex::new(memory),
            disk,
            pending: Arc::new(PendingRegistry::new()),
            fetcher,
            codec: Arc::new(codec),
            stats,
            runtime,
            size_fetched_entries,
        }
    }

    // == Resolve ==
    /// Resolves `url` (under `key`, or the key derived from `url`) and
    /// delivers the result to `waiter`.
    ///
    /// A memory hit is delivered before this returns. Otherwise the waiter
    /// joins the pending record for the key; the first caller spawns the
    /// task that reads disk, then fetches, and completes every waiter.
    pub fn resolve(self: &Arc<Self>, url: &str, key: Option<CacheKey>, waiter: Waiter<C::Object>) {
        let key = resolve_key(url, key);

        if let Some(object) = self.memory_hit(&key) {
            waiter.deliver(&Resolution::resolved(
                url.to_string(),
                key,
                object,
                Origin::Memory,
            ));
            return;
        }

        match self.pending.join(&key, url, waiter) {
            Join::Follower => self.stats.record_coalesced(),
            Join::Leader => {
                let guard = PendingGuard::new(Arc::clone(&self.pending), key, url.to_string());
                let this = Arc::clone(self);
                self.runtime.spawn(async move {
                    let resolution = this.load(guard.key(), guard.url()).await;
                    guard.complete(resolution);
                });
            }
        }
    }

    fn memory_hit(&self, key: &CacheKey) -> Option<Arc<C::Object>> {
        let object = self.memory.lock().get(key)?;
        self.stats.record_memory_hit();
        debug!(key = %key, "Memory hit");
        Some(object)
    }

    // == Load ==
    /// Leader path: disk, then network. Never holds a lock across an await.
    async fn load(&self, key: &CacheKey, url: &str) -> Resolution<C::Object> {
        // A previous leader may have finished between our miss and our join
        if let Some(object) = self.memory_hit(key) {
            return Resolution::resolved(url.to_string(), key.clone(), object, Origin::Memory);
        }

        if let Some(object) = self.promote_from_disk(key).await {
            return Resolution::resolved(url.to_string(), key.clone(), object, Origin::Disk);
        }

        self.stats.record_fetch();
        debug!(key = %key, url = %url, "Fetching");
        match self.fetch_and_decode(url).await {
            Ok((object, bytes)) => {
                let object = Arc::new(object);
                self.store(key.clone(), Arc::clone(&object), self.auto_size(bytes.len()));
                if let Err(e) = self.disk.write(key.clone(), bytes) {
                    self.stats.record_disk_write_failure();
                    warn!(key = %key, error = %e, "Could not queue disk write");
                }
                Resolution::resolved(url.to_string(), key.clone(), object, Origin::Network)
            }
            Err(e) => {
                self.stats.record_fetch_failure();
                warn!(key = %key, url = %url, error = %e, "Resolution failed");
                Resolution::failed(url.to_string(), key.clone(), Arc::new(e))
            }
        }
    }

    /// Reads and decodes the disk record, populating memory on success.
    /// Unreadable or corrupt records count as misses.
    async fn promote_from_disk(&self, key: &CacheKey) -> Option<Arc<C::Object>> {
        let bytes = match self.disk.read_async(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %key, error = %e, "Disk read failed, treating as miss");
                return None;
            }
        };

        match self.codec.decode(&bytes) {
            Ok(object) => {
                let object = Arc::new(object);
                self.store(key.clone(), Arc::clone(&object), self.auto_size(bytes.len()));
                self.stats.record_disk_hit();
                debug!(key = %key, bytes = bytes.len(), "Disk hit, promoted to memory");
                Some(object)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Corrupt disk record, refetching");
                None
            }
        }
    }

    async fn fetch_and_decode(&self, url: &str) -> Result<(C::Object, Vec<u8>), CacheError> {
        let bytes = self
            .fetcher
            .fetch(url)
            .await
            .map_err(|source| CacheError::Fetch {
                url: url.to_string(),
                source,
            })?;
        let object = self.codec.decode(&bytes)?;
        Ok((object, bytes))
    }

    // == Memory Helpers ==
    /// Inserts into memory and records any evictions it caused.
    pub(crate) fn store(&self, key: CacheKey, object: Arc<C::Object>, size_hint: u64) {
        let evicted = self.memory.lock().set(key, object, size_hint);
        self.stats.record_evictions(evicted);
    }

    /// Size hint for entries whose size the caller did not state.
    pub(crate) fn auto_size(&self, encoded_len: usize) -> u64 {
        if self.size_fetched_entries {
            encoded_len as u64
        } else {
            0
        }
    }
}
