//! Cache Module
//!
//! Two-tier object cache: a size-bounded memory tier over a durable disk
//! tier, populated through coalesced remote fetches.

mod coordinator;
pub(crate) mod disk;
mod entry;
mod facade;
mod key;
mod lru;
mod memory;
mod pending;
mod resolution;
mod stats;


// Re-export public types
pub use coordinator::FetchCoordinator;
pub use disk::{DiskEntry, DiskStore, TrimReport};
pub use entry::MemoryEntry;
pub use facade::Cache;
pub use key::{CacheKey, Locator};
pub use lru::{EvictionPolicy, LruTracker};
pub use memory::MemoryStore;
pub use pending::{Join, PendingFetch, PendingGuard, PendingRegistry};
pub use resolution::{Origin, Resolution, ResolutionSink, Waiter};
pub use stats::{CacheStats, StatsRecorder};
