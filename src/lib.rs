//! Fetch Cache - A two-tier object cache for remote resources
//!
//! Keeps decoded objects in a size-bounded memory tier and their encoded
//! bytes in a per-instance disk directory, fetching misses with at most one
//! request in flight per key.

pub mod cache;
pub mod config;
pub mod error;
pub mod shared;
pub mod source;
pub mod tasks;

pub use cache::{
    Cache, CacheKey, CacheStats, EvictionPolicy, Locator, LruTracker, Origin, Resolution,
    ResolutionSink,
};
pub use config::Config;
pub use error::{CacheError, DecodeError, FetchError, Result};
pub use shared::SharedCache;
pub use source::{Codec, Fetcher, HttpFetcher, RawCodec};
pub use tasks::spawn_disk_trim_task;
