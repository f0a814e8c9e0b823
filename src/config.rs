//! Configuration Module
//!
//! Handles loading cache configuration from environment variables.

use std::env;
use std::path::{Path, PathBuf};

use directories::BaseDirs;

/// Directory name used under the platform cache directory.
const DEFAULT_DIR_NAME: &str = "FetchCache";

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory of the disk tier
    pub cache_dir: PathBuf,
    /// Memory budget in bytes, 0 = unbounded
    pub memory_budget: u64,
    /// Count fetched entries against the budget by their encoded size
    pub size_fetched_entries: bool,
    /// Disk trim lower bound in bytes
    pub disk_min_bytes: u64,
    /// Disk trim upper bound in bytes, 0 = never trim
    pub disk_max_bytes: u64,
    /// Background disk trim interval in seconds, 0 = disabled
    pub trim_interval: u64,
    /// Per-request timeout of the bundled HTTP fetcher in seconds
    pub fetch_timeout: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `FETCH_CACHE_DIR` - Disk tier root (default: platform cache dir + `FetchCache`)
    /// - `FETCH_CACHE_MEMORY_BUDGET` - Memory budget in bytes (default: 0)
    /// - `FETCH_CACHE_SIZE_FETCHED` - `true`/`1` to size fetched entries (default: false)
    /// - `FETCH_CACHE_DISK_MIN` - Disk trim target in bytes (default: 0)
    /// - `FETCH_CACHE_DISK_MAX` - Disk trim threshold in bytes (default: 0)
    /// - `FETCH_CACHE_TRIM_INTERVAL` - Trim frequency in seconds (default: 0)
    /// - `FETCH_CACHE_FETCH_TIMEOUT` - HTTP request timeout in seconds (default: 30)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cache_dir: env::var("FETCH_CACHE_DIR")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
            memory_budget: parse_var("FETCH_CACHE_MEMORY_BUDGET").unwrap_or(defaults.memory_budget),
            size_fetched_entries: env::var("FETCH_CACHE_SIZE_FETCHED")
                .ok()
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(defaults.size_fetched_entries),
            disk_min_bytes: parse_var("FETCH_CACHE_DISK_MIN").unwrap_or(defaults.disk_min_bytes),
            disk_max_bytes: parse_var("FETCH_CACHE_DISK_MAX").unwrap_or(defaults.disk_max_bytes),
            trim_interval: parse_var("FETCH_CACHE_TRIM_INTERVAL").unwrap_or(defaults.trim_interval),
            fetch_timeout: parse_var("FETCH_CACHE_FETCH_TIMEOUT")
                .filter(|&secs| secs > 0)
                .unwrap_or(defaults.fetch_timeout),
        }
    }

    pub fn with_cache_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cache_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn with_memory_budget(mut self, budget: u64) -> Self {
        self.memory_budget = budget;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            memory_budget: 0,
            size_fetched_entries: false,
            disk_min_bytes: 0,
            disk_max_bytes: 0,
            trim_interval: 0,
            fetch_timeout: 30,
        }
    }
}

/// Platform cache directory joined with `FetchCache`, or the temp dir when
/// no home directory can be determined.
pub fn default_cache_dir() -> PathBuf {
    BaseDirs::new()
        .map(|dirs| dirs.cache_dir().to_path_buf())
        .unwrap_or_else(env::temp_dir)
        .join(DEFAULT_DIR_NAME)
}

fn parse_var(name: &str) -> Option<u64> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
