//! Shared Instance Module
//!
//! A factory for cache instances plus one lazily built, process-wide
//! default instance. The composition root owns the [`SharedCache`] (often
//! in a `static`); the cache types themselves know nothing about it.

use std::path::Path;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tokio::runtime::Handle;
use tracing::debug;

use crate::cache::{Cache, EvictionPolicy, LruTracker};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::source::{Codec, Fetcher};

type CodecFactory<C> = Box<dyn Fn() -> C + Send + Sync>;
type PolicyFactory = Box<dyn Fn() -> Box<dyn EvictionPolicy> + Send + Sync>;

// == Shared Cache ==
/// Builds cache instances that share a fetcher, a codec factory and a base
/// configuration. Each instance gets its own eviction policy, LRU unless
/// [`with_eviction_policy`](Self::with_eviction_policy) says otherwise.
pub struct SharedCache<C: Codec> {
    config: Config,
    fetcher: Arc<dyn Fetcher>,
    codec: CodecFactory<C>,
    policy: PolicyFactory,
    default: OnceCell<Cache<C>>,
}

impl<C: Codec> SharedCache<C> {
    pub fn new<F>(config: Config, fetcher: Arc<dyn Fetcher>, codec: F) -> Self
    where
        F: Fn() -> C + Send + Sync + 'static,
    {
        Self {
            config,
            fetcher,
            codec: Box::new(codec),
            policy: Box::new(|| Box::new(LruTracker::new()) as Box<dyn EvictionPolicy>),
            default: OnceCell::new(),
        }
    }

    /// Builds every instance's memory tier with a policy from `policy`.
    pub fn with_eviction_policy<P>(mut self, policy: P) -> Self
    where
        P: Fn() -> Box<dyn EvictionPolicy> + Send + Sync + 'static,
    {
        self.policy = Box::new(policy);
        self
    }

    /// The default instance, created on first use from the base
    /// configuration. Must first be called inside a tokio runtime.
    pub fn get_instance(&self) -> Result<Cache<C>> {
        self.default
            .get_or_try_init(|| {
                debug!(
                    cache_dir = %self.config.cache_dir.display(),
                    "Creating default cache instance"
                );
                self.build(&self.config)
            })
            .cloned()
    }

    /// A separate instance with its own memory tier and disk directory.
    /// `memory_budget` overrides the base budget when given.
    pub fn new_instance(
        &self,
        root: impl AsRef<Path>,
        memory_budget: Option<u64>,
    ) -> Result<Cache<C>> {
        let mut config = self.config.clone().with_cache_dir(root);
        if let Some(budget) = memory_budget {
            config = config.with_memory_budget(budget);
        }
        self.build(&config)
    }

    fn build(&self, config: &Config) -> Result<Cache<C>> {
        let runtime = Handle::try_current().map_err(|e| CacheError::Runtime(e.to_string()))?;
        Ok(Cache::with_policy(
            config,
            Arc::clone(&self.fetcher),
            (self.codec)(),
            runtime,
            (self.policy)(),
        ))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Locator;
    use crate::error::FetchError;
    use crate::source::RawCodec;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    struct NoFetch;

    #[async_trait]
    impl Fetcher for NoFetch {
        async fn fetch(&self, url: &str) -> std::result::Result<Vec<u8>, FetchError> {
            Err(FetchError::Unavailable(url.to_string()))
        }
    }

    #[tokio::test]
    async fn test_default_instance_is_shared() {
        let dir = tempdir().unwrap();
        let shared = SharedCache::new(
            Config::default().with_cache_dir(dir.path()),
            Arc::new(NoFetch),
            || RawCodec,
        );

        let a = shared.get_instance().unwrap();
        let b = shared.get_instance().unwrap();
        a.set(vec![1], &Locator::key("k"), None);

        assert!(b.get_cached(&Locator::key("k")).is_some());
        assert_eq!(a.root(), dir.path());
    }

    #[tokio::test]
    async fn test_new_instances_are_isolated() {
        let dir = tempdir().unwrap();
        let shared = SharedCache::new(
            Config::default().with_cache_dir(dir.path().join("default")),
            Arc::new(NoFetch),
            || RawCodec,
        );

        let other = shared
            .new_instance(dir.path().join("other"), Some(1024))
            .unwrap();
        other.set(vec![1], &Locator::key("k"), Some(1));

        let default = shared.get_instance().unwrap();
        assert!(default.get_cached(&Locator::key("k")).is_none());
        assert_eq!(other.memory_budget(), 1024);
        assert_eq!(default.memory_budget(), 0);
        assert_eq!(other.root(), dir.path().join("other"));
    }

    #[test]
    fn test_instances_need_a_runtime() {
        let dir = tempdir().unwrap();
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        let shared = SharedCache::new(
            Config::default().with_cache_dir(dir.path().join("default")),
            Arc::new(NoFetch),
            || RawCodec,
        )
        .with_eviction_policy(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::new(LruTracker::new())
        });

        assert!(matches!(shared.get_instance(), Err(CacheError::Runtime(_))));

        // A failed first attempt is not remembered
        tokio_test::block_on(async {
            let a = shared.get_instance().unwrap();
            let b = shared.get_instance().unwrap();
            a.set(vec![7], &Locator::key("k"), None);
            assert!(b.get_cached(&Locator::key("k")).is_some());
            shared.new_instance(dir.path().join("other"), None).unwrap();
        });

        // One policy per instance built
        assert_eq!(built.load(Ordering::SeqCst), 2);
    }
}
