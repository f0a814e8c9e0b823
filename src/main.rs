//! fetch-cache - Warms a cache directory with remote resources
//!
//! Usage: `fetch-cache <url>...`
//!
//! Every URL is resolved through the default cache instance (memory, then
//! disk, then network). Once the disk queue has drained the cache
//! statistics are printed as JSON.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use once_cell::sync::Lazy;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fetch_cache::{spawn_disk_trim_task, Config, HttpFetcher, RawCodec, SharedCache};

/// Process-wide cache factory; the default instance is built on first use.
static CACHE: Lazy<SharedCache<RawCodec>> = Lazy::new(|| {
    let config = Config::from_env();
    let fetcher = HttpFetcher::new().with_timeout(Duration::from_secs(config.fetch_timeout));
    SharedCache::new(config, Arc::new(fetcher), || RawCodec)
});

#[tokio::main]
async fn main() -> Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fetch_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let urls: Vec<String> = std::env::args().skip(1).collect();
    if urls.is_empty() {
        bail!("usage: fetch-cache <url>...");
    }

    let config = CACHE.config();
    info!(
        "Configuration loaded: cache_dir={}, memory_budget={}, disk_max={}, trim_interval={}s",
        config.cache_dir.display(),
        config.memory_budget,
        config.disk_max_bytes,
        config.trim_interval
    );

    let cache = CACHE
        .get_instance()
        .context("failed to create cache instance")?;

    let trim_handle = (config.trim_interval > 0 && config.disk_max_bytes > 0).then(|| {
        spawn_disk_trim_task(
            cache.clone(),
            config.trim_interval,
            config.disk_min_bytes,
            config.disk_max_bytes,
        )
    });

    let mut pending = Vec::with_capacity(urls.len());
    for url in urls {
        let cache = cache.clone();
        pending.push(tokio::spawn(async move {
            let resolution = cache.get(&url, None).await;
            match resolution.error() {
                None => info!(
                    url = %url,
                    key = %resolution.key,
                    origin = ?resolution.origin,
                    "Resolved"
                ),
                Some(e) => warn!(url = %url, error = %e, "Could not resolve"),
            }
        }));
    }

    tokio::select! {
        _ = async {
            for handle in pending {
                let _ = handle.await;
            }
        } => {}
        _ = signal::ctrl_c() => {
            warn!("Received Ctrl+C, stopping early");
        }
    }

    cache.flush().await.context("disk queue did not drain")?;
    if config.disk_max_bytes > 0 {
        cache
            .trim_disk(config.disk_min_bytes, config.disk_max_bytes)
            .await
            .context("disk trim failed")?;
    }
    if let Some(handle) = trim_handle {
        handle.abort();
    }

    let stats = cache.stats();
    println!("{}", serde_json::to_string_pretty(&stats)?);
    info!(
        disk_bytes = cache.disk_size().unwrap_or_default(),
        "Cache warm-up complete"
    );
    Ok(())
}
