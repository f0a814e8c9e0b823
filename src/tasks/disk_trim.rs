//! Disk Trim Task
//!
//! Background task that periodically shrinks the disk tier to its bounds.
//! Trims run on the disk writer, so they never interleave with writes.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::Cache;
use crate::source::Codec;

/// Spawns a task that trims `cache`'s disk tier every `interval_secs`.
///
/// Each run removes least recently used records once the directory holds
/// more than `max_bytes`, until it holds at most `min_bytes`.
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort it on
/// shutdown.
///
/// # Example
/// ```ignore
/// let trim = spawn_disk_trim_task(cache.clone(), 60, 64 << 20, 128 << 20);
/// // Later, during shutdown:
/// trim.abort();
/// ```
pub fn spawn_disk_trim_task<C: Codec>(
    cache: Cache<C>,
    interval_secs: u64,
    min_bytes: u64,
    max_bytes: u64,
) -> JoinHandle<()> {
    let interval = Duration::from_secs(interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            interval_secs,
            min_bytes, max_bytes, "Starting disk trim task"
        );

        loop {
            tokio::time::sleep(interval).await;

            match cache.trim_disk(min_bytes, max_bytes).await {
                Ok(report) if report.removed > 0 => info!(
                    "Disk trim: removed {} records, {} bytes remain",
                    report.removed, report.remaining_bytes
                ),
                Ok(_) => debug!("Disk trim: nothing to remove"),
                Err(e) => warn!(error = %e, "Disk trim failed"),
            }
        }
    })
}
