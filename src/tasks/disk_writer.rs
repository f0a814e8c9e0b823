//! Disk Writer Task
//!
//! The single worker that applies every disk mutation in queue order, so
//! concurrent writers never interleave and directory creation cannot race.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::disk::{ensure_root, remove_record, trim_dir, write_record, DiskOp};
use crate::cache::{CacheKey, StatsRecorder};
use crate::error::{CacheError, Result};

/// Spawns the writer for `root` on `runtime`.
///
/// The task ends once every [`DiskStore`](crate::cache::DiskStore) clone
/// holding the sending half has been dropped and the queue is drained.
pub(crate) fn spawn_disk_writer(
    runtime: &Handle,
    root: Arc<PathBuf>,
    mut queue: mpsc::UnboundedReceiver<DiskOp>,
    stats: Arc<StatsRecorder>,
) -> JoinHandle<()> {
    runtime.spawn(async move {
        debug!(root = %root.display(), "Disk writer started");
        let mut root_ready = false;

        while let Some(op) = queue.recv().await {
            match op {
                DiskOp::Write { key, bytes, ack } => {
                    let result = {
                        let root = Arc::clone(&root);
                        let first = !root_ready;
                        blocking(move || write_with_root(&root, &key, &bytes, first)).await
                    };
                    match &result {
                        Ok(()) => root_ready = true,
                        Err(e) => {
                            stats.record_disk_write_failure();
                            warn!(error = %e, "Disk write failed");
                        }
                    }
                    if let Some(ack) = ack {
                        let _ = ack.send(result);
                    }
                }
                DiskOp::Remove { key } => {
                    let root = Arc::clone(&root);
                    if let Err(e) = blocking(move || remove_record(&root, &key)).await {
                        warn!(error = %e, "Disk remove failed");
                    }
                }
                DiskOp::Trim { min, max, ack } => {
                    let result = {
                        let root = Arc::clone(&root);
                        blocking(move || trim_dir(&root, min, max)).await
                    };
                    match &result {
                        Ok(report) if report.removed > 0 => info!(
                            removed = report.removed,
                            freed_bytes = report.freed_bytes,
                            remaining_bytes = report.remaining_bytes,
                            "Disk trim completed"
                        ),
                        Ok(_) => debug!("Disk trim: within bounds"),
                        Err(e) => warn!(error = %e, "Disk trim failed"),
                    }
                    let _ = ack.send(result);
                }
                DiskOp::Flush { ack } => {
                    let _ = ack.send(());
                }
            }
        }

        debug!(root = %root.display(), "Disk writer stopped");
    })
}

/// Creates the root before the first write, and again if it vanished.
fn write_with_root(root: &Path, key: &CacheKey, bytes: &[u8], first: bool) -> Result<()> {
    if first {
        ensure_root(root)?;
    }
    match write_record(root, key, bytes) {
        Err(CacheError::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
            ensure_root(root)?;
            write_record(root, key, bytes)
        }
        other => other,
    }
}

async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| CacheError::Runtime(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_writer_stops_when_senders_dropped() {
        let dir = tempdir().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = spawn_disk_writer(
            &Handle::current(),
            Arc::new(dir.path().to_path_buf()),
            rx,
            Arc::new(StatsRecorder::new()),
        );

        drop(tx);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_write_failure_is_counted() {
        let dir = tempdir().unwrap();
        // A regular file where the root directory should be
        let root = dir.path().join("blocked");
        std::fs::write(&root, b"not a dir").unwrap();

        let stats = Arc::new(StatsRecorder::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let _handle = spawn_disk_writer(&Handle::current(), Arc::new(root), rx, Arc::clone(&stats));

        let (ack, done) = oneshot::channel();
        tx.send(DiskOp::Write {
            key: CacheKey::new("k"),
            bytes: vec![1, 2, 3],
            ack: Some(ack),
        })
        .unwrap();

        assert!(done.await.unwrap().is_err());
        assert_eq!(stats.snapshot(0, 0).disk_write_failures, 1);
    }
}
