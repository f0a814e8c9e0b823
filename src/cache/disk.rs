//! Disk Store Module
//!
//! Durable tier: one file per key under a per-instance root directory.
//! Reads happen on the caller; every mutation goes through the single
//! writer task spawned by [`spawn_disk_writer`](crate::tasks::spawn_disk_writer).

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::cache::{CacheKey, StatsRecorder};
use crate::error::{CacheError, Result};
use crate::tasks::spawn_disk_writer;

// == Disk Operations ==
/// Work item for the serialized writer.
#[derive(Debug)]
pub(crate) enum DiskOp {
    Write {
        key: CacheKey,
        bytes: Vec<u8>,
        ack: Option<oneshot::Sender<Result<()>>>,
    },
    Remove {
        key: CacheKey,
    },
    Trim {
        min: u64,
        max: u64,
        ack: oneshot::Sender<Result<TrimReport>>,
    },
    Flush {
        ack: oneshot::Sender<()>,
    },
}

// == Disk Entry ==
/// One record found in the root directory.
#[derive(Debug, Clone, Serialize)]
pub struct DiskEntry {
    pub file_name: String,
    pub size: u64,
    /// Latest of access and modification time
    pub last_used: DateTime<Utc>,
}

// == Trim Report ==
/// Outcome of a disk trim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrimReport {
    pub removed: usize,
    pub freed_bytes: u64,
    pub remaining_bytes: u64,
}

// == Disk Store ==
/// Handle to the durable tier. Cheap to clone; all clones share one writer.
#[derive(Debug, Clone)]
pub struct DiskStore {
    root: Arc<PathBuf>,
    writer: mpsc::UnboundedSender<DiskOp>,
}

impl DiskStore {
    // == Constructor ==
    /// Creates the store and spawns its writer on `runtime`.
    ///
    /// The root directory is not touched until the first write.
    pub fn open(
        root: impl Into<PathBuf>,
        runtime: &Handle,
        stats: Arc<StatsRecorder>,
    ) -> (Self, JoinHandle<()>) {
        let root = Arc::new(root.into());
        let (writer, queue) = mpsc::unbounded_channel();
        let handle = spawn_disk_writer(runtime, Arc::clone(&root), queue, stats);
        (Self { root, writer }, handle)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File path for `key`; depends only on the key and the root.
    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        path_for(&self.root, key)
    }

    // == Read ==
    /// Reads the record for `key`. A missing file is `Ok(None)`.
    pub fn read(&self, key: &CacheKey) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CacheError::io(path, e)),
        }
    }

    /// Async flavour of [`read`](Self::read) for use inside tasks.
    pub async fn read_async(&self, key: &CacheKey) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CacheError::io(path, e)),
        }
    }

    // == Write ==
    /// Queues a write and returns immediately.
    pub fn write(&self, key: CacheKey, bytes: Vec<u8>) -> Result<()> {
        self.enqueue(DiskOp::Write {
            key,
            bytes,
            ack: None,
        })
    }

    /// Queues a write and waits until the writer has applied it.
    pub async fn write_and_wait(&self, key: CacheKey, bytes: Vec<u8>) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.enqueue(DiskOp::Write {
            key,
            bytes,
            ack: Some(ack),
        })?;
        done.await.map_err(|_| CacheError::WriterClosed)?
    }

    // == Remove ==
    /// Queues removal of the record for `key`. Missing files are fine.
    pub fn remove(&self, key: CacheKey) -> Result<()> {
        self.enqueue(DiskOp::Remove { key })
    }

    // == Flush ==
    /// Waits until every operation queued before this call has been applied.
    pub async fn flush(&self) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.enqueue(DiskOp::Flush { ack })?;
        done.await.map_err(|_| CacheError::WriterClosed)
    }

    // == Size ==
    /// Lists every record in the root directory.
    pub fn entries(&self) -> Result<Vec<DiskEntry>> {
        list_entries(&self.root)
    }

    /// Total bytes stored on disk.
    pub fn total_size(&self) -> Result<u64> {
        Ok(self.entries()?.iter().map(|e| e.size).sum())
    }

    // == Trim ==
    /// Shrinks the directory on the writer, see [`trim_dir`].
    pub async fn shrink_to_fit(&self, min: u64, max: u64) -> Result<TrimReport> {
        let (ack, done) = oneshot::channel();
        self.enqueue(DiskOp::Trim { min, max, ack })?;
        done.await.map_err(|_| CacheError::WriterClosed)?
    }

    fn enqueue(&self, op: DiskOp) -> Result<()> {
        self.writer.send(op).map_err(|_| CacheError::WriterClosed)
    }
}

// == File Operations ==
// Called only from the writer task.

pub(crate) fn path_for(root: &Path, key: &CacheKey) -> PathBuf {
    root.join(key.file_name())
}

fn temp_path_for(root: &Path, key: &CacheKey) -> PathBuf {
    root.join(format!(".{}.tmp", key.file_name()))
}

/// Writes through a temp file and rename so readers never see a partial record.
pub(crate) fn write_record(root: &Path, key: &CacheKey, bytes: &[u8]) -> Result<()> {
    let tmp = temp_path_for(root, key);
    let path = path_for(root, key);
    std::fs::write(&tmp, bytes).map_err(|e| CacheError::io(&tmp, e))?;
    std::fs::rename(&tmp, &path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        CacheError::io(&path, e)
    })
}

pub(crate) fn remove_record(root: &Path, key: &CacheKey) -> Result<()> {
    let path = path_for(root, key);
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CacheError::io(path, e)),
    }
}

pub(crate) fn ensure_root(root: &Path) -> Result<()> {
    std::fs::create_dir_all(root).map_err(|e| CacheError::io(root, e))
}

/// Lists records, skipping temp files. A missing root is an empty store.
pub(crate) fn list_entries(root: &Path) -> Result<Vec<DiskEntry>> {
    let dir = match std::fs::read_dir(root) {
        Ok(dir) => dir,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(CacheError::io(root, e)),
    };

    let mut entries = Vec::new();
    for item in dir {
        let item = item.map_err(|e| CacheError::io(root, e))?;
        let file_name = item.file_name().to_string_lossy().into_owned();
        if file_name.starts_with('.') {
            continue;
        }
        let meta = match item.metadata() {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => continue,
            // Removed between listing and stat
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => return Err(CacheError::io(item.path(), e)),
        };
        entries.push(DiskEntry {
            file_name,
            size: meta.len(),
            last_used: last_used(&meta),
        });
    }
    Ok(entries)
}

fn last_used(meta: &std::fs::Metadata) -> DateTime<Utc> {
    let accessed = meta.accessed().ok();
    let modified = meta.modified().ok();
    let newest = match (accessed, modified) {
        (Some(a), Some(m)) => a.max(m),
        (Some(t), None) | (None, Some(t)) => t,
        (None, None) => SystemTime::UNIX_EPOCH,
    };
    DateTime::<Utc>::from(newest)
}

// == Trim Dir ==
/// Removes least recently used records when the directory exceeds `max`
/// bytes, down to `min` bytes (clamped to `max`). `max == 0` disables
/// trimming.
pub(crate) fn trim_dir(root: &Path, min: u64, max: u64) -> Result<TrimReport> {
    let mut entries = list_entries(root)?;
    let mut total: u64 = entries.iter().map(|e| e.size).sum();
    let mut report = TrimReport {
        remaining_bytes: total,
        ..TrimReport::default()
    };
    if max == 0 || total <= max {
        return Ok(report);
    }

    let target = min.min(max);
    entries.sort_by(|a, b| a.last_used.cmp(&b.last_used));
    for entry in entries {
        if total <= target {
            break;
        }
        let path = root.join(&entry.file_name);
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(CacheError::io(path, e)),
        }
        debug!(file = %entry.file_name, size = entry.size, "Trimmed disk record");
        total -= entry.size;
        report.removed += 1;
        report.freed_bytes += entry.size;
    }
    report.remaining_bytes = total;
    Ok(report)
}
