//! Background Tasks Module
//!
//! Contains the tasks that run beside a cache instance.
//!
//! # Tasks
//! - Disk writer: applies every disk mutation in order, one at a time
//! - Disk trim: shrinks the disk tier to configured bounds at an interval

mod disk_trim;
mod disk_writer;

pub use disk_trim::spawn_disk_trim_task;
pub(crate) use disk_writer::spawn_disk_writer;
