//! Durable queue for items no backend could accept.
//!
//! The queue is a JSON array on disk so operators can inspect or edit it.
//! Every change is written to a temporary file, synced and renamed over the
//! original, so a crash mid-write leaves either the old or the new file.

mod config;
mod offline;
mod types;

pub use config::QueueConfig;
pub use offline::OfflineQueue;
pub use types::{Delivery, DrainReport, QueueError, QueueReason, QueueRecord};
