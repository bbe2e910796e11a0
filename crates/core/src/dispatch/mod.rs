//! Dispatch of candidate items to torrent backends.
//!
//! [`DispatchRouter`] tries backends in priority order and falls back to the
//! [`crate::queue::OfflineQueue`] when none accepts an item. Admission follows
//! the ratio governor's mode: during an emergency only essential items are
//! submitted.

mod config;
mod dedup;
mod router;
mod types;

pub use config::DispatchConfig;
pub use router::DispatchRouter;
pub use types::{
    fingerprint_for, AddedItem, DispatchError, DispatchItem, DispatchOutcome, ItemPriority,
    QueuedItem,
};
