//! Torrent client abstraction.
//!
//! This module provides a `TorrentClient` trait for the remote backends that
//! items are dispatched to and transfers are supervised on.

mod magnet;
mod qbittorrent;
mod types;

pub use magnet::extract_info_hash;
pub use qbittorrent::QBittorrentClient;
pub use types::*;
