//! Testing utilities and mock implementations.
//!
//! Mocks for the remote seams (torrent backends and the VPN path) so the
//! dispatch and supervision logic can be exercised without real services.
//!
//! # Example
//!
//! ```rust,ignore
//! use seedwarden_core::testing::{fixtures, MockTorrentClient, MockVpnChecker};
//!
//! let client = MockTorrentClient::named("seedbox");
//! client.insert_torrent(fixtures::torrent("abc", TorrentState::Downloading, 0));
//! let vpn = MockVpnChecker::down();
//! ```

mod mock_torrent_client;
mod mock_vpn;

pub use mock_torrent_client::MockTorrentClient;
pub use mock_vpn::MockVpnChecker;

/// Test fixtures and helper functions.
pub mod fixtures {
    use chrono::Utc;

    use crate::torrent_client::{TorrentInfo, TorrentState};

    /// Size of fixture torrents in bytes.
    pub const SIZE: u64 = 1024 * 1024;

    /// A magnet URI for the given info hash.
    pub fn magnet(hash: &str) -> String {
        format!("magnet:?xt=urn:btih:{}&dn=fixture", hash)
    }

    /// A torrent as a backend would report it.
    pub fn torrent(hash: &str, state: TorrentState, completed_bytes: u64) -> TorrentInfo {
        let completed = completed_bytes.min(SIZE);
        TorrentInfo {
            hash: hash.to_string(),
            name: format!("Fixture {}", hash),
            state,
            progress: completed as f64 / SIZE as f64,
            size_bytes: SIZE,
            completed_bytes: completed,
            downloaded_bytes: completed,
            uploaded_bytes: 0,
            category: None,
            added_at: Some(Utc::now()),
        }
    }

    /// A finished torrent with the given transfer totals.
    pub fn seeding(hash: &str, uploaded: u64, downloaded: u64) -> TorrentInfo {
        TorrentInfo {
            uploaded_bytes: uploaded,
            downloaded_bytes: downloaded,
            ..torrent(hash, TorrentState::Seeding, SIZE)
        }
    }
}
