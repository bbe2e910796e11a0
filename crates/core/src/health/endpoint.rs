//! Backend endpoint identity.

use std::sync::Arc;

use crate::config::{BackendConfig, BackendRole};
use crate::torrent_client::{QBittorrentClient, TorrentClient, TorrentClientError};

/// A configured backend together with the client that talks to it.
///
/// The client owns the ephemeral session token; last health lives in
/// [`super::BackendHealthProbe`].
#[derive(Clone)]
pub struct BackendEndpoint {
    pub name: String,
    pub url: String,
    pub role: BackendRole,
    /// Lower values are tried first.
    pub priority: u32,
    pub requires_vpn: bool,
    /// Category applied to items added through this backend.
    pub category: Option<String>,
    pub client: Arc<dyn TorrentClient>,
}

impl BackendEndpoint {
    /// Build an endpoint backed by a qBittorrent client.
    pub fn from_config(config: &BackendConfig) -> Result<Self, TorrentClientError> {
        let client = QBittorrentClient::new(config.clone())?;
        Ok(Self {
            name: config.name.clone(),
            url: config.url.clone(),
            role: config.role,
            priority: config.priority,
            requires_vpn: config.requires_vpn,
            category: config.category.clone(),
            client: Arc::new(client),
        })
    }

    /// Build an endpoint around an existing client (named after it).
    pub fn with_client(client: Arc<dyn TorrentClient>) -> Self {
        Self {
            name: client.name().to_string(),
            url: String::new(),
            role: BackendRole::Primary,
            priority: 100,
            requires_vpn: false,
            category: None,
            client,
        }
    }

    pub fn priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn role(mut self, role: BackendRole) -> Self {
        self.role = role;
        self
    }

    pub fn requiring_vpn(mut self) -> Self {
        self.requires_vpn = true;
        self
    }
}

impl std::fmt::Debug for BackendEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendEndpoint")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("role", &self.role)
            .field("priority", &self.priority)
            .field("requires_vpn", &self.requires_vpn)
            .finish()
    }
}

/// Sort endpoints into dispatch order (priority, then declaration order).
pub(crate) fn sort_by_priority(endpoints: &mut [BackendEndpoint]) {
    endpoints.sort_by_key(|e| e.priority);
}
