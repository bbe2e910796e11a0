//! Accepted-fingerprint cache.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

/// Remembers which backend accepted a fingerprint, for a TTL matching the
/// backend's own duplicate window.
#[derive(Debug)]
pub(crate) struct FingerprintCache {
    ttl: Duration,
    entries: HashMap<String, (String, Instant)>,
}

impl FingerprintCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    /// Backend that accepted the fingerprint, if still within the TTL.
    pub fn get(&mut self, fingerprint: &str) -> Option<String> {
        match self.entries.get(fingerprint) {
            Some((backend, at)) if at.elapsed() < self.ttl => Some(backend.clone()),
            Some(_) => {
                self.entries.remove(fingerprint);
                None
            }
            None => None,
        }
    }

    pub fn insert(&mut self, fingerprint: impl Into<String>, backend: impl Into<String>) {
        if self.entries.len() >= 1024 {
            self.prune();
        }
        self.entries
            .insert(fingerprint.into(), (backend.into(), Instant::now()));
    }

    fn prune(&mut self) {
        let ttl = self.ttl;
        self.entries.retain(|_, (_, at)| at.elapsed() < ttl);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
