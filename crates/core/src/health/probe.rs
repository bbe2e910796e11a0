//! Cached backend health probe.

use std::collections::HashMap;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use super::{BackendEndpoint, HealthRecord, ProbeStatus};
use crate::audit::{AuditEvent, AuditHandle};
use crate::metrics;
use crate::torrent_client::{FailureKind, TorrentClientError};

/// Probes a backend by authenticating and then issuing one authenticated
/// capability call.
///
/// A login that succeeds is not enough: some backends hand out a session
/// and then reject it, so the probe is only `Ok` once the capability call
/// goes through. Results are cached per endpoint for `ttl`.
pub struct BackendHealthProbe {
    ttl: Duration,
    call_timeout: Duration,
    cache: RwLock<HashMap<String, (HealthRecord, Instant)>>,
    audit: Option<AuditHandle>,
}

impl BackendHealthProbe {
    pub fn new(ttl: Duration, call_timeout: Duration) -> Self {
        Self {
            ttl,
            call_timeout,
            cache: RwLock::new(HashMap::new()),
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: AuditHandle) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Health of the endpoint, from cache when the last probe is fresh.
    pub async fn probe(&self, endpoint: &BackendEndpoint) -> ProbeStatus {
        {
            let cache = self.cache.read().await;
            if let Some((record, at)) = cache.get(&endpoint.name) {
                if at.elapsed() < self.ttl {
                    return record.status;
                }
            }
        }
        self.probe_fresh(endpoint).await.status
    }

    /// Probe the endpoint now, bypassing and refreshing the cache.
    pub async fn probe_fresh(&self, endpoint: &BackendEndpoint) -> HealthRecord {
        let record = self.run_probe(endpoint).await;

        metrics::PROBE_RESULTS
            .with_label_values(&[&endpoint.name, record.status.as_str()])
            .inc();

        match record.status {
            ProbeStatus::Ok => {
                debug!(backend = %endpoint.name, api_version = ?record.api_version, "Backend healthy");
            }
            ProbeStatus::AuthFailed => {
                let detail = record.detail.clone().unwrap_or_default();
                error!(
                    backend = %endpoint.name,
                    detail = %detail,
                    "Backend rejected credentials; check the configured username and password"
                );
                if let Some(ref audit) = self.audit {
                    audit
                        .emit(AuditEvent::BackendAuthFailure {
                            backend: endpoint.name.clone(),
                            detail,
                        })
                        .await;
                }
            }
            status => {
                warn!(backend = %endpoint.name, status = status.as_str(), detail = ?record.detail, "Backend unhealthy");
            }
        }

        self.cache
            .write()
            .await
            .insert(endpoint.name.clone(), (record.clone(), Instant::now()));
        record
    }

    async fn run_probe(&self, endpoint: &BackendEndpoint) -> HealthRecord {
        let login = tokio::time::timeout(self.call_timeout, endpoint.client.login()).await;
        match login {
            Err(_) => return HealthRecord::unhealthy(ProbeStatus::Timeout, "login timed out"),
            Ok(Err(e)) => return HealthRecord::unhealthy(login_status(&e), e.to_string()),
            Ok(Ok(())) => {}
        }

        let capability = tokio::time::timeout(self.call_timeout, endpoint.client.api_version()).await;
        match capability {
            Err(_) => HealthRecord::unhealthy(ProbeStatus::Timeout, "capability call timed out"),
            Ok(Err(e)) => HealthRecord::unhealthy(capability_status(&e), e.to_string()),
            Ok(Ok(version)) => HealthRecord::healthy(version),
        }
    }

    /// Forget the cached result so the next [`probe`](Self::probe) is fresh.
    pub async fn invalidate(&self, name: &str) {
        self.cache.write().await.remove(name);
    }

    /// Last recorded health per endpoint, regardless of age.
    pub async fn last_known(&self) -> HashMap<String, HealthRecord> {
        self.cache
            .read()
            .await
            .iter()
            .map(|(name, (record, _))| (name.clone(), record.clone()))
            .collect()
    }

    /// Fresh probe of every endpoint, concurrently.
    pub async fn probe_all(&self, endpoints: &[BackendEndpoint]) -> Vec<(String, HealthRecord)> {
        let records = join_all(endpoints.iter().map(|e| self.probe_fresh(e))).await;
        endpoints
            .iter()
            .map(|e| e.name.clone())
            .zip(records)
            .collect()
    }
}

/// A login that answers at all but fails is a credential problem.
fn login_status(error: &TorrentClientError) -> ProbeStatus {
    match error.kind() {
        FailureKind::Unreachable => ProbeStatus::Unreachable,
        FailureKind::Timeout => ProbeStatus::Timeout,
        _ => ProbeStatus::AuthFailed,
    }
}

/// After a successful login, only a rejected session counts as auth failure.
fn capability_status(error: &TorrentClientError) -> ProbeStatus {
    match error.kind() {
        FailureKind::AuthFailed => ProbeStatus::AuthFailed,
        FailureKind::Timeout => ProbeStatus::Timeout,
        _ => ProbeStatus::Unreachable,
    }
}
