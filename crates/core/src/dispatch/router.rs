//! Priority-ordered dispatch with fallback to the offline queue.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::dedup::FingerprintCache;
use super::types::ItemResult;
use super::{DispatchConfig, DispatchError, DispatchItem, DispatchOutcome, ItemPriority};
use crate::audit::{AuditEvent, AuditHandle};
use crate::governor::RatioMode;
use crate::health::{BackendEndpoint, BackendHealthProbe, VpnHealthChecker};
use crate::metrics;
use crate::queue::{Delivery, DrainReport, OfflineQueue, QueueReason, QueueRecord};
use crate::torrent_client::{AddTorrentRequest, AddTorrentResult, FailureKind, TorrentClientError};

type InFlight = HashMap<String, watch::Receiver<Option<ItemResult>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Routes items to backends in priority order.
///
/// For each backend: skip it when it needs the VPN and the VPN is down,
/// probe it, then try every item still unplaced. Backend-wide failures
/// (unreachable, timeout, auth) move the rest of the batch to the next
/// backend; an item-level rejection carries just that item forward. Items
/// no backend accepted are written to the offline queue.
pub struct DispatchRouter {
    endpoints: Vec<BackendEndpoint>,
    vpn: Option<Arc<dyn VpnHealthChecker>>,
    probe: Arc<BackendHealthProbe>,
    queue: Arc<OfflineQueue>,
    accepted: Mutex<FingerprintCache>,
    in_flight: Mutex<InFlight>,
    admission: Option<watch::Receiver<RatioMode>>,
    call_timeout: Duration,
    timeout_backoff: Duration,
    cancel: CancellationToken,
    audit: Option<AuditHandle>,
}

impl DispatchRouter {
    pub fn new(
        mut endpoints: Vec<BackendEndpoint>,
        probe: Arc<BackendHealthProbe>,
        queue: Arc<OfflineQueue>,
        config: &DispatchConfig,
    ) -> Self {
        crate::health::sort_by_priority(&mut endpoints);
        Self {
            endpoints,
            vpn: None,
            probe,
            queue,
            accepted: Mutex::new(FingerprintCache::new(config.dedup_ttl())),
            in_flight: Mutex::new(HashMap::new()),
            admission: None,
            call_timeout: config.call_timeout(),
            timeout_backoff: config.timeout_backoff(),
            cancel: CancellationToken::new(),
            audit: None,
        }
    }

    pub fn with_vpn(mut self, vpn: Arc<dyn VpnHealthChecker>) -> Self {
        self.vpn = Some(vpn);
        self
    }

    /// Follow the ratio governor's mode for admission decisions.
    pub fn with_admission(mut self, mode: watch::Receiver<RatioMode>) -> Self {
        self.admission = Some(mode);
        self
    }

    /// Stop signal checked between backends and between items.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_audit(mut self, audit: AuditHandle) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Endpoints in dispatch order.
    pub fn endpoints(&self) -> &[BackendEndpoint] {
        &self.endpoints
    }

    pub fn probe(&self) -> &Arc<BackendHealthProbe> {
        &self.probe
    }

    pub fn queue(&self) -> &Arc<OfflineQueue> {
        &self.queue
    }

    fn mode(&self) -> RatioMode {
        self.admission
            .as_ref()
            .map(|rx| *rx.borrow())
            .unwrap_or(RatioMode::Normal)
    }

    /// Submit a batch. Every item ends up either added or queued.
    ///
    /// Only a failure to write the offline queue is an error; backend
    /// failures are absorbed by fallback.
    pub async fn dispatch(&self, items: Vec<DispatchItem>) -> Result<DispatchOutcome, DispatchError> {
        let order: Vec<String> = items.iter().map(|i| i.fingerprint.clone()).collect();

        let mut seen = HashSet::new();
        let unique: Vec<DispatchItem> = items
            .into_iter()
            .filter(|i| seen.insert(i.fingerprint.clone()))
            .collect();

        let routed = self.route(unique).await;

        let mut to_queue = Vec::new();
        let mut results = HashMap::new();
        for (item, result) in routed {
            match &result {
                ItemResult::Queued { reason, error } => {
                    let mut record = QueueRecord::new(item.clone(), *reason);
                    record.last_error = error.clone();
                    to_queue.push(record);
                }
                ItemResult::Added { .. } => {
                    if self.queue.contains(&item.fingerprint).await {
                        self.queue.remove(&item.fingerprint).await?;
                    }
                }
            }
            results.insert(item.fingerprint, result);
        }

        for record in &to_queue {
            metrics::ITEMS_QUEUED
                .with_label_values(&[record.reason.as_str()])
                .inc();
            warn!(
                fingerprint = %record.fingerprint(),
                reason = %record.reason,
                error = ?record.last_error,
                attempts = record.item.attempts,
                "Item queued offline"
            );
            if let Some(ref audit) = self.audit {
                audit
                    .emit(AuditEvent::ItemQueued {
                        fingerprint: record.fingerprint().to_string(),
                        reason: record.reason.as_str().to_string(),
                        last_error: record.last_error.clone(),
                    })
                    .await;
            }
        }
        self.queue.append_all(to_queue).await?;

        let mut outcome = DispatchOutcome::default();
        for fingerprint in order {
            if let Some(result) = results.get(&fingerprint) {
                outcome.push(fingerprint, result.clone());
            }
        }
        Ok(outcome)
    }

    /// Replay the offline queue through the backends.
    ///
    /// Discretionary records stay in place while the ratio is in emergency.
    pub async fn drain_queue(&self) -> Result<DrainReport, DispatchError> {
        let report = self.queue.drain(|item| self.redeliver(item)).await?;
        if !report.delivered.is_empty() || report.retained > 0 {
            info!(
                delivered = report.delivered.len(),
                retained = report.retained,
                skipped = report.skipped,
                stale = report.stale,
                "Offline queue drained"
            );
        }
        Ok(report)
    }

    async fn redeliver(&self, item: DispatchItem) -> Delivery {
        if self.cancel.is_cancelled() {
            return Delivery::Skipped;
        }
        if item.priority == ItemPriority::Discretionary && self.mode() == RatioMode::Emergency {
            return Delivery::Skipped;
        }

        let first_seen = item.first_seen;
        let Some((item, result)) = self.route(vec![item]).await.pop() else {
            return Delivery::Skipped;
        };
        match result {
            ItemResult::Added { backend, .. } => {
                if let Some(ref audit) = self.audit {
                    audit
                        .emit(AuditEvent::ItemRedelivered {
                            fingerprint: item.fingerprint,
                            backend: backend.clone(),
                            pending_secs: (Utc::now() - first_seen).num_seconds(),
                        })
                        .await;
                }
                Delivery::Accepted { backend }
            }
            ItemResult::Queued {
                reason: QueueReason::DispatchCancelled,
                ..
            } => Delivery::Skipped,
            ItemResult::Queued { reason, error } => Delivery::Retained { reason, error },
        }
    }

    /// Resolve each unique item to a result, without touching the queue.
    ///
    /// Fingerprints accepted earlier resolve without a backend call; ones
    /// another caller is dispatching right now resolve to that caller's
    /// result.
    async fn route(&self, items: Vec<DispatchItem>) -> Vec<(DispatchItem, ItemResult)> {
        let mut results = Vec::with_capacity(items.len());
        let mut claims: HashMap<String, Claim<'_>> = HashMap::new();
        let mut waiting = Vec::new();
        let mut pending = Vec::new();

        {
            let mut in_flight = lock(&self.in_flight);
            let mut accepted = lock(&self.accepted);
            for item in items {
                if let Some(backend) = accepted.get(&item.fingerprint) {
                    metrics::ITEMS_DEDUPLICATED.inc();
                    debug!(fingerprint = %item.fingerprint, backend = %backend, "Already accepted, skipping add");
                    results.push((
                        item,
                        ItemResult::Added {
                            backend,
                            hash: None,
                            deduplicated: true,
                        },
                    ));
                } else if let Some(rx) = in_flight.get(&item.fingerprint) {
                    waiting.push((item, rx.clone()));
                } else {
                    let (tx, rx) = watch::channel(None);
                    in_flight.insert(item.fingerprint.clone(), rx);
                    claims.insert(
                        item.fingerprint.clone(),
                        Claim {
                            in_flight: &self.in_flight,
                            fingerprint: item.fingerprint.clone(),
                            tx,
                        },
                    );
                    pending.push(item);
                }
            }
        }

        for (item, result) in self.route_claimed(pending).await {
            if let Some(claim) = claims.remove(&item.fingerprint) {
                claim.finish(result.clone());
            }
            results.push((item, result));
        }
        drop(claims);

        for (item, mut rx) in waiting {
            debug!(fingerprint = %item.fingerprint, "Waiting for concurrent dispatch of the same item");
            let observed = match rx.wait_for(Option::is_some).await {
                Ok(result) => (*result).clone(),
                Err(_) => None,
            };
            let result = observed.unwrap_or(ItemResult::Queued {
                reason: QueueReason::DispatchCancelled,
                error: None,
            });
            results.push((item, result));
        }

        results
    }

    async fn route_claimed(&self, items: Vec<DispatchItem>) -> Vec<(DispatchItem, ItemResult)> {
        let mut results = Vec::with_capacity(items.len());

        let mut remaining = Vec::with_capacity(items.len());
        let emergency = self.mode() == RatioMode::Emergency;
        for item in items {
            if emergency && item.priority == ItemPriority::Discretionary {
                info!(fingerprint = %item.fingerprint, "Holding discretionary item during ratio emergency");
                results.push((
                    item,
                    ItemResult::Queued {
                        reason: QueueReason::RatioEmergency,
                        error: None,
                    },
                ));
            } else {
                remaining.push(item);
            }
        }

        let mut rejected: HashMap<String, String> = HashMap::new();
        let mut vpn_up: Option<bool> = None;
        let mut cancelled = false;

        for endpoint in &self.endpoints {
            if remaining.is_empty() {
                break;
            }
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            if endpoint.requires_vpn {
                let up = match vpn_up {
                    Some(up) => up,
                    None => {
                        let up = match self.vpn {
                            Some(ref vpn) => vpn.is_up().await,
                            None => false,
                        };
                        vpn_up = Some(up);
                        up
                    }
                };
                if !up {
                    info!(backend = %endpoint.name, "VPN is down, skipping backend");
                    continue;
                }
            }

            let status = self.probe.probe(endpoint).await;
            if !status.is_healthy() {
                warn!(
                    backend = %endpoint.name,
                    status = status.as_str(),
                    items = remaining.len(),
                    "Backend unhealthy, trying next"
                );
                continue;
            }

            let mut carried = Vec::new();
            let mut batch = remaining.into_iter();
            while let Some(mut item) = batch.next() {
                if self.cancel.is_cancelled() {
                    cancelled = true;
                    carried.push(item);
                    carried.extend(batch.by_ref());
                    break;
                }

                item.attempts += 1;
                match self.add_with_retry(endpoint, &item).await {
                    Ok(added) => {
                        lock(&self.accepted).insert(item.fingerprint.clone(), endpoint.name.clone());
                        self.record_added(endpoint, &item).await;
                        results.push((
                            item,
                            ItemResult::Added {
                                backend: endpoint.name.clone(),
                                hash: added.hash,
                                deduplicated: false,
                            },
                        ));
                    }
                    Err(e) => {
                        let kind = e.kind();
                        if kind.is_backend_wide() {
                            carried.push(item);
                            carried.extend(batch.by_ref());
                            self.record_fallback(endpoint, &e, carried.len()).await;
                            break;
                        }
                        debug!(
                            fingerprint = %item.fingerprint,
                            backend = %endpoint.name,
                            failure = kind.as_str(),
                            error = %e,
                            "Backend rejected item, trying next backend"
                        );
                        rejected.insert(item.fingerprint.clone(), e.to_string());
                        carried.push(item);
                    }
                }
            }
            remaining = carried;
        }

        for item in remaining {
            let (reason, error) = if cancelled {
                (QueueReason::DispatchCancelled, None)
            } else if let Some(error) = rejected.remove(&item.fingerprint) {
                (QueueReason::AllBackendsRejected, Some(error))
            } else {
                (QueueReason::AllBackendsUnavailable, None)
            };
            results.push((item, ItemResult::Queued { reason, error }));
        }

        results
    }

    /// One add call; a timeout is retried once after the backoff.
    async fn add_with_retry(
        &self,
        endpoint: &BackendEndpoint,
        item: &DispatchItem,
    ) -> Result<AddTorrentResult, TorrentClientError> {
        match self.add_once(endpoint, item).await {
            Err(e) if e.kind() == FailureKind::Timeout => {
                warn!(
                    fingerprint = %item.fingerprint,
                    backend = %endpoint.name,
                    backoff_ms = self.timeout_backoff.as_millis() as u64,
                    "Add timed out, retrying once"
                );
                tokio::select! {
                    _ = self.cancel.cancelled() => Err(e),
                    _ = tokio::time::sleep(self.timeout_backoff) => {
                        self.add_once(endpoint, item).await
                    }
                }
            }
            other => other,
        }
    }

    async fn add_once(
        &self,
        endpoint: &BackendEndpoint,
        item: &DispatchItem,
    ) -> Result<AddTorrentResult, TorrentClientError> {
        let mut request = AddTorrentRequest::new(item.payload.clone());
        if let Some(category) = item.category.as_ref().or(endpoint.category.as_ref()) {
            request = request.with_category(category.clone());
        }

        let started = Instant::now();
        let result = match tokio::time::timeout(self.call_timeout, endpoint.client.add_torrent(request)).await {
            Ok(result) => result,
            Err(_) => Err(TorrentClientError::Timeout),
        };

        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.kind().as_str(),
        };
        metrics::BACKEND_CALL_DURATION
            .with_label_values(&[&endpoint.name, "add"])
            .observe(started.elapsed().as_secs_f64());
        metrics::BACKEND_CALLS
            .with_label_values(&[&endpoint.name, "add", outcome])
            .inc();
        result
    }

    async fn record_added(&self, endpoint: &BackendEndpoint, item: &DispatchItem) {
        metrics::ITEMS_DISPATCHED
            .with_label_values(&[&endpoint.name])
            .inc();
        info!(
            fingerprint = %item.fingerprint,
            backend = %endpoint.name,
            attempts = item.attempts,
            "Item added"
        );
        if let Some(ref audit) = self.audit {
            audit
                .emit(AuditEvent::ItemDispatched {
                    fingerprint: item.fingerprint.clone(),
                    backend: endpoint.name.clone(),
                    attempts: item.attempts,
                })
                .await;
        }
    }

    async fn record_fallback(&self, endpoint: &BackendEndpoint, error: &TorrentClientError, carried: usize) {
        let kind = error.kind();
        metrics::BACKEND_FALLBACKS
            .with_label_values(&[&endpoint.name, kind.as_str()])
            .inc();

        if kind == FailureKind::AuthFailed {
            error!(
                backend = %endpoint.name,
                error = %error,
                "Backend rejected credentials during dispatch; not retrying it this cycle"
            );
            self.probe.invalidate(&endpoint.name).await;
            if let Some(ref audit) = self.audit {
                audit
                    .emit(AuditEvent::BackendAuthFailure {
                        backend: endpoint.name.clone(),
                        detail: error.to_string(),
                    })
                    .await;
            }
        } else {
            warn!(
                backend = %endpoint.name,
                failure = kind.as_str(),
                error = %error,
                items_carried = carried,
                "Backend failed, falling back"
            );
            self.probe.invalidate(&endpoint.name).await;
        }

        if let Some(ref audit) = self.audit {
            audit
                .emit(AuditEvent::BackendFallback {
                    backend: endpoint.name.clone(),
                    failure: kind.as_str().to_string(),
                    detail: error.to_string(),
                    items_carried: carried,
                })
                .await;
        }
    }
}

/// Exclusive claim on a fingerprint while this caller dispatches it.
/// Dropping the claim releases it; waiters then see the published result,
/// or none if the claim was abandoned.
struct Claim<'a> {
    in_flight: &'a Mutex<InFlight>,
    fingerprint: String,
    tx: watch::Sender<Option<ItemResult>>,
}

impl Claim<'_> {
    fn finish(self, result: ItemResult) {
        self.tx.send_replace(Some(result));
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        lock(self.in_flight).remove(&self.fingerprint);
    }
}
