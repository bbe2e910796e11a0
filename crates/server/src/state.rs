use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;

use seedwarden_core::{
    AuditHandle, AuditStore, BackendEndpoint, BackendHealthProbe, CompletionEventManager, Config,
    DispatchRouter, MonitorCycle, OfflineQueue, RatioGovernor, SanitizedConfig, Supervisor,
    TorrentControlManager, TorrentStateManager, VpnHealthChecker,
};

/// Shared application state
pub struct AppState {
    config: Config,
    audit_store: Arc<dyn AuditStore>,
    router: Arc<DispatchRouter>,
    monitor: Arc<TorrentStateManager>,
    governor: Arc<RatioGovernor>,
    completion: Arc<CompletionEventManager>,
    supervisor: Arc<Supervisor>,
}

impl AppState {
    /// Wire every component from configuration.
    ///
    /// `endpoints` are the backend endpoints (real clients in production,
    /// mocks in tests). All components share one cancellation token, owned
    /// by the supervisor.
    pub async fn build(
        config: Config,
        endpoints: Vec<BackendEndpoint>,
        vpn: Option<Arc<dyn VpnHealthChecker>>,
        audit: AuditHandle,
        audit_store: Arc<dyn AuditStore>,
    ) -> Result<Self> {
        let cancel = CancellationToken::new();

        let supervised = select_monitored(&config, &endpoints)?;
        info!(backend = %supervised.name, "Supervising backend transfers");

        let monitor = Arc::new(TorrentStateManager::new(
            supervised.client.clone(),
            &config.monitor,
        ));
        let control = Arc::new(
            TorrentControlManager::new(monitor.clone(), &config.monitor)
                .with_cancellation(cancel.clone())
                .with_audit(audit.clone()),
        );
        let governor = Arc::new(
            RatioGovernor::new(config.governor.clone(), monitor.clone(), control.clone())
                .with_audit(audit.clone()),
        );
        let completion = Arc::new(
            CompletionEventManager::new(monitor.clone(), &config.monitor)
                .with_audit(audit.clone()),
        );

        let queue = Arc::new(
            OfflineQueue::from_config(&config.queue)
                .await
                .with_context(|| format!("Failed to open offline queue {:?}", config.queue.path))?,
        );
        info!(path = ?config.queue.path, records = queue.len().await, "Offline queue loaded");

        let probe = Arc::new(
            BackendHealthProbe::new(config.dispatch.health_ttl(), config.dispatch.call_timeout())
                .with_audit(audit.clone()),
        );
        let mut router = DispatchRouter::new(endpoints, probe, queue, &config.dispatch)
            .with_admission(governor.subscribe())
            .with_cancellation(cancel.clone())
            .with_audit(audit);
        if let Some(vpn) = vpn {
            router = router.with_vpn(vpn);
        }
        let router = Arc::new(router);

        let supervisor = Arc::new(
            Supervisor::new(
                MonitorCycle {
                    state: monitor.clone(),
                    control,
                    governor: governor.clone(),
                    completion: completion.clone(),
                },
                router.clone(),
                &config.monitor,
                &config.queue,
            )
            .with_cancellation(cancel),
        );

        Ok(Self {
            config,
            audit_store,
            router,
            monitor,
            governor,
            completion,
            supervisor,
        })
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn audit_store(&self) -> &dyn AuditStore {
        self.audit_store.as_ref()
    }

    pub fn router(&self) -> &Arc<DispatchRouter> {
        &self.router
    }

    pub fn monitor(&self) -> &Arc<TorrentStateManager> {
        &self.monitor
    }

    pub fn governor(&self) -> &Arc<RatioGovernor> {
        &self.governor
    }

    pub fn completion(&self) -> &Arc<CompletionEventManager> {
        &self.completion
    }

    pub fn supervisor(&self) -> &Arc<Supervisor> {
        &self.supervisor
    }
}

/// The configured monitor backend, or the highest-priority one.
fn select_monitored<'a>(
    config: &Config,
    endpoints: &'a [BackendEndpoint],
) -> Result<&'a BackendEndpoint> {
    match config.monitor.backend {
        Some(ref name) => endpoints
            .iter()
            .find(|e| &e.name == name)
            .ok_or_else(|| anyhow!("monitor.backend '{}' is not a configured backend", name)),
        None => endpoints
            .iter()
            .min_by_key(|e| e.priority)
            .ok_or_else(|| anyhow!("no backends configured")),
    }
}
