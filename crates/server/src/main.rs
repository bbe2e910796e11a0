use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use seedwarden_core::{
    create_audit_system, load_config, validate_config, AuditEvent, AuditStore, BackendEndpoint,
    SqliteAuditStore, TcpVpnChecker, VpnHealthChecker,
};
use seedwarden_server::{api::create_router, state::AppState};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Buffer size for audit event channel
const AUDIT_BUFFER_SIZE: usize = 1000;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::var("SEEDWARDEN_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    validate_config(&config).context("Configuration validation failed")?;

    info!(
        backends = config.backends.len(),
        vpn = config.vpn.is_some(),
        "Configuration loaded successfully"
    );
    info!("Database path: {:?}", config.database.path);

    // Config hash for the audit trail
    let config_json = serde_json::to_string(&config).context("Failed to serialize config")?;
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));

    let audit_store: Arc<dyn AuditStore> = Arc::new(
        SqliteAuditStore::new(&config.database.path).context("Failed to create audit store")?,
    );
    info!("Audit store initialized");

    let (audit_handle, audit_writer) =
        create_audit_system(Arc::clone(&audit_store), AUDIT_BUFFER_SIZE);
    let writer_handle = tokio::spawn(audit_writer.run());

    audit_handle
        .emit(AuditEvent::ServiceStarted {
            version: VERSION.to_string(),
            config_hash: config_hash[..16].to_string(),
        })
        .await;

    let mut endpoints = Vec::with_capacity(config.backends.len());
    for backend in &config.backends {
        let endpoint = BackendEndpoint::from_config(backend)
            .with_context(|| format!("Failed to create client for backend '{}'", backend.name))?;
        info!(
            backend = %endpoint.name,
            url = %endpoint.url,
            priority = endpoint.priority,
            requires_vpn = endpoint.requires_vpn,
            "Backend configured"
        );
        endpoints.push(endpoint);
    }

    let vpn: Option<Arc<dyn VpnHealthChecker>> = match config.vpn {
        Some(ref vpn) => {
            info!(gateway = %vpn.gateway, "VPN gateway check enabled");
            Some(Arc::new(TcpVpnChecker::from_config(vpn)))
        }
        None => None,
    };

    let state = Arc::new(
        AppState::build(
            config.clone(),
            endpoints,
            vpn,
            audit_handle.clone(),
            audit_store,
        )
        .await?,
    );

    let supervisor = Arc::clone(state.supervisor());
    supervisor.start().await;

    let app = create_router(Arc::clone(&state));

    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    info!("Stopping supervisor...");
    supervisor.stop().await;
    let status = supervisor.status();
    info!(cycles = status.cycles, "Supervisor stopped");

    info!("Server shutting down...");
    audit_handle
        .emit(AuditEvent::ServiceStopped {
            reason: match served {
                Ok(()) => "graceful_shutdown".to_string(),
                Err(ref e) => format!("server_error: {}", e),
            },
        })
        .await;

    // Every component holds an AuditHandle clone; the writer only finishes
    // once all of them are gone.
    drop(supervisor);
    drop(state);
    drop(audit_handle);

    if let Err(e) = writer_handle.await {
        warn!(error = %e, "Audit writer task failed");
    }
    info!("Audit writer stopped");

    served.context("Server error")
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
