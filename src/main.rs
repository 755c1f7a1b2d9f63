//! # courier
//!
//! Courier server binary: loads settings, wires the session controller,
//! status hub and dispatch pipeline to the audit store, and serves the
//! HTTP/WebSocket adapter.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use courier_core::{AuditLog, TransportIdentity};
use courier_engine::{
    ControllerConfig, DispatchConfig, LoopbackConfig, LoopbackFactory, MessageDispatcher,
    SessionController, StatusHub,
};
use courier_server::{AppState, ServerConfig};
use courier_settings::{CourierSettings, LoopbackSettings};
use courier_store::{Database, MessageLogRepo};
use courier_telemetry::TelemetryConfig;

/// Upper bound on graceful shutdown before the process exits anyway.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Courier messaging session server.
#[derive(Parser, Debug)]
#[command(name = "courier", about = "Courier messaging session server")]
struct Cli {
    /// Settings file (defaults to `~/.courier/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Port to bind (0 for auto-assign). Overrides settings.
    #[arg(long)]
    port: Option<u16>,

    /// Audit database path. Overrides settings.
    #[arg(long)]
    db: Option<PathBuf>,
}

fn loopback_config(settings: &LoopbackSettings) -> LoopbackConfig {
    LoopbackConfig {
        pairing_delay: Duration::from_millis(settings.pairing_delay_ms),
        identity: TransportIdentity {
            address: Some(settings.address.clone()),
            display_name: Some(settings.display_name.clone()),
            platform: Some(settings.platform.clone()),
        },
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    // Settings come first: they carry the log level and diagnostics path.
    let settings_path = args.settings.clone().unwrap_or_else(courier_settings::settings_path);
    let settings = courier_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;
    let home = courier_settings::courier_home();

    let telemetry = courier_telemetry::init_telemetry(&TelemetryConfig {
        log_level: settings.logging.level.clone(),
        json: settings.logging.json,
        persist_warnings: settings.logging.persist_warnings,
        diagnostics_path: CourierSettings::resolve_path(&home, &settings.logging.diagnostics_path),
    });
    tracing::info!(settings = %settings_path.display(), "starting courier");

    let db_path = args
        .db
        .unwrap_or_else(|| CourierSettings::resolve_path(&home, &settings.store.database_path));
    let db = Database::open(&db_path).context("Failed to open audit database")?;
    let audit: Arc<dyn AuditLog> = Arc::new(MessageLogRepo::new(db));

    let session = &settings.session;
    let hub = StatusHub::with_replay_limit(Arc::clone(&audit), session.history_replay_limit);
    let controller = SessionController::spawn(
        Arc::new(LoopbackFactory::new(loopback_config(&settings.loopback))),
        hub.clone(),
        ControllerConfig {
            reconnect_delay: Duration::from_millis(session.reconnect_delay_ms),
            teardown_timeout: Duration::from_millis(session.teardown_timeout_ms),
        },
    );
    let dispatcher = MessageDispatcher::new(
        Arc::new(controller.clone()),
        audit,
        hub.clone(),
        DispatchConfig {
            send_timeout: Duration::from_millis(session.send_timeout_ms),
            address_suffix: session.address_suffix.clone(),
        },
    );
    controller.start().context("Session controller failed to start")?;

    let server_config = ServerConfig {
        host: settings.server.host.clone(),
        port: args.port.unwrap_or(settings.server.port),
        heartbeat_interval: Duration::from_secs(settings.server.heartbeat_interval_secs),
    };
    let state = AppState {
        controller: controller.clone(),
        hub,
        dispatcher,
        telemetry,
        heartbeat_interval: server_config.heartbeat_interval,
    };
    let server = courier_server::start(server_config, state)
        .await
        .context("Failed to start server")?;
    tracing::info!(port = server.port, "courier ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl+c")?;
    tracing::info!("shutting down");

    let graceful = async {
        if let Err(e) = controller.shutdown().await {
            tracing::warn!(error = %e, "session controller already stopped");
        }
        server.shutdown().await;
    };
    if tokio::time::timeout(SHUTDOWN_GRACE, graceful).await.is_err() {
        tracing::warn!(grace_secs = SHUTDOWN_GRACE.as_secs(), "shutdown timed out");
    }
    Ok(())
}
