//! Settings types. Every struct deserializes with `default`, so a partial
//! settings file only needs the keys it changes.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CourierSettings {
    pub server: ServerSettings,
    pub session: SessionSettings,
    pub store: StoreSettings,
    pub logging: LoggingSettings,
    pub loopback: LoopbackSettings,
}

impl CourierSettings {
    /// Resolve a configured path: absolute paths are kept, relative ones are
    /// placed under `courier_home`.
    pub fn resolve_path(courier_home: &Path, configured: &str) -> PathBuf {
        let path = Path::new(configured);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            courier_home.join(path)
        }
    }
}

/// HTTP / WebSocket listener settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port. `0` picks a free port.
    pub port: u16,
    /// WebSocket ping interval in seconds.
    pub heartbeat_interval_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            heartbeat_interval_secs: 30,
        }
    }
}

/// Session controller and dispatch settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Delay before re-creating the session after an unexpected disconnect.
    pub reconnect_delay_ms: u64,
    /// Upper bound on a single transport teardown.
    pub teardown_timeout_ms: u64,
    /// Upper bound on a single transport send.
    pub send_timeout_ms: u64,
    /// Domain suffix appended to raw phone numbers.
    pub address_suffix: String,
    /// Number of audit rows replayed to a newly connected observer.
    pub history_replay_limit: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: 4_000,
            teardown_timeout_ms: 10_000,
            send_timeout_ms: 60_000,
            address_suffix: "@c.us".to_string(),
            history_replay_limit: 50,
        }
    }
}

/// Audit store settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreSettings {
    /// Audit database path (relative to `~/.courier`).
    pub database_path: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            database_path: "database/audit.db".to_string(),
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level; `RUST_LOG` takes precedence.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
    /// Persist warn+ events to a local diagnostics database.
    pub persist_warnings: bool,
    /// Diagnostics database path (relative to `~/.courier`).
    pub diagnostics_path: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            persist_warnings: true,
            diagnostics_path: "database/diagnostics.db".to_string(),
        }
    }
}

/// Settings for the in-process development transport.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoopbackSettings {
    /// Time between issuing the pairing challenge and reporting ready.
    pub pairing_delay_ms: u64,
    pub address: String,
    pub display_name: String,
    pub platform: String,
}

impl Default for LoopbackSettings {
    fn default() -> Self {
        Self {
            pairing_delay_ms: 5_000,
            address: "6281200000000".to_string(),
            display_name: "Courier Loopback".to_string(),
            platform: "loopback".to_string(),
        }
    }
}
