mod diagnostics;

pub use diagnostics::{Diagnostic, DiagnosticsLayer, DiagnosticsQuery, DiagnosticsSink};

use std::path::PathBuf;
use std::sync::Arc;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default filter directive. Overridden by RUST_LOG env var.
    pub log_level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
    /// Whether to persist warn+ events to SQLite.
    pub persist_warnings: bool,
    /// Path to the diagnostics database.
    pub diagnostics_path: PathBuf,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
            persist_warnings: true,
            diagnostics_path: std::env::temp_dir().join("courier-diagnostics.db"),
        }
    }
}

/// Handle to the installed telemetry. Keeps the diagnostics sink queryable.
#[derive(Clone, Default)]
pub struct TelemetryGuard {
    diagnostics: Option<Arc<DiagnosticsSink>>,
}

impl TelemetryGuard {
    /// A guard with no persisted diagnostics (tests, or persistence disabled).
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn with_sink(sink: Arc<DiagnosticsSink>) -> Self {
        Self {
            diagnostics: Some(sink),
        }
    }

    /// Access the sink for querying persisted warn+ events.
    pub fn diagnostics(&self) -> Option<&DiagnosticsSink> {
        self.diagnostics.as_deref()
    }
}

/// Initialize logging. Call once at startup.
pub fn init_telemetry(config: &TelemetryConfig) -> TelemetryGuard {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let json_layer = config.json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
    });
    let text_layer = (!config.json).then(|| tracing_subscriber::fmt::layer().with_target(true));

    let sink = if config.persist_warnings {
        match DiagnosticsSink::new(&config.diagnostics_path) {
            Ok(sink) => Some(Arc::new(sink)),
            Err(e) => {
                eprintln!("courier-telemetry: failed to open diagnostics DB: {e}");
                None
            }
        }
    } else {
        None
    };
    let diagnostics_layer = sink.clone().map(DiagnosticsLayer::new);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(diagnostics_layer)
        .init();

    TelemetryGuard { diagnostics: sink }
}
