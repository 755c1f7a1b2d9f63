use std::time::Duration;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use courier_engine::{MessageDispatcher, SessionController, StatusHub};
use courier_telemetry::TelemetryGuard;

use crate::client;
use crate::handlers;

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub heartbeat_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub controller: SessionController,
    pub hub: StatusHub,
    pub dispatcher: MessageDispatcher,
    pub telemetry: TelemetryGuard,
    pub heartbeat_interval: Duration,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/send-message", post(handlers::send_message))
        .route("/ws", get(ws_handler))
        .route("/status", get(handlers::status))
        .route("/health", get(handlers::health))
        .route("/diagnostics", get(handlers::diagnostics))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind the listener and start serving. Returns a handle to shut it down.
pub async fn start(config: ServerConfig, state: AppState) -> Result<ServerHandle, std::io::Error> {
    let router = build_router(state);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(host = %config.host, port = local_addr.port(), "courier server started");

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(async move { signal.cancelled().await })
            .await
        {
            tracing::error!(error = %e, "server terminated");
        }
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        shutdown,
        server,
    })
}

/// Handle returned by `start()`.
pub struct ServerHandle {
    pub port: u16,
    shutdown: CancellationToken,
    server: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    /// Stop accepting connections and wait for in-flight requests.
    ///
    /// Open observer sockets are not drained; callers bound the wait.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.server.await {
            tracing::warn!(error = %e, "server task ended abnormally");
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let observer = state.hub.connect().await;
    tracing::info!(observer_id = %observer.id, "observer connected");

    client::handle_observer_connection(
        socket,
        observer,
        state.hub,
        state.controller,
        state.heartbeat_interval,
    )
    .await;
}
