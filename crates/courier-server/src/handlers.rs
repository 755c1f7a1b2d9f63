//! HTTP handlers.

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use courier_engine::{HubSnapshot, SendReceipt};
use courier_telemetry::{Diagnostic, DiagnosticsQuery};

use crate::error::ServerError;
use crate::server::AppState;

/// Body of `POST /send-message`. Accepts the legacy `number` / `message`
/// field names as well.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SendMessageRequest {
    #[serde(alias = "number")]
    pub recipient_address: String,
    #[serde(alias = "message")]
    pub body: String,
}

pub async fn send_message(
    State(state): State<AppState>,
    Json(request): Json<SendMessageRequest>,
) -> Result<Json<SendReceipt>, ServerError> {
    let receipt = state
        .dispatcher
        .send(&request.recipient_address, &request.body)
        .await?;
    Ok(Json(receipt))
}

pub async fn status(State(state): State<AppState>) -> Json<HubSnapshot> {
    Json(state.hub.snapshot().await)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: &'static str,
    pub session_state: String,
    pub ready: bool,
    pub observers: usize,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    Json(HealthReport {
        status: "ok",
        session_state: state.controller.state().to_string(),
        ready: state.controller.is_ready(),
        observers: state.hub.observer_count().await,
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct DiagnosticsParams {
    pub level: Option<String>,
    pub generation: Option<i64>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct DiagnosticsReport {
    pub entries: Vec<Diagnostic>,
}

/// Recent persisted warn+ events, newest first.
pub async fn diagnostics(
    State(state): State<AppState>,
    Query(params): Query<DiagnosticsParams>,
) -> Result<Json<DiagnosticsReport>, ServerError> {
    let sink = state
        .telemetry
        .diagnostics()
        .ok_or_else(|| ServerError::Unavailable("diagnostics persistence is disabled".into()))?;

    let query = DiagnosticsQuery {
        level: params.level,
        generation: params.generation,
        limit: Some(params.limit.unwrap_or(100).min(1_000)),
    };
    let entries = sink
        .query(&query)
        .map_err(|e| ServerError::Internal(format!("diagnostics query failed: {e}")))?;
    Ok(Json(DiagnosticsReport { entries }))
}
