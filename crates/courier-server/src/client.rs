//! Observer WebSocket connections.
//!
//! Each socket is split into a writer that forwards hub events (plus
//! heartbeat pings) and a reader that turns inbound JSON into operator
//! requests for the session controller.

use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::{SinkExt, StreamExt};

use courier_core::{HubEvent, ObserverRequest};
use courier_engine::{Observer, SessionController, StatusHub};

/// Shortest ping period; `tokio::time::interval` rejects a zero period.
const MIN_HEARTBEAT: Duration = Duration::from_millis(100);

/// Serialize a hub event to its wire form.
pub fn encode_event(event: &HubEvent) -> Option<String> {
    match serde_json::to_string(event) {
        Ok(json) => Some(json),
        Err(e) => {
            tracing::warn!(event = event.event_type(), error = %e, "failed to encode hub event");
            None
        }
    }
}

/// Parse an inbound observer message. Unknown or malformed input yields `None`.
pub fn decode_request(raw: &str) -> Option<ObserverRequest> {
    serde_json::from_str(raw).ok()
}

async fn apply_request(controller: &SessionController, request: ObserverRequest) {
    let result = match request {
        ObserverRequest::RequestDisconnect => controller.request_disconnect().await,
        ObserverRequest::RequestReconnect => controller.request_reconnect().await,
    };
    match result {
        Ok(applied) => tracing::info!(?request, applied, "observer request handled"),
        Err(e) => tracing::warn!(?request, error = %e, "observer request dropped"),
    }
}

/// Drive one observer connection until either side closes.
pub async fn handle_observer_connection(
    socket: WebSocket,
    observer: Observer,
    hub: StatusHub,
    controller: SessionController,
    heartbeat: Duration,
) {
    let Observer { id, mut events } = observer;
    let (mut ws_tx, mut ws_rx) = socket.split();

    let writer_id = id.clone();
    let writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(heartbeat.max(MIN_HEARTBEAT));
        ping_interval.tick().await; // consume first immediate tick

        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    let Some(text) = encode_event(&event) else { continue };
                    if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = ping_interval.tick() => {
                    if ws_tx.send(WsMessage::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                    tracing::trace!(observer_id = %writer_id, "sent ping");
                }
            }
        }
    });

    let reader_id = id.clone();
    let reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                WsMessage::Text(text) => match decode_request(text.as_str()) {
                    Some(request) => apply_request(&controller, request).await,
                    None => {
                        tracing::debug!(observer_id = %reader_id, "ignoring unrecognized observer message");
                    }
                },
                WsMessage::Close(_) => break,
                _ => {}
            }
        }
    });

    let writer_abort = writer.abort_handle();
    let reader_abort = reader.abort_handle();
    tokio::select! {
        _ = writer => reader_abort.abort(),
        _ = reader => writer_abort.abort(),
    }

    let _ = hub.disconnect(&id).await;
    tracing::info!(observer_id = %id, "observer disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::{SessionState, SessionStatus};

    #[test]
    fn decodes_operator_requests() {
        assert_eq!(
            decode_request(r#"{"type":"requestDisconnect"}"#),
            Some(ObserverRequest::RequestDisconnect)
        );
        assert_eq!(
            decode_request(r#"{"type":"requestReconnect"}"#),
            Some(ObserverRequest::RequestReconnect)
        );
    }

    #[test]
    fn rejects_unknown_messages() {
        assert_eq!(decode_request(r#"{"type":"sendMessage"}"#), None);
        assert_eq!(decode_request("ping"), None);
    }

    #[test]
    fn encodes_status_event() {
        let json = encode_event(&HubEvent::Status(SessionStatus::new(
            SessionState::AwaitingScan,
            false,
        )))
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "status");
        assert_eq!(value["state"], "AWAITING_SCAN");
        assert_eq!(value["ready"], false);
    }
}
