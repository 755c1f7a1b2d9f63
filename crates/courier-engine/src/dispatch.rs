//! Send pipeline: validate, gate on readiness, transmit, and always audit.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, instrument, warn};

use courier_core::address::{normalize_address, DEFAULT_ADDRESS_SUFFIX};
use courier_core::{
    AuditLog, DispatchError, MessageLogEntry, NewLogEntry, SendFailure, SendOutcome,
};

use crate::controller::SessionGate;
use crate::hub::StatusHub;

const SENT_MESSAGE: &str = "message sent";

#[derive(Clone, Debug)]
pub struct DispatchConfig {
    /// Upper bound on a single transport send.
    pub send_timeout: Duration,
    /// Domain suffix appended to bare phone numbers.
    pub address_suffix: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            send_timeout: Duration::from_secs(60),
            address_suffix: DEFAULT_ADDRESS_SUFFIX.to_string(),
        }
    }
}

/// Result handed back to the caller of [`MessageDispatcher::send`].
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendReceipt {
    pub failed: bool,
    pub outcome: SendOutcome,
    pub display_message: String,
    /// The audit row written for this attempt.
    #[serde(skip)]
    pub entry: MessageLogEntry,
}

impl SendReceipt {
    fn from_entry(entry: MessageLogEntry) -> Self {
        let display_message = match entry.outcome {
            SendOutcome::Sent => SENT_MESSAGE.to_string(),
            SendOutcome::Failed => entry.failure_reason.clone().unwrap_or_default(),
        };
        Self {
            failed: entry.outcome == SendOutcome::Failed,
            outcome: entry.outcome,
            display_message,
            entry,
        }
    }
}

#[derive(Clone)]
pub struct MessageDispatcher {
    gate: Arc<dyn SessionGate>,
    audit: Arc<dyn AuditLog>,
    hub: StatusHub,
    config: DispatchConfig,
}

impl MessageDispatcher {
    pub fn new(
        gate: Arc<dyn SessionGate>,
        audit: Arc<dyn AuditLog>,
        hub: StatusHub,
        config: DispatchConfig,
    ) -> Self {
        Self {
            gate,
            audit,
            hub,
            config,
        }
    }

    /// Attempt one send. Every request that passes validation produces
    /// exactly one audit row, whether or not the transport accepted it.
    #[instrument(skip_all, fields(recipient = %recipient_address))]
    pub async fn send(
        &self,
        recipient_address: &str,
        body: &str,
    ) -> Result<SendReceipt, DispatchError> {
        if recipient_address.is_empty() {
            return Err(DispatchError::Validation(
                "recipient address is required".into(),
            ));
        }
        if body.is_empty() {
            return Err(DispatchError::Validation("message body is required".into()));
        }

        let address = normalize_address(recipient_address, &self.config.address_suffix);
        let new_entry = match self.transmit(&address, body).await {
            Ok(()) => NewLogEntry::sent(recipient_address, body),
            Err(failure) => {
                warn!(address = %address, kind = failure.error_kind(), reason = %failure, "send failed");
                NewLogEntry::failed(recipient_address, body, &failure)
            }
        };

        let entry = self.audit.insert(new_entry).await.map_err(|e| {
            error!(address = %address, error = %e, "failed to record send attempt");
            DispatchError::from(e)
        })?;
        info!(log_id = entry.id, outcome = %entry.outcome, "send attempt recorded");

        self.hub.publish_log_entry(&entry).await;
        Ok(SendReceipt::from_entry(entry))
    }

    async fn transmit(&self, address: &str, body: &str) -> Result<(), SendFailure> {
        let transport = self.gate.ready_transport().ok_or(SendFailure::NotReady)?;
        match tokio::time::timeout(self.config.send_timeout, transport.send_message(address, body))
            .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(SendFailure::Transmission(e.to_string())),
            Err(_) => Err(SendFailure::TimedOut(self.config.send_timeout)),
        }
    }
}
