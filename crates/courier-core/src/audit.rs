use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::{AuditError, SendFailure};

/// Final outcome of one send attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SendOutcome {
    Sent,
    Failed,
}

impl SendOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "SENT",
            Self::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for SendOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SendOutcome {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SENT" => Ok(Self::Sent),
            "FAILED" => Ok(Self::Failed),
            other => Err(format!("unknown send outcome: {other}")),
        }
    }
}

/// A row about to be appended. `failure_reason` is set iff the attempt failed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewLogEntry {
    pub recipient_address: String,
    pub body: String,
    pub outcome: SendOutcome,
    pub failure_reason: Option<String>,
}

impl NewLogEntry {
    pub fn sent(recipient_address: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            recipient_address: recipient_address.into(),
            body: body.into(),
            outcome: SendOutcome::Sent,
            failure_reason: None,
        }
    }

    pub fn failed(
        recipient_address: impl Into<String>,
        body: impl Into<String>,
        failure: &SendFailure,
    ) -> Self {
        Self {
            recipient_address: recipient_address.into(),
            body: body.into(),
            outcome: SendOutcome::Failed,
            failure_reason: Some(failure.to_string()),
        }
    }
}

/// An immutable audit record of one send attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageLogEntry {
    pub id: i64,
    pub recipient_address: String,
    pub body: String,
    pub outcome: SendOutcome,
    pub failure_reason: Option<String>,
    pub created_at: String,
}

/// Append-only audit store for send attempts.
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Append a row. The store assigns `id` and `created_at`.
    async fn insert(&self, entry: NewLogEntry) -> Result<MessageLogEntry, AuditError>;

    /// The `limit` most recent rows, most-recent-first by store id.
    async fn recent(&self, limit: usize) -> Result<Vec<MessageLogEntry>, AuditError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_wire_names() {
        assert_eq!(serde_json::to_string(&SendOutcome::Sent).unwrap(), "\"SENT\"");
        assert_eq!("FAILED".parse::<SendOutcome>().unwrap(), SendOutcome::Failed);
        assert!("failed".parse::<SendOutcome>().is_err());
    }

    #[test]
    fn failed_entry_carries_reason() {
        let entry = NewLogEntry::failed("0812", "hi", &SendFailure::NotReady);
        assert_eq!(entry.outcome, SendOutcome::Failed);
        assert_eq!(
            entry.failure_reason.as_deref(),
            Some("session not ready / reconnecting")
        );
        let sent = NewLogEntry::sent("0812", "hi");
        assert!(sent.failure_reason.is_none());
    }

    #[test]
    fn entry_serializes_camel_case() {
        let entry = MessageLogEntry {
            id: 3,
            recipient_address: "0812".into(),
            body: "hi".into(),
            outcome: SendOutcome::Sent,
            failure_reason: None,
            created_at: "2026-01-01T00:00:00+00:00".into(),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["recipientAddress"], "0812");
        assert_eq!(json["outcome"], "SENT");
        assert!(json["failureReason"].is_null());
    }
}
