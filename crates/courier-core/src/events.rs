use serde::{Deserialize, Serialize};

use crate::audit::MessageLogEntry;
use crate::session::{PendingChallenge, SessionIdentity, SessionStatus};

/// Events pushed to observers of the status feed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HubEvent {
    Status(SessionStatus),
    Identity(SessionIdentity),
    Challenge(PendingChallenge),
    HistoryInit { entries: Vec<MessageLogEntry> },
    HistoryUpdate { entry: MessageLogEntry },
}

impl HubEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Status(_) => "status",
            Self::Identity(_) => "identity",
            Self::Challenge(_) => "challenge",
            Self::HistoryInit { .. } => "historyInit",
            Self::HistoryUpdate { .. } => "historyUpdate",
        }
    }
}

/// Requests an observer may send back over the feed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ObserverRequest {
    RequestDisconnect,
    RequestReconnect,
}
