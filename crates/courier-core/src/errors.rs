use std::time::Duration;

/// Errors raised by a messaging transport instance.
#[derive(Clone, Debug, thiserror::Error)]
pub enum TransportError {
    #[error("initialize failed: {0}")]
    Initialize(String),
    #[error("{0}")]
    Send(String),
    #[error("destroy failed: {0}")]
    Destroy(String),
    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

impl TransportError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Initialize(_) => "initialize",
            Self::Send(_) => "send",
            Self::Destroy(_) => "destroy",
            Self::Unavailable(_) => "unavailable",
        }
    }
}

/// Errors raised by the audit log collaborator.
#[derive(Clone, Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit store error: {0}")]
    Store(String),
    #[error("audit task failed: {0}")]
    Task(String),
}

/// Why an attempted send ended as `Failed`. Never surfaced as an `Err`:
/// the pipeline turns every variant into a durable audit row.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SendFailure {
    #[error("session not ready / reconnecting")]
    NotReady,
    #[error("{0}")]
    Transmission(String),
    #[error("send timed out after {0:?}")]
    TimedOut(Duration),
}

impl SendFailure {
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::NotReady => "not_ready",
            Self::Transmission(_) => "transmission",
            Self::TimedOut(_) => "timed_out",
        }
    }
}

/// Errors returned to callers of the dispatch pipeline.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Malformed request. Nothing was attempted and nothing was logged.
    #[error("invalid request: {0}")]
    Validation(String),
    /// The attempt happened but its audit row could not be written.
    #[error("audit log unavailable: {0}")]
    Audit(#[from] AuditError),
}

impl DispatchError {
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
