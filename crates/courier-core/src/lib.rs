pub mod address;
pub mod audit;
pub mod errors;
pub mod events;
pub mod ids;
pub mod session;
pub mod transport;

pub use audit::{AuditLog, MessageLogEntry, NewLogEntry, SendOutcome};
pub use errors::{AuditError, DispatchError, SendFailure, TransportError};
pub use events::{HubEvent, ObserverRequest};
pub use session::{
    PendingChallenge, SessionIdentity, SessionState, SessionStatus, TransportEvent,
    TransportIdentity,
};
pub use transport::{MessagingTransport, TransportEventSink, TransportFactory};
