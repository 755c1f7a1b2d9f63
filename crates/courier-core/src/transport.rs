use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::TransportError;
use crate::session::{TransportEvent, TransportIdentity};

/// One instance of the underlying messaging client.
///
/// Instances are created by a [`TransportFactory`] and report lifecycle
/// changes through the [`TransportEventSink`] they were created with.
#[async_trait]
pub trait MessagingTransport: Send + Sync {
    /// Bring the client up. May emit events while suspended.
    async fn initialize(&self) -> Result<(), TransportError>;

    /// Tear the client down.
    async fn destroy(&self) -> Result<(), TransportError>;

    /// Send `body` to a fully qualified address.
    async fn send_message(&self, address: &str, body: &str) -> Result<(), TransportError>;

    /// Current identity snapshot, if the client has loaded one.
    fn identity(&self) -> Option<TransportIdentity>;

    /// Whether the underlying page/connection is alive.
    fn is_alive(&self) -> bool;
}

/// Constructs transport instances. Construction itself is synchronous; the
/// slow part lives in [`MessagingTransport::initialize`].
pub trait TransportFactory: Send + Sync {
    fn create(&self, sink: TransportEventSink) -> Result<Arc<dyn MessagingTransport>, TransportError>;
}

type Deliver = dyn Fn(u64, TransportEvent) -> bool + Send + Sync;

/// Event channel handed to a transport instance. Every event is tagged with
/// the generation of the instance it was created for.
#[derive(Clone)]
pub struct TransportEventSink {
    generation: u64,
    deliver: Arc<Deliver>,
}

impl TransportEventSink {
    pub fn new<F>(generation: u64, deliver: F) -> Self
    where
        F: Fn(u64, TransportEvent) -> bool + Send + Sync + 'static,
    {
        Self {
            generation,
            deliver: Arc::new(deliver),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Deliver an event. Returns `false` once the receiving side is gone.
    pub fn emit(&self, event: TransportEvent) -> bool {
        (self.deliver)(self.generation, event)
    }
}

impl std::fmt::Debug for TransportEventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportEventSink")
            .field("generation", &self.generation)
            .finish()
    }
}
