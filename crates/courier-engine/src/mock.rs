//! Scriptable transport for tests.
//!
//! [`MockTransportFactory`] records every instance it creates; tests drive
//! lifecycle events through [`MockTransport::emit`] and inspect sends,
//! teardown and liveness afterwards.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use courier_core::{
    MessagingTransport, TransportError, TransportEvent, TransportEventSink, TransportFactory,
    TransportIdentity,
};

/// Behaviour applied to instances created after it is set.
#[derive(Clone, Debug, Default)]
pub struct MockBehavior {
    /// `initialize` returns this error.
    pub fail_initialize: Option<String>,
    /// `initialize` takes this long to settle.
    pub initialize_delay: Option<Duration>,
    /// `destroy` returns an error.
    pub fail_destroy: bool,
    /// `destroy` never completes.
    pub hang_destroy: bool,
}

/// A message accepted by a [`MockTransport`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentMessage {
    pub address: String,
    pub body: String,
}

pub struct MockTransport {
    sink: TransportEventSink,
    behavior: MockBehavior,
    identity: Mutex<Option<TransportIdentity>>,
    alive: AtomicBool,
    destroyed: AtomicBool,
    initialize_calls: AtomicUsize,
    send_failure: Mutex<Option<String>>,
    send_delay: Mutex<Option<Duration>>,
    sent: Mutex<Vec<SentMessage>>,
}

impl MockTransport {
    fn new(sink: TransportEventSink, behavior: MockBehavior) -> Self {
        Self {
            sink,
            behavior,
            identity: Mutex::new(Some(Self::default_identity())),
            alive: AtomicBool::new(true),
            destroyed: AtomicBool::new(false),
            initialize_calls: AtomicUsize::new(0),
            send_failure: Mutex::new(None),
            send_delay: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn default_identity() -> TransportIdentity {
        TransportIdentity {
            address: Some("6281234567890".into()),
            display_name: Some("Front Desk".into()),
            platform: Some("android".into()),
        }
    }

    pub fn generation(&self) -> u64 {
        self.sink.generation()
    }

    /// Emit a lifecycle event as this instance.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.sink.emit(event)
    }

    /// Emit `authenticated` followed by `ready`.
    pub fn pair(&self) {
        self.emit(TransportEvent::Authenticated);
        self.emit(TransportEvent::Ready);
    }

    pub fn set_identity(&self, identity: Option<TransportIdentity>) {
        *self.identity.lock() = identity;
    }

    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::SeqCst);
    }

    /// Make every subsequent send fail with `message`.
    pub fn fail_sends(&self, message: impl Into<String>) {
        *self.send_failure.lock() = Some(message.into());
    }

    pub fn delay_sends(&self, delay: Duration) {
        *self.send_delay.lock() = Some(delay);
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub fn initialize_calls(&self) -> usize {
        self.initialize_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessagingTransport for MockTransport {
    async fn initialize(&self) -> Result<(), TransportError> {
        let _ = self.initialize_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.behavior.initialize_delay {
            tokio::time::sleep(delay).await;
        }
        match &self.behavior.fail_initialize {
            Some(message) => Err(TransportError::Initialize(message.clone())),
            None => Ok(()),
        }
    }

    async fn destroy(&self) -> Result<(), TransportError> {
        self.alive.store(false, Ordering::SeqCst);
        if self.behavior.hang_destroy {
            std::future::pending::<()>().await;
        }
        self.destroyed.store(true, Ordering::SeqCst);
        if self.behavior.fail_destroy {
            return Err(TransportError::Destroy("browser already closed".into()));
        }
        Ok(())
    }

    async fn send_message(&self, address: &str, body: &str) -> Result<(), TransportError> {
        let delay = *self.send_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = self.send_failure.lock().clone() {
            return Err(TransportError::Send(message));
        }
        self.sent.lock().push(SentMessage {
            address: address.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }

    fn identity(&self) -> Option<TransportIdentity> {
        self.identity.lock().clone()
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

/// Factory that hands out [`MockTransport`]s and keeps them for inspection.
#[derive(Clone, Default)]
pub struct MockTransportFactory {
    instances: Arc<Mutex<Vec<Arc<MockTransport>>>>,
    behavior: Arc<Mutex<MockBehavior>>,
    fail_next_create: Arc<AtomicBool>,
}

impl MockTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_behavior(&self, behavior: MockBehavior) {
        *self.behavior.lock() = behavior;
    }

    /// Make the next `create` call fail.
    pub fn fail_next_create(&self) {
        self.fail_next_create.store(true, Ordering::SeqCst);
    }

    pub fn created(&self) -> usize {
        self.instances.lock().len()
    }

    pub fn instances(&self) -> Vec<Arc<MockTransport>> {
        self.instances.lock().clone()
    }

    pub fn latest(&self) -> Option<Arc<MockTransport>> {
        self.instances.lock().last().cloned()
    }

    /// Instances that have not been torn down.
    pub fn live_instances(&self) -> usize {
        self.instances
            .lock()
            .iter()
            .filter(|t| !t.is_destroyed() && t.is_alive())
            .count()
    }
}

impl TransportFactory for MockTransportFactory {
    fn create(
        &self,
        sink: TransportEventSink,
    ) -> Result<Arc<dyn MessagingTransport>, TransportError> {
        if self.fail_next_create.swap(false, Ordering::SeqCst) {
            return Err(TransportError::Unavailable("no browser available".into()));
        }
        let transport = Arc::new(MockTransport::new(sink, self.behavior.lock().clone()));
        self.instances.lock().push(Arc::clone(&transport));
        Ok(transport)
    }
}
