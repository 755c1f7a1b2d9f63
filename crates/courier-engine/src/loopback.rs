//! In-process stand-in for the network messaging client.
//!
//! `initialize` issues a pairing challenge and, after a configurable delay,
//! reports authenticated + ready with a fixed identity. Sends are accepted
//! while the instance is paired and alive.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use courier_core::ids::PairingId;
use courier_core::{
    MessagingTransport, TransportError, TransportEvent, TransportEventSink, TransportFactory,
    TransportIdentity,
};

#[derive(Clone, Debug)]
pub struct LoopbackConfig {
    pub pairing_delay: Duration,
    pub identity: TransportIdentity,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            pairing_delay: Duration::from_secs(5),
            identity: TransportIdentity {
                address: Some("6281200000000".into()),
                display_name: Some("Courier Loopback".into()),
                platform: Some("loopback".into()),
            },
        }
    }
}

pub struct LoopbackFactory {
    config: LoopbackConfig,
}

impl LoopbackFactory {
    pub fn new(config: LoopbackConfig) -> Self {
        Self { config }
    }
}

impl TransportFactory for LoopbackFactory {
    fn create(
        &self,
        sink: TransportEventSink,
    ) -> Result<Arc<dyn MessagingTransport>, TransportError> {
        Ok(Arc::new(LoopbackTransport::new(self.config.clone(), sink)))
    }
}

struct Inner {
    config: LoopbackConfig,
    sink: TransportEventSink,
    alive: AtomicBool,
    paired: AtomicBool,
    delivered: AtomicU64,
}

pub struct LoopbackTransport {
    inner: Arc<Inner>,
    pairing: Mutex<Option<JoinHandle<()>>>,
}

impl LoopbackTransport {
    pub fn new(config: LoopbackConfig, sink: TransportEventSink) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                sink,
                alive: AtomicBool::new(false),
                paired: AtomicBool::new(false),
                delivered: AtomicU64::new(0),
            }),
            pairing: Mutex::new(None),
        }
    }

    /// Number of messages accepted so far.
    pub fn delivered(&self) -> u64 {
        self.inner.delivered.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl MessagingTransport for LoopbackTransport {
    async fn initialize(&self) -> Result<(), TransportError> {
        let inner = Arc::clone(&self.inner);
        inner.alive.store(true, Ordering::SeqCst);

        let pairing_id = PairingId::new();
        let generation = inner.sink.generation();
        info!(generation, pairing_id = %pairing_id, "loopback pairing challenge issued");
        let _ = inner.sink.emit(TransportEvent::ChallengeIssued {
            payload: format!("loopback:{pairing_id}"),
        });

        let task = tokio::spawn(async move {
            tokio::time::sleep(inner.config.pairing_delay).await;
            if !inner.alive.load(Ordering::SeqCst) {
                return;
            }
            inner.paired.store(true, Ordering::SeqCst);
            let _ = inner.sink.emit(TransportEvent::Authenticated);
            let _ = inner.sink.emit(TransportEvent::Ready);
        });
        if let Some(previous) = self.pairing.lock().replace(task) {
            previous.abort();
        }
        Ok(())
    }

    async fn destroy(&self) -> Result<(), TransportError> {
        self.inner.alive.store(false, Ordering::SeqCst);
        self.inner.paired.store(false, Ordering::SeqCst);
        if let Some(task) = self.pairing.lock().take() {
            task.abort();
        }
        debug!(generation = self.inner.sink.generation(), "loopback transport destroyed");
        Ok(())
    }

    async fn send_message(&self, address: &str, body: &str) -> Result<(), TransportError> {
        if !self.is_alive() || !self.inner.paired.load(Ordering::SeqCst) {
            return Err(TransportError::Unavailable("loopback session is not paired".into()));
        }
        let _ = self.inner.delivered.fetch_add(1, Ordering::Relaxed);
        info!(address, bytes = body.len(), "loopback delivered message");
        Ok(())
    }

    fn identity(&self) -> Option<TransportIdentity> {
        self.inner
            .paired
            .load(Ordering::SeqCst)
            .then(|| self.inner.config.identity.clone())
    }

    fn is_alive(&self) -> bool {
        self.inner.alive.load(Ordering::SeqCst)
    }
}
