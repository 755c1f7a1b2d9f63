//! Session lifecycle controller.
//!
//! A single task owns the transport slot and consumes a FIFO command queue:
//! transport events, initialize results, reconnect timer firings and operator
//! requests. Each command is handled to completion (hub publishes included)
//! before the next is taken, so transitions are totally ordered.
//!
//! Every transport instance gets a generation number. Events, initialize
//! results and reconnect timers carry the generation they belong to and are
//! discarded once that instance has been replaced.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use courier_core::{
    MessagingTransport, PendingChallenge, SessionIdentity, SessionState, SessionStatus,
    TransportError, TransportEvent, TransportEventSink, TransportFactory,
};

use crate::error::EngineError;
use crate::hub::StatusHub;

/// Timing knobs for the controller.
#[derive(Clone, Debug)]
pub struct ControllerConfig {
    /// Delay between an unexpected disconnect and re-creating the session.
    pub reconnect_delay: Duration,
    /// Upper bound on a single `destroy` call.
    pub teardown_timeout: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_millis(4_000),
            teardown_timeout: Duration::from_secs(10),
        }
    }
}

/// Readiness view consumed by the dispatch pipeline.
pub trait SessionGate: Send + Sync {
    /// The transport to send through, or `None` when the session is not ready.
    fn ready_transport(&self) -> Option<Arc<dyn MessagingTransport>>;
}

enum Command {
    Start,
    Transport {
        generation: u64,
        event: TransportEvent,
    },
    InitSettled {
        generation: u64,
        result: Result<(), TransportError>,
    },
    ReconnectDue {
        generation: u64,
    },
    Disconnect(oneshot::Sender<bool>),
    Reconnect(oneshot::Sender<bool>),
    Barrier(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

/// State readable outside the controller task.
struct Slot {
    state: SessionState,
    ready: bool,
    transport: Option<Arc<dyn MessagingTransport>>,
}

/// Handle to the session controller. Cheap to clone.
#[derive(Clone)]
pub struct SessionController {
    tx: mpsc::UnboundedSender<Command>,
    slot: Arc<RwLock<Slot>>,
}

impl SessionController {
    /// Spawn the controller task. No session is created until [`start`].
    ///
    /// [`start`]: SessionController::start
    pub fn spawn(
        factory: Arc<dyn TransportFactory>,
        hub: StatusHub,
        config: ControllerConfig,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let slot = Arc::new(RwLock::new(Slot {
            state: SessionState::Init,
            ready: false,
            transport: None,
        }));

        let controller_loop = ControllerLoop {
            config,
            factory,
            hub,
            slot: Arc::clone(&slot),
            tx: tx.clone(),
            generation: 0,
            initializing: None,
            deferred_create: false,
            reconnect: None,
        };
        tokio::spawn(controller_loop.run(rx));

        Self { tx, slot }
    }

    /// Create the first session.
    pub fn start(&self) -> Result<(), EngineError> {
        self.tx
            .send(Command::Start)
            .map_err(|_| EngineError::ControllerStopped)
    }

    /// Operator-initiated teardown. Returns `false` when there was nothing
    /// to disconnect.
    pub async fn request_disconnect(&self) -> Result<bool, EngineError> {
        self.request(Command::Disconnect).await
    }

    /// Operator-initiated re-creation. Returns `false` while an instance
    /// exists. If a torn-down instance is still initializing, creation waits
    /// for that initialize to settle.
    pub async fn request_reconnect(&self) -> Result<bool, EngineError> {
        self.request(Command::Reconnect).await
    }

    /// Resolves once every command queued before it has been handled.
    pub async fn barrier(&self) -> Result<(), EngineError> {
        self.request(Command::Barrier).await
    }

    /// Tear down the session and stop the controller task.
    pub async fn shutdown(&self) -> Result<(), EngineError> {
        self.request(Command::Shutdown).await
    }

    pub fn state(&self) -> SessionState {
        self.slot.read().state
    }

    pub fn status(&self) -> SessionStatus {
        let slot = self.slot.read();
        SessionStatus::new(slot.state, slot.ready)
    }

    /// True iff an instance exists, it reports a non-empty address and a live
    /// connection, and the session has reached `Ready`.
    pub fn is_ready(&self) -> bool {
        self.ready_transport().is_some()
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .map_err(|_| EngineError::ControllerStopped)?;
        reply_rx.await.map_err(|_| EngineError::ControllerStopped)
    }
}

impl SessionGate for SessionController {
    fn ready_transport(&self) -> Option<Arc<dyn MessagingTransport>> {
        let slot = self.slot.read();
        if !slot.ready {
            return None;
        }
        let transport = slot.transport.as_ref()?;
        let has_address = transport.identity().is_some_and(|id| id.has_address());
        (has_address && transport.is_alive()).then(|| Arc::clone(transport))
    }
}

struct PendingReconnect {
    generation: u64,
    timer: JoinHandle<()>,
}

struct ControllerLoop {
    config: ControllerConfig,
    factory: Arc<dyn TransportFactory>,
    hub: StatusHub,
    slot: Arc<RwLock<Slot>>,
    tx: mpsc::UnboundedSender<Command>,
    /// Generation of the most recently created instance.
    generation: u64,
    /// Generation whose initialize has not settled yet. Held from instance
    /// construction until the result arrives, even if the instance was torn
    /// down in the meantime.
    initializing: Option<u64>,
    /// A creation requested while a torn-down instance was still initializing.
    deferred_create: bool,
    reconnect: Option<PendingReconnect>,
}

impl ControllerLoop {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Start => {
                    let _ = self.create_instance();
                }
                Command::Transport { generation, event } => {
                    self.on_transport_event(generation, event).await;
                }
                Command::InitSettled { generation, result } => {
                    self.on_init_settled(generation, result).await;
                }
                Command::ReconnectDue { generation } => {
                    self.on_reconnect_due(generation);
                }
                Command::Disconnect(reply) => {
                    let _ = reply.send(self.disconnect().await);
                }
                Command::Reconnect(reply) => {
                    let _ = reply.send(self.reconnect().await);
                }
                Command::Barrier(reply) => {
                    let _ = reply.send(());
                }
                Command::Shutdown(reply) => {
                    self.cancel_reconnect();
                    self.teardown().await;
                    self.publish_status(SessionState::Disconnected, false).await;
                    info!("session controller stopped");
                    let _ = reply.send(());
                    break;
                }
            }
        }
    }

    fn has_instance(&self) -> bool {
        self.slot.read().transport.is_some()
    }

    fn set_status(&self, state: SessionState, ready: bool) -> SessionStatus {
        let mut slot = self.slot.write();
        slot.state = state;
        slot.ready = ready;
        SessionStatus::new(state, ready)
    }

    async fn publish_status(&self, state: SessionState, ready: bool) {
        let status = self.set_status(state, ready);
        self.hub.publish_status(status).await;
    }

    /// Construct a new instance and start its initialize in the background.
    /// A no-op while an instance exists or creation is in flight.
    fn create_instance(&mut self) -> bool {
        if self.initializing.is_some() || self.has_instance() {
            debug!(generation = self.generation, "session already exists, skipping creation");
            return false;
        }

        self.generation += 1;
        let generation = self.generation;
        let events = self.tx.clone();
        let sink = TransportEventSink::new(generation, move |generation, event| {
            events.send(Command::Transport { generation, event }).is_ok()
        });

        let transport = match self.factory.create(sink) {
            Ok(transport) => transport,
            Err(e) => {
                error!(generation, error = %e, kind = e.error_kind(), "failed to create transport");
                return false;
            }
        };

        self.slot.write().transport = Some(Arc::clone(&transport));
        self.initializing = Some(generation);
        info!(generation, "session instance created");

        let settled = self.tx.clone();
        tokio::spawn(async move {
            let result = transport.initialize().await;
            let _ = settled.send(Command::InitSettled { generation, result });
        });
        true
    }

    async fn on_init_settled(&mut self, generation: u64, result: Result<(), TransportError>) {
        if self.initializing != Some(generation) {
            debug!(generation, "ignoring stale initialize result");
            return;
        }
        self.initializing = None;

        let current = generation == self.generation && self.has_instance();
        match result {
            Ok(()) if current => debug!(generation, "transport initialized"),
            Ok(()) => debug!(generation, "torn-down instance finished initializing"),
            Err(e) if current => {
                error!(generation, error = %e, kind = e.error_kind(), "transport initialize failed");
                self.teardown().await;
                // Events may have advanced the state while initialize was
                // suspended; nothing backs a live state any more.
                let state = match self.slot.read().state {
                    s @ (SessionState::Init | SessionState::Reconnecting) => s,
                    _ => SessionState::Disconnected,
                };
                self.publish_status(state, false).await;
            }
            Err(e) => debug!(generation, error = %e, "torn-down instance failed to initialize"),
        }

        if std::mem::take(&mut self.deferred_create) {
            info!(generation, "creating deferred session");
            let _ = self.create_instance();
        }
    }

    async fn on_transport_event(&mut self, generation: u64, event: TransportEvent) {
        let transport = {
            let slot = self.slot.read();
            match &slot.transport {
                Some(t) if generation == self.generation => Arc::clone(t),
                _ => {
                    debug!(generation, event = event.kind(), "ignoring event from a replaced instance");
                    return;
                }
            }
        };

        let current = self.slot.read().state;
        let Some(next) = current.on_transport_event(&event) else {
            debug!(generation, event = event.kind(), state = %current, "event not valid in current state");
            return;
        };
        info!(generation, event = event.kind(), from = %current, to = %next, "session transition");

        match event {
            TransportEvent::ChallengeIssued { payload } => {
                let status = self.set_status(next, false);
                self.hub
                    .publish_transition(status, None, Some(PendingChallenge::new(payload)))
                    .await;
            }
            TransportEvent::Authenticated => {
                let status = self.set_status(next, false);
                self.hub.publish_transition(status, None, None).await;
            }
            TransportEvent::Ready => {
                let identity = SessionIdentity::from_snapshot(transport.identity().as_ref());
                let status = self.set_status(next, true);
                self.hub.publish_transition(status, Some(identity), None).await;
            }
            TransportEvent::Disconnected { reason } => {
                warn!(generation, reason = %reason, "session disconnected unexpectedly");
                self.publish_status(next, false).await;
                self.teardown().await;
                self.schedule_reconnect(generation);
            }
        }
    }

    fn schedule_reconnect(&mut self, generation: u64) {
        self.cancel_reconnect();
        let delay = self.config.reconnect_delay;
        let tx = self.tx.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Command::ReconnectDue { generation });
        });
        debug!(generation, delay_ms = delay.as_millis() as u64, "reconnect scheduled");
        self.reconnect = Some(PendingReconnect { generation, timer });
    }

    fn cancel_reconnect(&mut self) {
        if let Some(pending) = self.reconnect.take() {
            pending.timer.abort();
            debug!(generation = pending.generation, "pending reconnect cancelled");
        }
    }

    fn on_reconnect_due(&mut self, generation: u64) {
        let current = self.reconnect.as_ref().map(|p| p.generation);
        if current != Some(generation) || self.has_instance() {
            debug!(generation, "ignoring superseded reconnect");
            return;
        }
        self.reconnect = None;
        if self.initializing.is_some() {
            debug!(generation, "previous initialize still pending, deferring reconnect");
            self.deferred_create = true;
            return;
        }
        info!(generation, "recreating session after disconnect");
        let _ = self.create_instance();
    }

    async fn disconnect(&mut self) -> bool {
        if !self.has_instance()
            && self.initializing.is_none()
            && self.reconnect.is_none()
            && !self.deferred_create
        {
            debug!("disconnect requested with no session");
            return false;
        }
        info!(generation = self.generation, "operator disconnect");
        self.cancel_reconnect();
        self.deferred_create = false;
        self.publish_status(SessionState::Disconnecting, false).await;
        self.teardown().await;
        self.publish_status(SessionState::Disconnected, false).await;
        true
    }

    async fn reconnect(&mut self) -> bool {
        if self.has_instance() || self.deferred_create {
            debug!(generation = self.generation, "reconnect requested while a session exists");
            return false;
        }
        info!("operator reconnect");
        self.cancel_reconnect();
        self.publish_status(SessionState::Reconnecting, false).await;
        if self.initializing.is_some() {
            debug!(generation = self.generation, "previous initialize still pending, deferring creation");
            self.deferred_create = true;
        } else {
            let _ = self.create_instance();
        }
        true
    }

    /// Destroy the current instance and release the slot. Destroy failures
    /// and timeouts are logged and suppressed.
    async fn teardown(&mut self) {
        let transport = {
            let mut slot = self.slot.write();
            slot.ready = false;
            slot.transport.take()
        };
        let Some(transport) = transport else {
            return;
        };

        let generation = self.generation;
        match tokio::time::timeout(self.config.teardown_timeout, transport.destroy()).await {
            Ok(Ok(())) => debug!(generation, "transport destroyed"),
            Ok(Err(e)) => warn!(generation, error = %e, "transport teardown failed"),
            Err(_) => warn!(
                generation,
                timeout_ms = self.config.teardown_timeout.as_millis() as u64,
                "transport teardown timed out"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockBehavior, MockTransportFactory};
    use courier_core::{HubEvent, TransportIdentity};
    use courier_store::{Database, MessageLogRepo};

    struct Harness {
        controller: SessionController,
        factory: MockTransportFactory,
        hub: StatusHub,
    }

    fn harness() -> Harness {
        harness_with(ControllerConfig::default())
    }

    fn harness_with(config: ControllerConfig) -> Harness {
        let repo = MessageLogRepo::new(Database::in_memory().unwrap());
        let hub = StatusHub::new(Arc::new(repo));
        let factory = MockTransportFactory::new();
        let controller = SessionController::spawn(Arc::new(factory.clone()), hub.clone(), config);
        Harness {
            controller,
            factory,
            hub,
        }
    }

    impl Harness {
        /// Let spawned initialize tasks report back, then drain the queue.
        async fn settle(&self) {
            for _ in 0..3 {
                tokio::task::yield_now().await;
                self.controller.barrier().await.unwrap();
            }
        }

        async fn start_ready(&self) {
            self.controller.start().unwrap();
            self.settle().await;
            self.factory.latest().unwrap().pair();
            self.settle().await;
        }
    }

    #[tokio::test]
    async fn start_creates_one_instance() {
        let h = harness();
        h.controller.start().unwrap();
        h.controller.start().unwrap();
        h.settle().await;
        assert_eq!(h.factory.created(), 1);
        assert_eq!(h.controller.state(), SessionState::Init);
        assert!(!h.controller.is_ready());
    }

    #[tokio::test]
    async fn challenge_then_ready_flow() {
        let h = harness();
        h.controller.start().unwrap();
        h.settle().await;
        let transport = h.factory.latest().unwrap();

        transport.emit(TransportEvent::ChallengeIssued {
            payload: "qr-data".into(),
        });
        h.settle().await;
        assert_eq!(h.controller.state(), SessionState::AwaitingScan);
        let snapshot = h.hub.snapshot().await;
        assert_eq!(snapshot.challenge, Some(PendingChallenge::new("qr-data")));

        transport.emit(TransportEvent::Authenticated);
        h.settle().await;
        assert_eq!(h.controller.state(), SessionState::Authenticated);
        assert!(h.hub.snapshot().await.challenge.is_none());

        transport.emit(TransportEvent::Ready);
        h.settle().await;
        assert_eq!(h.controller.state(), SessionState::Ready);
        assert!(h.controller.is_ready());
        let snapshot = h.hub.snapshot().await;
        assert_eq!(snapshot.status, SessionStatus::new(SessionState::Ready, true));
        assert_eq!(
            snapshot.identity,
            Some(SessionIdentity {
                address: "6281234567890".into(),
                display_name: "Front Desk".into(),
                platform: "android".into(),
            })
        );
    }

    #[tokio::test]
    async fn ready_identity_uses_placeholders() {
        let h = harness();
        h.controller.start().unwrap();
        h.settle().await;
        let transport = h.factory.latest().unwrap();
        transport.set_identity(Some(TransportIdentity {
            address: Some("628555".into()),
            display_name: None,
            platform: None,
        }));
        transport.pair();
        h.settle().await;

        let identity = h.hub.snapshot().await.identity.unwrap();
        assert_eq!(identity.display_name, "Unknown");
        assert_eq!(identity.platform, "-");
    }

    #[tokio::test]
    async fn readiness_requires_every_condition() {
        let h = harness();
        h.start_ready().await;
        let transport = h.factory.latest().unwrap();
        assert!(h.controller.is_ready());

        transport.set_alive(false);
        assert!(!h.controller.is_ready());
        transport.set_alive(true);

        transport.set_identity(Some(TransportIdentity {
            address: Some(String::new()),
            ..Default::default()
        }));
        assert!(!h.controller.is_ready());
        transport.set_identity(None);
        assert!(!h.controller.is_ready());
        transport.set_identity(Some(crate::mock::MockTransport::default_identity()));
        assert!(h.controller.is_ready());
    }

    #[tokio::test]
    async fn invalid_event_is_ignored() {
        let h = harness();
        h.start_ready().await;
        h.factory
            .latest()
            .unwrap()
            .emit(TransportEvent::ChallengeIssued {
                payload: "late".into(),
            });
        h.settle().await;
        assert_eq!(h.controller.state(), SessionState::Ready);
        assert!(h.hub.snapshot().await.challenge.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn unexpected_disconnect_recreates_after_delay() {
        let h = harness();
        h.start_ready().await;
        let mut observer = h.hub.connect().await;
        while observer.events.try_recv().is_ok() {}

        let first = h.factory.latest().unwrap();
        first.emit(TransportEvent::Disconnected {
            reason: "NAVIGATION".into(),
        });
        h.settle().await;

        assert_eq!(h.controller.state(), SessionState::Reconnecting);
        assert!(!h.controller.is_ready());
        assert!(first.is_destroyed());
        assert_eq!(
            observer.events.try_recv().unwrap(),
            HubEvent::Status(SessionStatus::new(SessionState::Reconnecting, false))
        );
        assert!(h.hub.snapshot().await.identity.is_none());
        assert_eq!(h.factory.created(), 1);

        tokio::time::sleep(Duration::from_millis(3_999)).await;
        h.settle().await;
        assert_eq!(h.factory.created(), 1);

        tokio::time::sleep(Duration::from_millis(2)).await;
        h.settle().await;
        assert_eq!(h.factory.created(), 2);
        assert_eq!(h.factory.live_instances(), 1);

        h.factory.latest().unwrap().pair();
        h.settle().await;
        assert!(h.controller.is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn operator_disconnect_cancels_pending_reconnect() {
        let h = harness();
        h.start_ready().await;
        h.factory
            .latest()
            .unwrap()
            .emit(TransportEvent::Disconnected {
                reason: "CONFLICT".into(),
            });
        h.settle().await;

        assert!(h.controller.request_disconnect().await.unwrap());
        assert_eq!(h.controller.state(), SessionState::Disconnected);

        tokio::time::sleep(Duration::from_secs(10)).await;
        h.settle().await;
        assert_eq!(h.factory.created(), 1);
        assert_eq!(h.controller.state(), SessionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn operator_reconnect_supersedes_timer() {
        let h = harness();
        h.start_ready().await;
        h.factory
            .latest()
            .unwrap()
            .emit(TransportEvent::Disconnected {
                reason: "UNPAIRED".into(),
            });
        h.settle().await;

        assert!(h.controller.request_reconnect().await.unwrap());
        assert_eq!(h.factory.created(), 2);

        tokio::time::sleep(Duration::from_secs(10)).await;
        h.settle().await;
        assert_eq!(h.factory.created(), 2);
        assert_eq!(h.factory.live_instances(), 1);
    }

    #[tokio::test]
    async fn disconnect_then_reconnect() {
        let h = harness();
        h.start_ready().await;
        let first = h.factory.latest().unwrap();

        assert!(h.controller.request_disconnect().await.unwrap());
        assert!(first.is_destroyed());
        assert_eq!(h.controller.state(), SessionState::Disconnected);
        assert!(!h.controller.is_ready());

        assert!(!h.controller.request_disconnect().await.unwrap());

        assert!(h.controller.request_reconnect().await.unwrap());
        assert_eq!(h.controller.state(), SessionState::Reconnecting);
        assert_eq!(h.factory.created(), 2);

        h.factory.latest().unwrap().emit(TransportEvent::ChallengeIssued {
            payload: "qr-2".into(),
        });
        h.settle().await;
        assert_eq!(h.controller.state(), SessionState::AwaitingScan);
    }

    #[tokio::test]
    async fn reconnect_is_noop_while_instance_exists() {
        let h = harness();
        h.start_ready().await;
        assert!(!h.controller.request_reconnect().await.unwrap());
        assert_eq!(h.factory.created(), 1);
        assert_eq!(h.controller.state(), SessionState::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_waits_for_pending_initialize() {
        let h = harness();
        h.factory.set_behavior(MockBehavior {
            initialize_delay: Some(Duration::from_secs(30)),
            ..Default::default()
        });
        h.controller.start().unwrap();
        h.settle().await;

        h.factory.latest().unwrap().emit(TransportEvent::Disconnected {
            reason: "boot".into(),
        });
        h.settle().await;
        assert!(h.controller.request_reconnect().await.unwrap());
        assert!(!h.controller.request_reconnect().await.unwrap());
        assert_eq!(h.controller.state(), SessionState::Reconnecting);
        assert_eq!(h.factory.created(), 1);

        tokio::time::sleep(Duration::from_secs(31)).await;
        h.settle().await;
        assert_eq!(h.factory.created(), 2);
        assert_eq!(h.factory.live_instances(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_during_initialize_holds_creation_guard() {
        let h = harness();
        h.factory.set_behavior(MockBehavior {
            initialize_delay: Some(Duration::from_secs(30)),
            ..Default::default()
        });
        h.controller.start().unwrap();
        h.settle().await;

        assert!(h.controller.request_disconnect().await.unwrap());
        assert!(h.controller.request_reconnect().await.unwrap());
        h.controller.start().unwrap();
        h.settle().await;
        assert_eq!(h.factory.created(), 1);

        tokio::time::sleep(Duration::from_secs(31)).await;
        h.settle().await;
        assert_eq!(h.factory.created(), 2);
        let instances = h.factory.instances();
        assert!(instances[0].is_destroyed());
        assert_eq!(instances[1].initialize_calls(), 1);
        assert_eq!(h.factory.live_instances(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unexpected_disconnect_during_initialize_defers_reconnect() {
        let h = harness();
        h.factory.set_behavior(MockBehavior {
            initialize_delay: Some(Duration::from_secs(30)),
            ..Default::default()
        });
        h.controller.start().unwrap();
        h.settle().await;
        h.factory.latest().unwrap().emit(TransportEvent::Disconnected {
            reason: "boot".into(),
        });
        h.settle().await;

        tokio::time::sleep(Duration::from_secs(5)).await;
        h.settle().await;
        assert_eq!(h.factory.created(), 1);

        tokio::time::sleep(Duration::from_secs(26)).await;
        h.settle().await;
        assert_eq!(h.factory.created(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_cancels_deferred_creation() {
        let h = harness();
        h.factory.set_behavior(MockBehavior {
            initialize_delay: Some(Duration::from_secs(30)),
            ..Default::default()
        });
        h.controller.start().unwrap();
        h.settle().await;
        assert!(h.controller.request_disconnect().await.unwrap());
        assert!(h.controller.request_reconnect().await.unwrap());
        assert!(h.controller.request_disconnect().await.unwrap());

        tokio::time::sleep(Duration::from_secs(31)).await;
        h.settle().await;
        assert_eq!(h.factory.created(), 1);
        assert_eq!(h.controller.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn events_from_replaced_instance_are_ignored() {
        let h = harness();
        h.start_ready().await;
        let old = h.factory.latest().unwrap();
        h.controller.request_disconnect().await.unwrap();
        h.controller.request_reconnect().await.unwrap();

        old.emit(TransportEvent::Ready);
        old.emit(TransportEvent::Disconnected {
            reason: "stale".into(),
        });
        h.settle().await;
        assert_eq!(h.controller.state(), SessionState::Reconnecting);
        assert_eq!(h.factory.live_instances(), 1);
    }

    #[tokio::test]
    async fn initialize_failure_releases_slot() {
        let h = harness();
        h.factory.set_behavior(MockBehavior {
            fail_initialize: Some("chromium crashed".into()),
            ..Default::default()
        });
        h.controller.start().unwrap();
        h.settle().await;

        let first = h.factory.latest().unwrap();
        assert!(first.is_destroyed());
        assert_eq!(h.controller.state(), SessionState::Init);
        assert!(!h.controller.is_ready());

        h.factory.set_behavior(MockBehavior::default());
        assert!(h.controller.request_reconnect().await.unwrap());
        assert_eq!(h.factory.created(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn initialize_failure_after_ready_clears_hub() {
        let h = harness();
        h.factory.set_behavior(MockBehavior {
            fail_initialize: Some("page closed".into()),
            initialize_delay: Some(Duration::from_secs(1)),
            ..Default::default()
        });
        h.controller.start().unwrap();
        h.settle().await;
        h.factory.latest().unwrap().pair();
        h.settle().await;
        assert_eq!(h.hub.snapshot().await.status, SessionStatus::new(SessionState::Ready, true));

        tokio::time::sleep(Duration::from_secs(2)).await;
        h.settle().await;
        assert!(!h.controller.is_ready());
        assert_eq!(h.controller.state(), SessionState::Disconnected);

        let snapshot = h.hub.snapshot().await;
        assert_eq!(snapshot.status, SessionStatus::new(SessionState::Disconnected, false));
        assert!(snapshot.identity.is_none());

        let mut late = h.hub.connect().await;
        assert_eq!(
            late.events.try_recv().unwrap(),
            HubEvent::Status(SessionStatus::new(SessionState::Disconnected, false))
        );
    }

    #[tokio::test]
    async fn create_failure_leaves_slot_empty() {
        let h = harness();
        h.factory.fail_next_create();
        h.controller.start().unwrap();
        h.settle().await;
        assert_eq!(h.factory.created(), 0);
        assert!(h.controller.request_reconnect().await.unwrap());
        assert_eq!(h.factory.created(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_destroy_still_releases_slot() {
        let h = harness_with(ControllerConfig {
            teardown_timeout: Duration::from_millis(500),
            ..Default::default()
        });
        h.factory.set_behavior(MockBehavior {
            hang_destroy: true,
            ..Default::default()
        });
        h.start_ready().await;

        assert!(h.controller.request_disconnect().await.unwrap());
        assert_eq!(h.controller.state(), SessionState::Disconnected);
        assert!(h.controller.request_reconnect().await.unwrap());
    }

    #[tokio::test]
    async fn failed_destroy_is_suppressed() {
        let h = harness();
        h.factory.set_behavior(MockBehavior {
            fail_destroy: true,
            ..Default::default()
        });
        h.start_ready().await;
        assert!(h.controller.request_disconnect().await.unwrap());
        assert_eq!(h.controller.state(), SessionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn singleton_under_event_storm() {
        let h = harness();
        h.start_ready().await;
        for round in 0..5 {
            let current = h.factory.latest().unwrap();
            current.emit(TransportEvent::Disconnected {
                reason: format!("drop {round}"),
            });
            let _ = h.controller.request_reconnect().await;
            let _ = h.controller.request_reconnect().await;
            h.controller.start().unwrap();
            h.settle().await;
            assert!(h.factory.live_instances() <= 1);
        }
        tokio::time::sleep(Duration::from_secs(10)).await;
        h.settle().await;
        assert_eq!(h.factory.live_instances(), 1);
    }

    #[tokio::test]
    async fn shutdown_tears_down_and_stops() {
        let h = harness();
        h.start_ready().await;
        let transport = h.factory.latest().unwrap();
        h.controller.shutdown().await.unwrap();
        assert!(transport.is_destroyed());
        assert_eq!(h.controller.state(), SessionState::Disconnected);
        assert!(matches!(
            h.controller.barrier().await,
            Err(EngineError::ControllerStopped)
        ));
    }
}
