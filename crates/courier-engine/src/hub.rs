//! Status fan-out to observers.
//!
//! The hub keeps the latest `{state, ready}` pair, identity and pairing
//! challenge, and pushes every change to each connected observer. A late
//! joiner is replayed the full snapshot plus recent history before it sees
//! any live update.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use courier_core::ids::ObserverId;
use courier_core::{
    AuditLog, HubEvent, MessageLogEntry, PendingChallenge, SessionIdentity, SessionState,
    SessionStatus,
};

/// Number of audit rows replayed to a new observer.
pub const DEFAULT_REPLAY_LIMIT: usize = 50;

/// Point-in-time view of the hub state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HubSnapshot {
    pub status: SessionStatus,
    pub identity: Option<SessionIdentity>,
    pub challenge: Option<PendingChallenge>,
}

/// Receiving end handed to a newly connected observer.
pub struct Observer {
    pub id: ObserverId,
    pub events: mpsc::UnboundedReceiver<HubEvent>,
}

struct ObserverSlot {
    tx: mpsc::UnboundedSender<HubEvent>,
    /// Highest log id already delivered in the replay.
    replayed_through: i64,
}

struct HubInner {
    status: SessionStatus,
    identity: Option<SessionIdentity>,
    challenge: Option<PendingChallenge>,
    observers: HashMap<ObserverId, ObserverSlot>,
}

impl HubInner {
    fn apply_status(&mut self, status: SessionStatus) {
        self.status = status;
        if status.state != SessionState::Ready {
            self.identity = None;
        }
        if status.state != SessionState::AwaitingScan {
            self.challenge = None;
        }
    }

    fn broadcast(&mut self, event: &HubEvent) {
        self.observers.retain(|id, slot| {
            let open = slot.tx.send(event.clone()).is_ok();
            if !open {
                debug!(observer_id = %id, "dropping closed observer");
            }
            open
        });
    }
}

/// Shared handle to the broadcast hub. Cheap to clone.
#[derive(Clone)]
pub struct StatusHub {
    inner: Arc<Mutex<HubInner>>,
    history: Arc<dyn AuditLog>,
    replay_limit: usize,
}

impl StatusHub {
    pub fn new(history: Arc<dyn AuditLog>) -> Self {
        Self::with_replay_limit(history, DEFAULT_REPLAY_LIMIT)
    }

    pub fn with_replay_limit(history: Arc<dyn AuditLog>, replay_limit: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HubInner {
                status: SessionStatus::default(),
                identity: None,
                challenge: None,
                observers: HashMap::new(),
            })),
            history,
            replay_limit,
        }
    }

    /// Store and push a status change. Identity survives only in `Ready`,
    /// the challenge only in `AwaitingScan`.
    pub async fn publish_status(&self, status: SessionStatus) {
        let mut inner = self.inner.lock().await;
        inner.apply_status(status);
        inner.broadcast(&HubEvent::Status(status));
    }

    pub async fn publish_identity(&self, identity: SessionIdentity) {
        let mut inner = self.inner.lock().await;
        inner.identity = Some(identity.clone());
        inner.broadcast(&HubEvent::Identity(identity));
    }

    pub async fn publish_challenge(&self, challenge: PendingChallenge) {
        let mut inner = self.inner.lock().await;
        inner.challenge = Some(challenge.clone());
        inner.broadcast(&HubEvent::Challenge(challenge));
    }

    /// Apply a status change together with its identity and challenge under a
    /// single lock, so no observer (or late joiner) sees a partial transition.
    pub async fn publish_transition(
        &self,
        status: SessionStatus,
        identity: Option<SessionIdentity>,
        challenge: Option<PendingChallenge>,
    ) {
        let mut inner = self.inner.lock().await;
        inner.apply_status(status);
        inner.broadcast(&HubEvent::Status(status));
        if let Some(identity) = identity {
            inner.identity = Some(identity.clone());
            inner.broadcast(&HubEvent::Identity(identity));
        }
        if let Some(challenge) = challenge {
            inner.challenge = Some(challenge.clone());
            inner.broadcast(&HubEvent::Challenge(challenge));
        }
    }

    /// Push a freshly written audit row to every observer that has not
    /// already received it through its replay.
    pub async fn publish_log_entry(&self, entry: &MessageLogEntry) {
        let mut inner = self.inner.lock().await;
        let event = HubEvent::HistoryUpdate {
            entry: entry.clone(),
        };
        inner.observers.retain(|id, slot| {
            if entry.id <= slot.replayed_through {
                return true;
            }
            let open = slot.tx.send(event.clone()).is_ok();
            if !open {
                debug!(observer_id = %id, "dropping closed observer");
            }
            open
        });
    }

    /// Register an observer and replay the current snapshot followed by the
    /// most recent history.
    ///
    /// The lock is held across the history query, so a row written
    /// concurrently is either in the replay or delivered afterwards as an
    /// update, never both and never neither.
    pub async fn connect(&self) -> Observer {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = ObserverId::new();

        let mut inner = self.inner.lock().await;
        let _ = tx.send(HubEvent::Status(inner.status));
        if let Some(identity) = &inner.identity {
            let _ = tx.send(HubEvent::Identity(identity.clone()));
        }
        if let Some(challenge) = &inner.challenge {
            let _ = tx.send(HubEvent::Challenge(challenge.clone()));
        }

        let entries = match self.history.recent(self.replay_limit).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(observer_id = %id, error = %e, "history replay unavailable");
                Vec::new()
            }
        };
        let replayed_through = entries.iter().map(|e| e.id).max().unwrap_or(0);
        let _ = tx.send(HubEvent::HistoryInit { entries });

        let _ = inner.observers.insert(
            id.clone(),
            ObserverSlot {
                tx,
                replayed_through,
            },
        );
        debug!(observer_id = %id, observers = inner.observers.len(), "observer connected");

        Observer { id, events: rx }
    }

    pub async fn disconnect(&self, id: &ObserverId) -> bool {
        let mut inner = self.inner.lock().await;
        let removed = inner.observers.remove(id).is_some();
        if removed {
            debug!(observer_id = %id, observers = inner.observers.len(), "observer disconnected");
        }
        removed
    }

    pub async fn observer_count(&self) -> usize {
        self.inner.lock().await.observers.len()
    }

    pub async fn snapshot(&self) -> HubSnapshot {
        let inner = self.inner.lock().await;
        HubSnapshot {
            status: inner.status,
            identity: inner.identity.clone(),
            challenge: inner.challenge.clone(),
        }
    }
}
