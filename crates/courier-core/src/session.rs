use serde::{Deserialize, Serialize};

/// Lifecycle state of the single messaging session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Init,
    AwaitingScan,
    Authenticated,
    Ready,
    Disconnecting,
    Disconnected,
    Reconnecting,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::AwaitingScan => "AWAITING_SCAN",
            Self::Authenticated => "AUTHENTICATED",
            Self::Ready => "READY",
            Self::Disconnecting => "DISCONNECTING",
            Self::Disconnected => "DISCONNECTED",
            Self::Reconnecting => "RECONNECTING",
        }
    }

    /// States in which transport events are still meaningful.
    pub fn is_live(&self) -> bool {
        !matches!(self, Self::Disconnecting | Self::Disconnected)
    }

    /// Transition table for transport-originated events. Returns the target
    /// state, or `None` when the event is not valid from `self`.
    pub fn on_transport_event(&self, event: &TransportEvent) -> Option<SessionState> {
        let allowed = match event {
            TransportEvent::ChallengeIssued { .. } => {
                matches!(self, Self::Init | Self::AwaitingScan | Self::Reconnecting)
            }
            TransportEvent::Authenticated => matches!(
                self,
                Self::Init | Self::AwaitingScan | Self::Authenticated | Self::Reconnecting
            ),
            TransportEvent::Ready | TransportEvent::Disconnected { .. } => self.is_live(),
        };
        allowed.then(|| event.target_state())
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SessionState {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INIT" => Ok(Self::Init),
            "AWAITING_SCAN" => Ok(Self::AwaitingScan),
            "AUTHENTICATED" => Ok(Self::Authenticated),
            "READY" => Ok(Self::Ready),
            "DISCONNECTING" => Ok(Self::Disconnecting),
            "DISCONNECTED" => Ok(Self::Disconnected),
            "RECONNECTING" => Ok(Self::Reconnecting),
            other => Err(format!("unknown session state: {other}")),
        }
    }
}

/// The `{state, ready}` pair pushed to observers after every transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub ready: bool,
}

impl SessionStatus {
    pub fn new(state: SessionState, ready: bool) -> Self {
        Self { state, ready }
    }
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self::new(SessionState::Init, false)
    }
}

/// Raw identity snapshot as reported by the transport. Any field may be
/// missing while the underlying client is still loading.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransportIdentity {
    pub address: Option<String>,
    pub display_name: Option<String>,
    pub platform: Option<String>,
}

impl TransportIdentity {
    pub fn has_address(&self) -> bool {
        self.address.as_deref().is_some_and(|a| !a.is_empty())
    }
}

/// Identity captured when the session becomes ready.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionIdentity {
    pub address: String,
    pub display_name: String,
    pub platform: String,
}

impl SessionIdentity {
    /// Capture an identity, substituting placeholders for absent fields.
    pub fn from_snapshot(snapshot: Option<&TransportIdentity>) -> Self {
        let pick = |value: Option<&String>, fallback: &str| {
            value
                .filter(|v| !v.is_empty())
                .cloned()
                .unwrap_or_else(|| fallback.to_string())
        };
        Self {
            address: pick(snapshot.and_then(|s| s.address.as_ref()), "-"),
            display_name: pick(snapshot.and_then(|s| s.display_name.as_ref()), "Unknown"),
            platform: pick(snapshot.and_then(|s| s.platform.as_ref()), "-"),
        }
    }
}

/// Pairing artifact shown to the operator while awaiting a scan.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingChallenge {
    pub encoded_image: String,
}

impl PendingChallenge {
    pub fn new(encoded_image: impl Into<String>) -> Self {
        Self {
            encoded_image: encoded_image.into(),
        }
    }
}

/// Lifecycle events emitted by a transport instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    ChallengeIssued { payload: String },
    Authenticated,
    Ready,
    Disconnected { reason: String },
}

impl TransportEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ChallengeIssued { .. } => "challenge_issued",
            Self::Authenticated => "authenticated",
            Self::Ready => "ready",
            Self::Disconnected { .. } => "disconnected",
        }
    }

    fn target_state(&self) -> SessionState {
        match self {
            Self::ChallengeIssued { .. } => SessionState::AwaitingScan,
            Self::Authenticated => SessionState::Authenticated,
            Self::Ready => SessionState::Ready,
            Self::Disconnected { .. } => SessionState::Reconnecting,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn challenge() -> TransportEvent {
        TransportEvent::ChallengeIssued {
            payload: "qr".into(),
        }
    }

    fn disconnected() -> TransportEvent {
        TransportEvent::Disconnected {
            reason: "LOGOUT".into(),
        }
    }

    #[test]
    fn state_wire_names() {
        let json = serde_json::to_string(&SessionState::AwaitingScan).unwrap();
        assert_eq!(json, "\"AWAITING_SCAN\"");
        for state in [
            SessionState::Init,
            SessionState::AwaitingScan,
            SessionState::Authenticated,
            SessionState::Ready,
            SessionState::Disconnecting,
            SessionState::Disconnected,
            SessionState::Reconnecting,
        ] {
            let parsed: SessionState = state.as_str().parse().unwrap();
            assert_eq!(parsed, state);
        }
    }

    #[test]
    fn challenge_only_before_authentication() {
        use SessionState::*;
        assert_eq!(Init.on_transport_event(&challenge()), Some(AwaitingScan));
        assert_eq!(AwaitingScan.on_transport_event(&challenge()), Some(AwaitingScan));
        assert_eq!(Reconnecting.on_transport_event(&challenge()), Some(AwaitingScan));
        assert_eq!(Authenticated.on_transport_event(&challenge()), None);
        assert_eq!(Ready.on_transport_event(&challenge()), None);
        assert_eq!(Disconnected.on_transport_event(&challenge()), None);
    }

    #[test]
    fn authenticated_transitions() {
        use SessionState::*;
        let ev = TransportEvent::Authenticated;
        assert_eq!(Init.on_transport_event(&ev), Some(Authenticated));
        assert_eq!(AwaitingScan.on_transport_event(&ev), Some(Authenticated));
        assert_eq!(Authenticated.on_transport_event(&ev), Some(Authenticated));
        assert_eq!(Reconnecting.on_transport_event(&ev), Some(Authenticated));
        assert_eq!(Ready.on_transport_event(&ev), None);
    }

    #[test]
    fn ready_and_disconnect_from_any_live_state() {
        use SessionState::*;
        for state in [Init, AwaitingScan, Authenticated, Ready, Reconnecting] {
            assert_eq!(state.on_transport_event(&TransportEvent::Ready), Some(Ready));
            assert_eq!(state.on_transport_event(&disconnected()), Some(Reconnecting));
        }
        for state in [Disconnecting, Disconnected] {
            assert_eq!(state.on_transport_event(&TransportEvent::Ready), None);
            assert_eq!(state.on_transport_event(&disconnected()), None);
        }
    }

    #[test]
    fn identity_falls_back_to_placeholders() {
        let identity = SessionIdentity::from_snapshot(None);
        assert_eq!(identity.address, "-");
        assert_eq!(identity.display_name, "Unknown");
        assert_eq!(identity.platform, "-");

        let partial = TransportIdentity {
            address: Some("62812".into()),
            display_name: Some(String::new()),
            platform: None,
        };
        let identity = SessionIdentity::from_snapshot(Some(&partial));
        assert_eq!(identity.address, "62812");
        assert_eq!(identity.display_name, "Unknown");
        assert_eq!(identity.platform, "-");
    }

    #[test]
    fn identity_serializes_camel_case() {
        let identity = SessionIdentity {
            address: "62812".into(),
            display_name: "Front Desk".into(),
            platform: "android".into(),
        };
        let json = serde_json::to_value(&identity).unwrap();
        assert_eq!(json["displayName"], "Front Desk");
    }

    #[test]
    fn transport_identity_address_check() {
        assert!(!TransportIdentity::default().has_address());
        let empty = TransportIdentity {
            address: Some(String::new()),
            ..Default::default()
        };
        assert!(!empty.has_address());
        let full = TransportIdentity {
            address: Some("62812".into()),
            ..Default::default()
        };
        assert!(full.has_address());
    }
}
