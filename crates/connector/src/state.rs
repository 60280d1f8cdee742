/// Connector lifecycle states.
///
/// `Closed` is terminal: it is only entered through an explicit stop and is
/// never left. Every scheduled callback (reconnect, heartbeat, settle delay)
/// re-checks liveness against the current state before acting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorState {
    /// No session; nothing scheduled yet, or the remote closed the session.
    Disconnected,
    /// Transport opening and registration handshake in flight.
    Connecting,
    /// Handshake complete; heartbeats running, frames flowing.
    Connected,
    /// Waiting out the fixed reconnect delay.
    Reconnecting,
    /// Handshake or transport failure observed this cycle.
    Failed,
    /// Explicitly stopped. Terminal.
    Closed,
}

impl ConnectorState {
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// States in which the session's transport may carry frames: fully
    /// connected, or mid-handshake.
    pub fn may_send(&self) -> bool {
        matches!(self, Self::Connected | Self::Connecting)
    }
}

impl std::fmt::Display for ConnectorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "DISCONNECTED"),
            Self::Connecting => write!(f, "CONNECTING"),
            Self::Connected => write!(f, "CONNECTED"),
            Self::Reconnecting => write!(f, "RECONNECTING"),
            Self::Failed => write!(f, "FAILED"),
            Self::Closed => write!(f, "CLOSED"),
        }
    }
}
