// =============================================================================
// Connection state machine — DISCONNECTED / CONNECTING / CONNECTED / CLOSING
// =============================================================================

use parking_lot::Mutex;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "DISCONNECTED"),
            Self::Connecting => write!(f, "CONNECTING"),
            Self::Connected => write!(f, "CONNECTED"),
            Self::Closing => write!(f, "CLOSING"),
        }
    }
}

/// Tracks the adapter's connection lifecycle and logs every transition.
/// Transitions outside the documented graph
/// (`Disconnected -> Connecting -> Connected -> Closing -> Disconnected`)
/// are permitted defensively (e.g. `Connecting -> Disconnected` on a failed
/// handshake) but always logged so a stuck adapter is visible in the logs.
pub struct ReconnectState {
    label: String,
    state: Mutex<ConnectionState>,
}

impl ReconnectState {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            state: Mutex::new(ConnectionState::Disconnected),
        }
    }

    pub fn get(&self) -> ConnectionState {
        *self.state.lock()
    }

    pub fn is_connected(&self) -> bool {
        self.get() == ConnectionState::Connected
    }

    pub fn transition(&self, to: ConnectionState) {
        let mut guard = self.state.lock();
        let from = *guard;
        if from != to {
            info!(adapter = %self.label, from = %from, to = %to, "connection state transition");
        }
        *guard = to;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_disconnected() {
        let s = ReconnectState::new("binance");
        assert_eq!(s.get(), ConnectionState::Disconnected);
        assert!(!s.is_connected());
    }

    #[test]
    fn transitions_update_state() {
        let s = ReconnectState::new("binance");
        s.transition(ConnectionState::Connecting);
        s.transition(ConnectionState::Connected);
        assert!(s.is_connected());
        s.transition(ConnectionState::Closing);
        s.transition(ConnectionState::Disconnected);
        assert!(!s.is_connected());
    }
}
