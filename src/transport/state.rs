use serde::{Deserialize, Serialize};

/// Lifecycle of the inference service connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closing,
}

impl ConnectionState {
    /// Whether moving from `self` to `next` is a legal transition
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Open)
                | (Connecting, Disconnected)
                | (Open, Disconnected)
                | (Open, Closing)
                | (Connecting, Closing)
                | (Disconnected, Closing)
                | (Closing, Disconnected)
        )
    }

    /// Frames may only be sent while the connection is open
    pub fn accepts_frames(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
        }
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        ConnectionState::Disconnected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_open_accepts_frames() {
        assert!(ConnectionState::Open.accepts_frames());
        assert!(!ConnectionState::Connecting.accepts_frames());
        assert!(!ConnectionState::Disconnected.accepts_frames());
        assert!(!ConnectionState::Closing.accepts_frames());
    }

    #[test]
    fn test_transitions() {
        use ConnectionState::*;
        assert!(Disconnected.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Open));
        assert!(Open.can_transition_to(Disconnected));
        assert!(Closing.can_transition_to(Disconnected));

        assert!(!Disconnected.can_transition_to(Open));
        assert!(!Closing.can_transition_to(Open));
        assert!(!Open.can_transition_to(Connecting));
    }
}
