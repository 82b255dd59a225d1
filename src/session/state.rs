//! Session lifecycle states

use std::fmt;

/// Lifecycle of one user session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    Connecting,
    Listening,
    Stopping,
    Closed,
}

impl SessionState {
    /// Whether moving from `self` to `next` is a legal transition
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Closed, _) => false,
            (_, Closed) => true,
            (Idle, Connecting) => true,
            (Connecting, Listening) | (Connecting, Idle) => true,
            (Listening, Stopping) | (Listening, Idle) => true,
            (Stopping, Idle) => true,
            _ => false,
        }
    }

    /// Whether the microphone should be streaming
    pub fn is_listening(self) -> bool {
        self == SessionState::Listening
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Listening => "listening",
            SessionState::Stopping => "stopping",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionState::*;

    #[test]
    fn test_start_path() {
        assert!(Idle.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Listening));
        assert!(Connecting.can_transition_to(Idle));
        assert!(!Idle.can_transition_to(Listening));
    }

    #[test]
    fn test_stop_path() {
        assert!(Listening.can_transition_to(Stopping));
        assert!(Stopping.can_transition_to(Idle));
        assert!(!Stopping.can_transition_to(Listening));
    }

    #[test]
    fn test_closed_is_terminal() {
        for state in [Idle, Connecting, Listening, Stopping] {
            assert!(state.can_transition_to(Closed));
            assert!(!Closed.can_transition_to(state));
        }
    }

    #[test]
    fn test_only_listening_streams() {
        assert!(Listening.is_listening());
        for state in [Idle, Connecting, Stopping, Closed] {
            assert!(!state.is_listening());
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(Listening.to_string(), "listening");
    }
}
