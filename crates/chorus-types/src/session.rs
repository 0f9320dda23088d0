//! Per-session lifecycle state.

use serde::{Deserialize, Serialize};

/// Lifecycle state of one client session.
///
/// `Connecting` transitions to `Active` on receipt of a `start` control
/// message; no audio is relayed before `Active`. Any transport-level close or
/// error moves the session directly to `Closed` from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Connecting,
    Active,
    Closing,
    Closed,
}

impl SessionState {
    /// Whether audio frames are relayed upstream in this state.
    pub fn accepts_audio(self) -> bool {
        matches!(self, Self::Active)
    }

    /// Whether an outbound send is attempted in this state. Sends on
    /// `Closing`/`Closed` sessions are no-ops, not errors.
    pub fn accepts_outbound(self) -> bool {
        matches!(self, Self::Connecting | Self::Active)
    }

    /// Whether a forward transition to `next` is allowed.
    ///
    /// Forward transitions follow `Connecting → Active → Closing → Closed`;
    /// `Closed` is additionally reachable from every state (transport close
    /// or error short-circuits the ladder).
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Connecting, Self::Active)
                | (Self::Active, Self::Closing)
                | (Self::Closing, Self::Closed)
                | (_, Self::Closed)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_only_relayed_while_active() {
        assert!(!SessionState::Connecting.accepts_audio());
        assert!(SessionState::Active.accepts_audio());
        assert!(!SessionState::Closing.accepts_audio());
        assert!(!SessionState::Closed.accepts_audio());
    }

    #[test]
    fn sends_are_noops_once_closing() {
        assert!(SessionState::Connecting.accepts_outbound());
        assert!(SessionState::Active.accepts_outbound());
        assert!(!SessionState::Closing.accepts_outbound());
        assert!(!SessionState::Closed.accepts_outbound());
    }

    #[test]
    fn closed_reachable_from_every_state() {
        for state in [
            SessionState::Connecting,
            SessionState::Active,
            SessionState::Closing,
            SessionState::Closed,
        ] {
            assert!(state.can_transition_to(SessionState::Closed));
        }
    }

    #[test]
    fn no_backward_transitions() {
        assert!(!SessionState::Active.can_transition_to(SessionState::Connecting));
        assert!(!SessionState::Closing.can_transition_to(SessionState::Active));
        assert!(!SessionState::Closed.can_transition_to(SessionState::Active));
    }
}
