//! Session states and the legal transition table
//!
//! The conversation loop is a three-state machine. Transitions are validated
//! against an explicit table; callers treat an illegal edge as a no-op
//! rather than a panic.

use serde::{Deserialize, Serialize};

/// Conversation state of one session.
///
/// Exactly one value holds at any instant. Initial state is `Listening`;
/// there is no terminal state while the connection is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    /// Capturing user speech, forwarding audio to transcription
    Listening,
    /// Turn ended, building the answer
    Thinking,
    /// Streaming tokens and synthesized audio back to the client
    Speaking,
}

impl SessionState {
    /// Legal edges:
    ///
    /// ```text
    /// Listening --turn ends--> Thinking
    /// Thinking  --generation begins--> Speaking
    /// Speaking  --turn complete--> Listening
    /// any state --barge_in--> Listening
    /// ```
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Listening, Thinking) | (Thinking, Speaking) | (_, Listening)
        )
    }

    /// Wire representation, matching the `state` event payload.
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Listening => "LISTENING",
            SessionState::Thinking => "THINKING",
            SessionState::Speaking => "SPEAKING",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::SessionState::*;

    #[test]
    fn legal_edges() {
        assert!(Listening.can_transition_to(Thinking));
        assert!(Thinking.can_transition_to(Speaking));
        assert!(Speaking.can_transition_to(Listening));
    }

    #[test]
    fn barge_in_reaches_listening_from_everywhere() {
        for state in [Listening, Thinking, Speaking] {
            assert!(state.can_transition_to(Listening));
        }
    }

    #[test]
    fn illegal_edges_rejected() {
        assert!(!Listening.can_transition_to(Speaking));
        assert!(!Speaking.can_transition_to(Thinking));
        assert!(!Thinking.can_transition_to(Thinking));
        assert!(!Speaking.can_transition_to(Speaking));
    }

    #[test]
    fn wire_names() {
        assert_eq!(Listening.as_str(), "LISTENING");
        assert_eq!(Thinking.as_str(), "THINKING");
        assert_eq!(Speaking.as_str(), "SPEAKING");
    }
}
