use serde::{Deserialize, Serialize};
use std::fmt;

/// Turn-taking state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Waiting for the user (or the resumption timer) to start a turn
    Idle,
    /// Capturing the user's utterance
    Recording,
    /// Utterance sent, waiting for the agent's reply
    AwaitingResponse,
    /// Playing the agent's reply
    Speaking,
    /// A turn failed; always followed immediately by `Idle`
    Error,
}

impl SessionState {
    /// States during which a turn is in progress
    pub fn is_busy(self) -> bool {
        matches!(
            self,
            SessionState::Recording | SessionState::AwaitingResponse | SessionState::Speaking
        )
    }

    /// Whether `self -> next` appears in the transition table
    pub fn permits(self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Idle, Recording) => true,
            (Recording, AwaitingResponse | Speaking | Error) => true,
            (AwaitingResponse, Speaking | Error) => true,
            (Speaking, Idle | Error) => true,
            (Error, Idle) => true,
            // Stop-conversation forces Idle from anywhere
            (_, Idle) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Recording => "recording",
            SessionState::AwaitingResponse => "awaiting_response",
            SessionState::Speaking => "speaking",
            SessionState::Error => "error",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_idle_starts_a_turn() {
        for state in [
            SessionState::Recording,
            SessionState::AwaitingResponse,
            SessionState::Speaking,
            SessionState::Error,
        ] {
            assert!(!state.permits(SessionState::Recording), "{} -> recording", state);
        }
        assert!(SessionState::Idle.permits(SessionState::Recording));
    }

    #[test]
    fn test_error_resolves_to_idle() {
        assert!(SessionState::Error.permits(SessionState::Idle));
        assert!(!SessionState::Error.permits(SessionState::Speaking));
        assert!(!SessionState::Idle.permits(SessionState::Error));
    }

    #[test]
    fn test_busy_states() {
        assert!(!SessionState::Idle.is_busy());
        assert!(SessionState::Recording.is_busy());
        assert!(SessionState::Speaking.is_busy());
        assert!(!SessionState::Error.is_busy());
    }
}
