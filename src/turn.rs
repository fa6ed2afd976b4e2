//! The phases of one chat exchange.
//!
//! ```text
//! Idle -> AwaitingUserInput -> RequestSent -> Streaming -> Completed -> Idle
//!                                   |              |
//!                                   +-----> Failed <+------------------> Idle
//! ```

use std::fmt;

use crate::error::{Error, Result};

/// Where a session is within the current exchange.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum TurnPhase {
    /// Between exchanges.
    #[default]
    Idle,
    /// Ready for the user's next prompt.
    AwaitingUserInput,
    /// The prompt is recorded and the request is in flight.
    RequestSent,
    /// The response stream is open and fragments are arriving.
    Streaming,
    /// The reply was assembled and appended.
    Completed,
    /// The exchange was abandoned; only the prompt was recorded.
    Failed,
}

/// Something that moves a turn from one phase to the next.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TurnEvent {
    /// The session is ready to accept a prompt.
    Ready,
    /// A prompt was recorded and the request sent.
    Submitted,
    /// The server accepted the request and began streaming.
    StreamOpened,
    /// The stream ended normally.
    StreamEnded,
    /// Opening or reading the stream failed.
    StreamFailed,
    /// The outcome has been rendered; return to idle.
    Reset,
}

impl TurnPhase {
    /// Apply `event`, returning the next phase.
    ///
    /// # Errors
    ///
    /// Returns a validation error when `event` is not allowed in this phase.
    pub fn advance(self, event: TurnEvent) -> Result<TurnPhase> {
        use TurnEvent::*;
        use TurnPhase::*;
        match (self, event) {
            (Idle, Ready) => Ok(AwaitingUserInput),
            (AwaitingUserInput, Ready) => Ok(AwaitingUserInput),
            (AwaitingUserInput, Submitted) => Ok(RequestSent),
            (RequestSent, StreamOpened) => Ok(Streaming),
            (RequestSent, StreamFailed) | (Streaming, StreamFailed) => Ok(Failed),
            (Streaming, StreamEnded) => Ok(Completed),
            (Completed, Reset) | (Failed, Reset) => Ok(Idle),
            (phase, event) => Err(Error::validation(
                format!("cannot apply {event:?} while {phase}"),
                Some("turn".to_string()),
            )),
        }
    }

    /// True for the phases that end an exchange.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TurnPhase::Completed | TurnPhase::Failed)
    }
}

impl fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TurnPhase::Idle => "idle",
            TurnPhase::AwaitingUserInput => "awaiting user input",
            TurnPhase::RequestSent => "request sent",
            TurnPhase::Streaming => "streaming",
            TurnPhase::Completed => "completed",
            TurnPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(events: &[TurnEvent]) -> Result<TurnPhase> {
        events
            .iter()
            .try_fold(TurnPhase::Idle, |phase, event| phase.advance(*event))
    }

    #[test]
    fn completed_exchange() {
        use TurnEvent::*;
        assert_eq!(
            run(&[Ready, Submitted, StreamOpened, StreamEnded]).unwrap(),
            TurnPhase::Completed
        );
        assert_eq!(
            run(&[Ready, Submitted, StreamOpened, StreamEnded, Reset]).unwrap(),
            TurnPhase::Idle
        );
    }

    #[test]
    fn failures_before_and_during_streaming() {
        use TurnEvent::*;
        assert_eq!(
            run(&[Ready, Submitted, StreamFailed]).unwrap(),
            TurnPhase::Failed
        );
        assert_eq!(
            run(&[Ready, Submitted, StreamOpened, StreamFailed, Reset]).unwrap(),
            TurnPhase::Idle
        );
    }

    #[test]
    fn invalid_transitions_are_rejected() {
        use TurnEvent::*;
        assert!(run(&[Submitted]).unwrap_err().is_validation());
        assert!(run(&[Ready, StreamOpened]).is_err());
        assert!(run(&[Ready, Submitted, StreamEnded]).is_err());
        assert!(run(&[Ready, Submitted, StreamOpened, Reset]).is_err());
        assert!(TurnPhase::Completed.advance(StreamFailed).is_err());
    }

    #[test]
    fn terminal_phases() {
        assert!(TurnPhase::Completed.is_terminal());
        assert!(TurnPhase::Failed.is_terminal());
        assert!(!TurnPhase::Streaming.is_terminal());
        assert!(!TurnPhase::Idle.is_terminal());
    }
}
