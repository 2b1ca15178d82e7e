//! Per-request state tracking.
//!
//! ```text
//! Init -> Detecting -> Executing -> Done
//!                          \-> AwaitingSelection -> Completing -> Done
//!                                  \-> Expired
//! ```
//! `Failed` is reachable from every non-terminal state. A new `Detecting`
//! pass is always allowed.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    Init,
    Detecting,
    Executing,
    AwaitingSelection,
    Completing,
    Done,
    Failed,
    Expired,
}

impl RequestState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestState::Done | RequestState::Failed | RequestState::Expired
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestState::Init => "init",
            RequestState::Detecting => "detecting",
            RequestState::Executing => "executing",
            RequestState::AwaitingSelection => "awaiting_selection",
            RequestState::Completing => "completing",
            RequestState::Done => "done",
            RequestState::Failed => "failed",
            RequestState::Expired => "expired",
        }
    }

    /// Whether `self -> next` is a legal step.
    pub fn can_advance(&self, next: RequestState) -> bool {
        use RequestState::*;
        match (*self, next) {
            (_, Detecting) => true,
            (from, Failed) => !from.is_terminal(),
            (Detecting, Executing)
            | (Executing, Done)
            | (Executing, AwaitingSelection)
            | (AwaitingSelection, Completing)
            | (AwaitingSelection, Expired)
            | (Completing, Done) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid request transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: RequestState,
    pub to: RequestState,
}

/// The state of one translation request.
#[derive(Debug, Clone)]
pub struct RequestLifecycle {
    state: RequestState,
    subject: String,
}

impl RequestLifecycle {
    pub fn new(subject: &str) -> Self {
        Self {
            state: RequestState::Init,
            subject: subject.to_string(),
        }
    }

    /// A request picking up a parked selection.
    pub fn resume(subject: &str) -> Self {
        Self {
            state: RequestState::AwaitingSelection,
            subject: subject.to_string(),
        }
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn advance(&mut self, next: RequestState) -> Result<(), InvalidTransition> {
        if !self.state.can_advance(next) {
            return Err(InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::trace!(subject = %self.subject, from = %self.state, to = %next, "request state");
        self.state = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use RequestState::*;

    #[test]
    fn selection_path() {
        let mut lc = RequestLifecycle::new("https://x.test/");
        for next in [Detecting, Executing, AwaitingSelection, Completing, Done] {
            lc.advance(next).unwrap();
        }
        assert_eq!(lc.state(), Done);
    }

    #[test]
    fn illegal_steps_are_rejected() {
        let mut lc = RequestLifecycle::new("x");
        assert_eq!(
            lc.advance(Done).unwrap_err(),
            InvalidTransition { from: Init, to: Done }
        );
        lc.advance(Failed).unwrap();
        assert!(lc.advance(Failed).is_err());
        // Retrying detection after a failure is fine.
        lc.advance(Detecting).unwrap();
    }

    #[test]
    fn parked_sessions_expire() {
        let mut lc = RequestLifecycle::resume("token");
        lc.advance(Expired).unwrap();
        assert!(lc.state().is_terminal());
        assert!(!Expired.can_advance(Completing));
    }
}
