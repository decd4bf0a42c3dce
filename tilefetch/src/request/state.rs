//! Request lifecycle state machine.
//!
//! ```text
//! Unissued --Issue--> Issued --Start--> Active --Succeed--> Complete
//!     |                  |                 |----Fail-----> Failed
//!     |                  |                 '----Cancel---> Cancelled
//!     '------Cancel------'-----Cancel-----> Cancelled
//!
//! Complete | Failed | Cancelled | Unissued --Reset--> Unissued
//! Complete | Failed | Cancelled --Cancel--> (unchanged)
//! ```
//!
//! Only the scheduler moves a request past `Unissued`. Owners reset a terminal
//! request back to `Unissued` before replaying it.

use std::fmt;

use crate::error::{FetchError, FetchResult};

/// Summary of a completed request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Completion {
    /// HTTP status, when the payload came from an HTTP response.
    pub status: Option<u16>,
    /// Size of the payload in bytes (0 for decoded images and JSONP values).
    pub bytes: usize,
}

/// Lifecycle state of a [`Request`](super::Request).
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestState {
    /// Created but not yet handed to the scheduler.
    #[default]
    Unissued,
    /// Accepted by the scheduler, transport not started.
    Issued,
    /// Transport call in progress.
    Active,
    /// Transport finished successfully.
    Complete(Completion),
    /// Transport failed.
    Failed(FetchError),
    /// Cancelled before completing.
    Cancelled,
}

/// Events that drive [`RequestState::transition`].
#[derive(Debug, Clone, PartialEq)]
pub enum RequestEvent {
    Issue,
    Start,
    Succeed(Completion),
    Fail(FetchError),
    Cancel,
    Reset,
}

impl fmt::Display for RequestEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Issue => "issue",
            Self::Start => "start",
            Self::Succeed(_) => "succeed",
            Self::Fail(_) => "fail",
            Self::Cancel => "cancel",
            Self::Reset => "reset",
        };
        f.write_str(name)
    }
}

impl RequestState {
    /// Short lower-case name of the state.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unissued => "unissued",
            Self::Issued => "issued",
            Self::Active => "active",
            Self::Complete(_) => "complete",
            Self::Failed(_) => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Issued or active: a new fetch on the owning resource must be rejected.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Issued | Self::Active)
    }

    /// Complete, failed or cancelled.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete(_) | Self::Failed(_) | Self::Cancelled)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Computes the state that follows `event`.
    ///
    /// Cancelling a request that already finished is a no-op, so a late cancel
    /// racing with completion never corrupts the recorded outcome.
    pub fn transition(&self, event: RequestEvent) -> FetchResult<RequestState> {
        use RequestEvent as E;
        use RequestState as S;

        match (self, event) {
            (S::Unissued, E::Issue) => Ok(S::Issued),
            (S::Issued, E::Start) => Ok(S::Active),
            (S::Active, E::Succeed(completion)) => Ok(S::Complete(completion)),
            (S::Active, E::Fail(error)) => Ok(S::Failed(error)),
            (S::Unissued | S::Issued | S::Active, E::Cancel) => Ok(S::Cancelled),
            (S::Complete(_) | S::Failed(_) | S::Cancelled, E::Cancel) => Ok(self.clone()),
            (S::Unissued | S::Complete(_) | S::Failed(_) | S::Cancelled, E::Reset) => {
                Ok(S::Unissued)
            }
            (state, event) => Err(FetchError::invalid_transition(state, event)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure() -> FetchError {
        FetchError::network("http://x", "refused")
    }

    fn all_states() -> Vec<RequestState> {
        vec![
            RequestState::Unissued,
            RequestState::Issued,
            RequestState::Active,
            RequestState::Complete(Completion::default()),
            RequestState::Failed(failure()),
            RequestState::Cancelled,
        ]
    }

    #[test]
    fn test_happy_path() {
        let state = RequestState::Unissued;
        let state = state.transition(RequestEvent::Issue).unwrap();
        assert_eq!(state, RequestState::Issued);
        let state = state.transition(RequestEvent::Start).unwrap();
        assert_eq!(state, RequestState::Active);

        let completion = Completion {
            status: Some(200),
            bytes: 12,
        };
        let state = state
            .transition(RequestEvent::Succeed(completion))
            .unwrap();
        assert_eq!(state, RequestState::Complete(completion));
    }

    #[test]
    fn test_failure_records_error() {
        let state = RequestState::Active
            .transition(RequestEvent::Fail(failure()))
            .unwrap();
        assert!(state.is_failed());
        assert!(state.is_terminal());
    }

    #[test]
    fn test_issue_only_from_unissued() {
        for state in all_states() {
            let result = state.transition(RequestEvent::Issue);
            if state == RequestState::Unissued {
                assert_eq!(result.unwrap(), RequestState::Issued);
            } else {
                assert!(
                    matches!(result, Err(FetchError::InvalidTransition { .. })),
                    "issue from {} should be rejected",
                    state.name()
                );
            }
        }
    }

    #[test]
    fn test_start_only_from_issued() {
        for state in all_states() {
            let result = state.transition(RequestEvent::Start);
            assert_eq!(result.is_ok(), state == RequestState::Issued);
        }
    }

    #[test]
    fn test_outcomes_only_from_active() {
        for state in all_states() {
            let ok = state
                .transition(RequestEvent::Succeed(Completion::default()))
                .is_ok();
            let failed = state.transition(RequestEvent::Fail(failure())).is_ok();
            assert_eq!(ok, state == RequestState::Active);
            assert_eq!(failed, state == RequestState::Active);
        }
    }

    #[test]
    fn test_cancel_after_completion_is_noop() {
        let complete = RequestState::Complete(Completion::default());
        assert_eq!(
            complete.transition(RequestEvent::Cancel).unwrap(),
            complete
        );

        let failed = RequestState::Failed(failure());
        assert_eq!(failed.transition(RequestEvent::Cancel).unwrap(), failed);
    }

    #[test]
    fn test_cancel_in_flight() {
        for state in [
            RequestState::Unissued,
            RequestState::Issued,
            RequestState::Active,
        ] {
            assert_eq!(
                state.transition(RequestEvent::Cancel).unwrap(),
                RequestState::Cancelled
            );
        }
    }

    #[test]
    fn test_reset_rejected_while_in_flight() {
        for state in all_states() {
            let result = state.transition(RequestEvent::Reset);
            if state.is_in_flight() {
                assert!(result.is_err());
            } else {
                assert_eq!(result.unwrap(), RequestState::Unissued);
            }
        }
    }

    #[test]
    fn test_state_predicates() {
        assert!(RequestState::Issued.is_in_flight());
        assert!(RequestState::Active.is_in_flight());
        assert!(!RequestState::Unissued.is_in_flight());
        assert!(!RequestState::Unissued.is_terminal());
        assert!(RequestState::Cancelled.is_terminal());
    }
}
