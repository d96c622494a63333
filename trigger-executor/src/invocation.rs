//! Attempt state machine for a single executor invocation.

use thiserror::Error;
use tracing::debug;

/// States an invocation passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationState {
    /// Created, no attempt started yet.
    Pending,
    /// An attempt is in flight.
    Running,
    /// An attempt completed successfully.
    Succeeded,
    /// The latest attempt exceeded its timeout.
    TimedOut,
    /// The latest attempt returned an error or panicked.
    Failed,
    /// Every permitted attempt failed.
    Exhausted,
}

impl InvocationState {
    /// Returns `true` once no further transitions are possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Exhausted)
    }
}

/// Events that drive invocation transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationEvent {
    /// Begin the first attempt.
    Start,
    /// The running attempt produced a value.
    Succeed,
    /// The running attempt hit its timeout.
    TimeOut,
    /// The running attempt failed.
    Fail,
    /// Begin the next attempt after a failure.
    Retry,
    /// Give up after a failure.
    Exhaust,
}

/// Tracks attempt numbering and state for one call to the executor.
#[derive(Debug, Clone, Copy)]
pub struct Invocation {
    state: InvocationState,
    attempts: u32,
    max_attempts: u32,
}

impl Invocation {
    /// Creates a pending invocation permitted `max_attempts` attempts.
    #[must_use]
    pub const fn new(max_attempts: u32) -> Self {
        Self {
            state: InvocationState::Pending,
            attempts: 0,
            max_attempts,
        }
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> InvocationState {
        self.state
    }

    /// Returns the number of attempts started so far.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Returns `true` while another attempt may be started.
    #[must_use]
    pub const fn has_remaining(&self) -> bool {
        self.attempts < self.max_attempts
    }

    /// Applies an event, returning the resulting state.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] when the event is not allowed from the
    /// current state, including a retry once the attempt budget is spent or
    /// an exhaust while attempts remain.
    pub fn transition(
        &mut self,
        event: InvocationEvent,
    ) -> Result<InvocationState, TransitionError> {
        use InvocationEvent as E;
        use InvocationState as S;

        let retryable = matches!(self.state, S::TimedOut | S::Failed);
        let next = match (self.state, event) {
            (S::Pending, E::Start) => Some(S::Running),
            (S::Running, E::Succeed) => Some(S::Succeeded),
            (S::Running, E::TimeOut) => Some(S::TimedOut),
            (S::Running, E::Fail) => Some(S::Failed),
            (_, E::Retry) if retryable && self.has_remaining() => Some(S::Running),
            (_, E::Exhaust) if retryable && !self.has_remaining() => Some(S::Exhausted),
            _ => None,
        };

        let Some(next_state) = next else {
            return Err(TransitionError {
                from: self.state,
                event,
            });
        };

        if next_state == S::Running {
            self.attempts += 1;
        }

        debug!(
            from = ?self.state,
            to = ?next_state,
            ?event,
            attempt = self.attempts,
            max_attempts = self.max_attempts,
            "invocation transition"
        );
        self.state = next_state;

        Ok(self.state)
    }
}

/// Raised when an event is not valid in the current state.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("invalid invocation transition from {from:?} via {event:?}")]
pub struct TransitionError {
    /// State prior to the attempted transition.
    pub from: InvocationState,
    /// Event that was rejected.
    pub event: InvocationEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn succeeds_on_first_attempt() {
        let mut invocation = Invocation::new(1);
        invocation.transition(InvocationEvent::Start).unwrap();
        assert_eq!(invocation.attempts(), 1);

        let state = invocation.transition(InvocationEvent::Succeed).unwrap();
        assert!(state.is_terminal());
    }

    #[test]
    fn retries_until_budget_is_spent() {
        let mut invocation = Invocation::new(3);
        invocation.transition(InvocationEvent::Start).unwrap();
        invocation.transition(InvocationEvent::TimeOut).unwrap();
        invocation.transition(InvocationEvent::Retry).unwrap();
        invocation.transition(InvocationEvent::Fail).unwrap();
        invocation.transition(InvocationEvent::Retry).unwrap();
        invocation.transition(InvocationEvent::Fail).unwrap();
        assert_eq!(invocation.attempts(), 3);
        assert!(!invocation.has_remaining());

        let err = invocation
            .transition(InvocationEvent::Retry)
            .expect_err("budget is spent");
        assert_eq!(err.from, InvocationState::Failed);

        let state = invocation.transition(InvocationEvent::Exhaust).unwrap();
        assert_eq!(state, InvocationState::Exhausted);
    }

    #[test]
    fn cannot_exhaust_while_attempts_remain() {
        let mut invocation = Invocation::new(2);
        invocation.transition(InvocationEvent::Start).unwrap();
        invocation.transition(InvocationEvent::Fail).unwrap();

        let err = invocation
            .transition(InvocationEvent::Exhaust)
            .expect_err("one attempt remains");
        assert_eq!(err.event, InvocationEvent::Exhaust);
    }

    #[test]
    fn terminal_states_reject_events() {
        let mut invocation = Invocation::new(1);
        invocation.transition(InvocationEvent::Start).unwrap();
        invocation.transition(InvocationEvent::Succeed).unwrap();

        assert!(invocation.transition(InvocationEvent::Start).is_err());
        assert!(invocation.transition(InvocationEvent::Retry).is_err());
        assert_eq!(invocation.state(), InvocationState::Succeeded);
    }
}
