//! The per-call handshake between a waiting caller and the scheduler.

use parking_lot::{Condvar, Mutex};
use tokio::sync::Notify;

use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Still waiting for the scheduler.
    Waiting,
    /// The scheduler granted this permit.
    Granted,
    /// The owning caller stopped waiting.
    Interrupted,
    /// The limiter was closed before a grant happened.
    Closed,
}

/// A single-use token created by every admission attempt.
///
/// Exactly one writer (the scheduler, or the limiter when closing) moves the
/// token out of `Waiting`, and exactly one waiter observes the outcome. State
/// transitions only ever happen out of `Waiting`, so a token is granted at
/// most once.
pub(crate) struct Permit {
    state: Mutex<State>,
    cond: Condvar,
    notify: Notify,
}

impl Permit {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(State::Waiting),
            cond: Condvar::new(),
            notify: Notify::new(),
        }
    }

    /// Grant the permit, waking its owner.
    ///
    /// Returns `false` if nobody is waiting on it anymore, in which case the
    /// grant is a no-op.
    pub(crate) fn grant(&self) -> bool {
        self.transition(State::Granted)
    }

    /// Fail the permit because the limiter is closing.
    pub(crate) fn close(&self) -> bool {
        self.transition(State::Closed)
    }

    /// Abandon the permit on behalf of its owner.
    pub(crate) fn interrupt(&self) -> bool {
        self.transition(State::Interrupted)
    }

    fn transition(&self, to: State) -> bool {
        let mut state = self.state.lock();

        if *state != State::Waiting {
            return false;
        }

        *state = to;
        drop(state);

        self.cond.notify_one();
        self.notify.notify_one();
        true
    }

    /// The outcome of the permit, if one has been decided.
    fn outcome(&self) -> Option<Result<(), Error>> {
        outcome(*self.state.lock())
    }

    /// Block the current thread until the permit leaves the waiting state.
    ///
    /// The predicate is re-checked after every wakeup, so spurious wakeups
    /// go back to sleep.
    pub(crate) fn wait(&self) -> Result<(), Error> {
        let mut state = self.state.lock();

        loop {
            if let Some(result) = outcome(*state) {
                return result;
            }

            self.cond.wait(&mut state);
        }
    }

    /// Asynchronously wait for the permit to leave the waiting state.
    pub(crate) async fn wait_async(&self) -> Result<(), Error> {
        loop {
            // Registering before checking the state means a transition
            // between the check and the await still wakes us up.
            let notified = self.notify.notified();

            if let Some(result) = self.outcome() {
                return result;
            }

            notified.await;
        }
    }
}

fn outcome(state: State) -> Option<Result<(), Error>> {
    match state {
        State::Waiting => None,
        State::Granted => Some(Ok(())),
        State::Interrupted => Some(Err(Error::Interrupted)),
        State::Closed => Some(Err(Error::Closed)),
    }
}
