//! Caller-side interruption of a blocked acquire.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::permit::Permit;

#[derive(Default)]
struct State {
    /// An interrupt that has been raised but not yet observed.
    pending: bool,
    /// The permit the owning caller is currently blocked on.
    waiting: Option<Arc<Permit>>,
}

/// A handle used to interrupt a caller blocked in
/// [`RateLimiter::acquire_interruptible`].
///
/// Clones share the same interrupt state, so one clone can be handed to
/// another thread which then interrupts the waiting caller. An interrupt
/// raised while nobody is waiting stays pending and is observed by the next
/// interruptible acquire, after which it is cleared.
///
/// [`RateLimiter::acquire_interruptible`]: crate::RateLimiter::acquire_interruptible
#[derive(Clone, Default)]
pub struct Interrupt {
    state: Arc<Mutex<State>>,
}

impl Interrupt {
    /// Construct a new interrupt handle with no pending interrupt.
    pub fn new() -> Self {
        Self::default()
    }

    /// Interrupt the caller waiting on this handle.
    ///
    /// If no caller is waiting, or the waiting caller has just been granted,
    /// the interrupt stays pending.
    pub fn interrupt(&self) {
        let mut state = self.state.lock();

        let delivered = match state.waiting.take() {
            Some(permit) => permit.interrupt(),
            None => false,
        };

        if !delivered {
            state.pending = true;
        }
    }

    /// Test if an interrupt is pending.
    pub fn is_interrupted(&self) -> bool {
        self.state.lock().pending
    }

    /// Associate a permit with this handle for the duration of a wait.
    ///
    /// A pending interrupt is consumed and delivered immediately.
    pub(crate) fn register(&self, permit: &Arc<Permit>) {
        let mut state = self.state.lock();

        if state.pending {
            state.pending = false;
            permit.interrupt();
            return;
        }

        state.waiting = Some(permit.clone());
    }

    /// Detach the permit once the wait is over.
    pub(crate) fn unregister(&self) {
        self.state.lock().waiting = None;
    }
}

impl fmt::Debug for Interrupt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();

        f.debug_struct("Interrupt")
            .field("pending", &state.pending)
            .field("waiting", &state.waiting.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::Interrupt;
    use crate::permit::Permit;
    use crate::Error;
    use std::sync::Arc;

    #[test]
    fn pending_interrupt_is_consumed() {
        let interrupt = Interrupt::new();
        interrupt.interrupt();
        assert!(interrupt.is_interrupted());

        let permit = Arc::new(Permit::new());
        interrupt.register(&permit);
        assert!(!interrupt.is_interrupted());
        assert!(matches!(permit.wait(), Err(Error::Interrupted)));
    }

    #[test]
    fn interrupt_reaches_registered_permit() {
        let interrupt = Interrupt::new();
        let permit = Arc::new(Permit::new());
        interrupt.register(&permit);

        interrupt.clone().interrupt();
        assert!(!interrupt.is_interrupted());
        assert!(matches!(permit.wait(), Err(Error::Interrupted)));
    }

    #[test]
    fn interrupt_after_grant_stays_pending() {
        let interrupt = Interrupt::new();
        let permit = Arc::new(Permit::new());
        interrupt.register(&permit);
        permit.grant();

        interrupt.interrupt();
        assert!(interrupt.is_interrupted());
        assert!(permit.wait().is_ok());
    }
}
