//! A bounded, first-in first-out line of waiting permits.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

use crate::permit::Permit;

struct State {
    /// Permits in the order they were admitted.
    permits: VecDeque<Arc<Permit>>,
    /// Number of consumers currently blocked in `take`.
    takers: usize,
    /// Set once the queue has been closed.
    closed: bool,
}

/// The admission queue shared between callers and the scheduler.
///
/// With a non-zero capacity this is a bounded queue. With a capacity of zero
/// it is a rendezvous: an offer is only accepted if a consumer is blocked in
/// [`AdmissionQueue::take`] at that instant and has not been claimed by an
/// earlier offer, so nothing is ever buffered.
///
/// All insertions and removals happen under one lock, so the acceptance order
/// is the order in which permits are handed out.
pub(crate) struct AdmissionQueue {
    capacity: usize,
    state: Mutex<State>,
    /// Signalled when a permit is offered or the queue closes.
    available: Condvar,
}

/// The result of offering a permit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Offer {
    /// The permit was appended to the queue.
    Accepted,
    /// The queue is full, or no consumer was ready for a handoff.
    Rejected,
    /// The queue has been closed.
    Closed,
}

impl AdmissionQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(State {
                permits: VecDeque::new(),
                takers: 0,
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Try to append a permit without blocking.
    pub(crate) fn try_enqueue(&self, permit: Arc<Permit>) -> Offer {
        let mut state = self.state.lock();

        if state.closed {
            return Offer::Closed;
        }

        let limit = if self.capacity == 0 {
            state.takers
        } else {
            self.capacity
        };

        if state.permits.len() >= limit {
            return Offer::Rejected;
        }

        state.permits.push_back(permit);
        drop(state);

        self.available.notify_one();
        Offer::Accepted
    }

    /// Block until a permit is available and remove the oldest one.
    ///
    /// Returns `None` once the queue is closed.
    pub(crate) fn take(&self) -> Option<Arc<Permit>> {
        let mut state = self.state.lock();
        state.takers += 1;

        let permit = loop {
            if let Some(permit) = state.permits.pop_front() {
                break Some(permit);
            }

            if state.closed {
                break None;
            }

            self.available.wait(&mut state);
        };

        state.takers -= 1;
        permit
    }

    /// Sleep until `deadline`, waking early only if the queue closes.
    ///
    /// Returns `false` if the queue is closed.
    pub(crate) fn sleep_until(&self, deadline: Instant) -> bool {
        let mut state = self.state.lock();

        while !state.closed && Instant::now() < deadline {
            self.available.wait_until(&mut state, deadline);
        }

        !state.closed
    }

    /// Close the queue, returning every permit still waiting in it.
    pub(crate) fn close(&self) -> Vec<Arc<Permit>> {
        let mut state = self.state.lock();
        state.closed = true;
        let drained = state.permits.drain(..).collect();
        drop(state);

        self.available.notify_all();
        drained
    }

    /// Number of permits currently queued.
    pub(crate) fn len(&self) -> usize {
        self.state.lock().permits.len()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    #[cfg(test)]
    fn takers(&self) -> usize {
        self.state.lock().takers
    }
}

#[cfg(test)]
mod tests {
    use super::{AdmissionQueue, Offer};
    use crate::permit::Permit;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    fn permit() -> Arc<Permit> {
        Arc::new(Permit::new())
    }

    #[test]
    fn bounded_rejects_over_capacity() {
        let queue = AdmissionQueue::new(2);
        assert_eq!(queue.try_enqueue(permit()), Offer::Accepted);
        assert_eq!(queue.try_enqueue(permit()), Offer::Accepted);
        assert_eq!(queue.try_enqueue(permit()), Offer::Rejected);
        assert_eq!(queue.len(), 2);

        assert!(queue.take().is_some());
        assert_eq!(queue.try_enqueue(permit()), Offer::Accepted);
    }

    #[test]
    fn take_is_oldest_first() {
        let queue = AdmissionQueue::new(3);
        let permits = [permit(), permit(), permit()];

        for p in &permits {
            assert_eq!(queue.try_enqueue(p.clone()), Offer::Accepted);
        }

        for p in &permits {
            let taken = queue.take().unwrap();
            assert!(Arc::ptr_eq(p, &taken));
        }
    }

    #[test]
    fn rendezvous_without_taker_rejects() {
        let queue = AdmissionQueue::new(0);
        assert_eq!(queue.try_enqueue(permit()), Offer::Rejected);
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn rendezvous_hands_off_to_single_taker() {
        let queue = Arc::new(AdmissionQueue::new(0));

        let taker = thread::spawn({
            let queue = queue.clone();
            move || queue.take()
        });

        while queue.takers() == 0 {
            thread::yield_now();
        }

        let first = permit();
        assert_eq!(queue.try_enqueue(first.clone()), Offer::Accepted);
        // The only taker has been claimed by the first offer.
        assert_eq!(queue.try_enqueue(permit()), Offer::Rejected);

        let taken = taker.join().unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &taken));
    }

    #[test]
    fn close_drains_and_releases_taker() {
        let queue = Arc::new(AdmissionQueue::new(0));

        let taker = thread::spawn({
            let queue = queue.clone();
            move || queue.take()
        });

        while queue.takers() == 0 {
            thread::yield_now();
        }

        assert!(queue.close().is_empty());
        assert!(taker.join().unwrap().is_none());
        assert_eq!(queue.try_enqueue(permit()), Offer::Closed);
        assert!(queue.is_closed());
    }

    #[test]
    fn close_returns_queued_permits() {
        let queue = AdmissionQueue::new(4);
        queue.try_enqueue(permit());
        queue.try_enqueue(permit());
        assert_eq!(queue.close().len(), 2);
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn sleep_until_wakes_on_close() {
        let queue = Arc::new(AdmissionQueue::new(1));
        let start = Instant::now();

        let sleeper = thread::spawn({
            let queue = queue.clone();
            move || queue.sleep_until(Instant::now() + Duration::from_secs(10))
        });

        thread::sleep(Duration::from_millis(20));
        queue.close();

        assert!(!sleeper.join().unwrap());
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn sleep_until_ignores_offers() {
        let queue = AdmissionQueue::new(1);
        let deadline = Instant::now() + Duration::from_millis(30);
        queue.try_enqueue(permit());
        assert!(queue.sleep_until(deadline));
        assert!(Instant::now() >= deadline);
    }
}
