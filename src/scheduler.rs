//! The background loop that leaks one permit per tick.

use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use crate::queue::AdmissionQueue;

/// What happened during a single tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Tick {
    /// A waiting caller was granted its permit.
    Granted,
    /// The oldest permit had been abandoned by its caller.
    Abandoned,
    /// The queue was closed while waiting for a permit.
    Closed,
}

/// Release the oldest permit in the queue, blocking until there is one.
pub(crate) fn leak(queue: &AdmissionQueue) -> Tick {
    let Some(permit) = queue.take() else {
        return Tick::Closed;
    };

    if permit.grant() {
        tracing::trace!("granted permit");
        Tick::Granted
    } else {
        tracing::debug!("permit was abandoned before its grant");
        Tick::Abandoned
    }
}

/// Drive `tick` at a fixed rate of one call per `interval` until the queue
/// closes.
///
/// The first tick fires immediately. Each following tick is due `interval`
/// after the previous tick's deadline; if a tick overran that deadline
/// (because it waited on an empty queue), the next one starts right away and
/// the schedule restarts from there, so missed ticks never turn into a burst.
///
/// A tick that panics is logged and skipped.
pub(crate) fn run<F>(queue: &AdmissionQueue, interval: Duration, mut tick: F)
where
    F: FnMut() -> Tick,
{
    let mut deadline = Instant::now();

    loop {
        if !queue.sleep_until(deadline) {
            break;
        }

        match panic::catch_unwind(AssertUnwindSafe(&mut tick)) {
            Ok(Tick::Closed) => break,
            Ok(Tick::Granted | Tick::Abandoned) => {}
            Err(error) => {
                tracing::warn!(
                    error = panic_message(&*error),
                    "tick failed, resuming at next period"
                );
            }
        }

        deadline = (deadline + interval).max(Instant::now());
    }

    tracing::debug!("scheduler stopped");
}

fn panic_message(error: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = error.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = error.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}
