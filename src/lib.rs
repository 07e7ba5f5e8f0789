#![deny(missing_docs)]
//! A blocking admission limiter based on the [leaky bucket] algorithm.
//!
//! Callers that want to proceed past a checkpoint call
//! [`RateLimiter::acquire`]. Up to `burst` callers are admitted into a fair
//! queue, and a dedicated scheduler thread releases ("leaks") the oldest one
//! every `duration / rate`. Callers that arrive while the queue is full are
//! rejected right away instead of queueing further.
//!
//! With a `burst` of zero nothing is ever queued: an acquire only succeeds if
//! the scheduler is waiting for a caller at that very moment.
//!
//! ## Usage
//!
//! Add the following to your `Cargo.toml`:
//!
//! ```toml
//! leaky-gate = "0.1.0"
//! ```
//!
//! ## Example
//!
//! ```
//! use leaky_gate::RateLimiter;
//! use std::sync::Arc;
//! use std::thread;
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), leaky_gate::Error> {
//! // Ten permits per 100 milliseconds, up to three callers waiting at once.
//! let limiter = Arc::new(RateLimiter::new(10, Duration::from_millis(100), 3)?);
//!
//! let workers = (0..3)
//!     .map(|_| {
//!         let limiter = limiter.clone();
//!         thread::spawn(move || limiter.acquire())
//!     })
//!     .collect::<Vec<_>>();
//!
//! for worker in workers {
//!     // Either granted, or rejected because the queue was full.
//!     let _granted: bool = worker.join().unwrap()?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Interruption and shutdown
//!
//! A caller blocked in [`RateLimiter::acquire_interruptible`] can be woken
//! from another thread through an [`Interrupt`] handle, in which case it
//! fails with [`Error::Interrupted`]. Closing the limiter with
//! [`RateLimiter::close`] (or dropping it) stops the scheduler thread and
//! fails every caller still waiting with [`Error::Closed`].
//!
//! [leaky bucket]: https://en.wikipedia.org/wiki/Leaky_bucket

use std::fmt;
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;

mod interrupt;
mod permit;
mod queue;
mod scheduler;

pub use self::interrupt::Interrupt;

use self::permit::Permit;
use self::queue::{AdmissionQueue, Offer};

/// Error type for the rate limiter.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The configured rate was zero.
    #[error("Rate must be greater than zero")]
    ZeroRate,
    /// The duration divided by the rate truncates to zero milliseconds.
    #[error("Tick interval of {duration:?} / {rate} truncates to zero milliseconds")]
    ZeroInterval {
        /// The configured duration.
        duration: Duration,
        /// The configured rate.
        rate: u32,
    },
    /// The scheduler thread could not be spawned.
    #[error("Failed to spawn scheduler thread")]
    Spawn(#[source] io::Error),
    /// The waiting caller was interrupted before being granted a permit.
    #[error("Interrupted while waiting for a permit")]
    Interrupted,
    /// The rate limiter has been closed.
    #[error("Rate limiter closed")]
    Closed,
}

/// Builder for a [`RateLimiter`].
#[derive(Debug, Clone)]
pub struct Builder {
    rate: Option<u32>,
    duration: Option<Duration>,
    burst: Option<usize>,
    name: Option<String>,
}

impl Builder {
    /// Set the number of permits granted per [`duration`].
    ///
    /// Defaults to `1`.
    ///
    /// [`duration`]: Builder::duration
    #[inline(always)]
    pub fn rate(mut self, rate: u32) -> Self {
        self.rate = Some(rate);
        self
    }

    /// Set the span of time over which [`rate`] permits are granted.
    ///
    /// Only whole milliseconds are taken into account. Defaults to one second.
    ///
    /// [`rate`]: Builder::rate
    #[inline(always)]
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Set the maximum number of callers allowed to wait at the same time.
    ///
    /// A burst of zero means no caller is ever queued. Defaults to `0`.
    #[inline(always)]
    pub fn burst(mut self, burst: usize) -> Self {
        self.burst = Some(burst);
        self
    }

    /// Set the name of the scheduler thread.
    ///
    /// Defaults to `leak-scheduler`.
    #[inline(always)]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Construct the rate limiter and start its scheduler.
    ///
    /// The first permit is released immediately, after which one permit is
    /// released every `duration / rate`.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::ZeroRate`] or [`Error::ZeroInterval`] if the
    /// configuration cannot produce a positive tick interval, and with
    /// [`Error::Spawn`] if the scheduler thread cannot be started.
    pub fn build(self) -> Result<RateLimiter, Error> {
        const DEFAULT_RATE: u32 = 1;
        const DEFAULT_DURATION: Duration = Duration::from_secs(1);
        const DEFAULT_BURST: usize = 0;
        const DEFAULT_NAME: &str = "leak-scheduler";

        let rate = self.rate.unwrap_or(DEFAULT_RATE);
        let duration = self.duration.unwrap_or(DEFAULT_DURATION);
        let burst = self.burst.unwrap_or(DEFAULT_BURST);
        let name = self.name.unwrap_or_else(|| DEFAULT_NAME.to_owned());

        let interval = tick_interval(rate, duration)?;
        let queue = Arc::new(AdmissionQueue::new(burst));

        let handle = thread::Builder::new()
            .name(name)
            .spawn({
                let queue = queue.clone();
                move || scheduler::run(&queue, interval, || scheduler::leak(&queue))
            })
            .map_err(Error::Spawn)?;

        tracing::debug!(rate, ?duration, burst, ?interval, "started rate limiter");

        Ok(RateLimiter {
            rate,
            burst,
            interval,
            queue,
            scheduler: Mutex::new(Some(handle)),
        })
    }
}

/// Compute the whole-millisecond tick interval for the given configuration.
fn tick_interval(rate: u32, duration: Duration) -> Result<Duration, Error> {
    if rate == 0 {
        return Err(Error::ZeroRate);
    }

    let millis = duration.as_millis() / u128::from(rate);

    if millis == 0 {
        return Err(Error::ZeroInterval { duration, rate });
    }

    let millis = u64::try_from(millis).unwrap_or(u64::MAX);
    Ok(Duration::from_millis(millis))
}

/// A leaky bucket admission limiter.
///
/// Owns a background scheduler thread for as long as it lives. Share it
/// between threads by wrapping it in an [`Arc`].
pub struct RateLimiter {
    rate: u32,
    burst: usize,
    interval: Duration,
    queue: Arc<AdmissionQueue>,
    scheduler: Mutex<Option<thread::JoinHandle<()>>>,
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("rate", &self.rate)
            .field("burst", &self.burst)
            .field("interval", &self.interval)
            .field("waiting", &self.queue.len())
            .finish()
    }
}

impl RateLimiter {
    /// Construct a new rate limiter through a builder.
    pub fn builder() -> Builder {
        Builder {
            rate: None,
            duration: None,
            burst: None,
            name: None,
        }
    }

    /// Construct a rate limiter granting `rate` permits per `duration`, with
    /// up to `burst` callers waiting at once.
    ///
    /// # Example
    ///
    /// ```
    /// use leaky_gate::RateLimiter;
    /// use std::time::Duration;
    ///
    /// # fn main() -> Result<(), leaky_gate::Error> {
    /// let limiter = RateLimiter::new(3, Duration::from_secs(1), 3)?;
    /// assert_eq!(limiter.interval(), Duration::from_millis(333));
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(rate: u32, duration: Duration, burst: usize) -> Result<Self, Error> {
        Self::builder()
            .rate(rate)
            .duration(duration)
            .burst(burst)
            .build()
    }

    /// Get the number of permits granted per configured duration.
    #[inline]
    pub fn rate(&self) -> u32 {
        self.rate
    }

    /// Get the maximum number of callers that may wait at the same time.
    #[inline]
    pub fn burst(&self) -> usize {
        self.burst
    }

    /// Get the interval between two consecutive grants.
    #[inline]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Query how many callers are queued waiting for a permit.
    ///
    /// This is just a best-effort estimate, the value may be stale as soon as
    /// it is returned.
    pub fn waiting(&self) -> usize {
        self.queue.len()
    }

    /// Test if the rate limiter has been closed.
    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }

    /// Acquire a permit, blocking the current thread until it is granted.
    ///
    /// Returns `Ok(false)` without blocking if the caller could not be
    /// admitted, either because `burst` callers are already waiting or,
    /// with a burst of zero, because the scheduler was not ready to hand out
    /// a permit. Callers that were admitted are granted permits in the order
    /// they were admitted.
    ///
    /// There is no timeout. Use [`acquire_interruptible`] to be able to stop
    /// waiting.
    ///
    /// [`acquire_interruptible`]: RateLimiter::acquire_interruptible
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Closed`] if the limiter is closed before or while
    /// waiting.
    pub fn acquire(&self) -> Result<bool, Error> {
        let Some(permit) = self.admit()? else {
            return Ok(false);
        };

        permit.wait()?;
        Ok(true)
    }

    /// Acquire a permit like [`acquire`], but stop waiting when `interrupt`
    /// is triggered.
    ///
    /// An interrupted caller gives up its place without blocking anyone
    /// behind it. The scheduler still spends one tick on the abandoned
    /// place when it reaches it.
    ///
    /// [`acquire`]: RateLimiter::acquire
    ///
    /// # Example
    ///
    /// ```
    /// use leaky_gate::{Error, Interrupt, RateLimiter};
    /// use std::time::Duration;
    ///
    /// # fn main() -> Result<(), Error> {
    /// let limiter = RateLimiter::new(1, Duration::from_secs(60), 2)?;
    /// // Consume the immediate first tick.
    /// assert!(limiter.acquire()?);
    ///
    /// let interrupt = Interrupt::new();
    /// interrupt.interrupt();
    ///
    /// assert!(matches!(
    ///     limiter.acquire_interruptible(&interrupt),
    ///     Err(Error::Interrupted)
    /// ));
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Interrupted`] if interrupted while waiting, or with
    /// [`Error::Closed`] if the limiter is closed.
    pub fn acquire_interruptible(&self, interrupt: &Interrupt) -> Result<bool, Error> {
        let Some(permit) = self.admit()? else {
            return Ok(false);
        };

        interrupt.register(&permit);
        let result = permit.wait();
        interrupt.unregister();

        result?;
        Ok(true)
    }

    /// Acquire a permit, suspending the current task instead of blocking the
    /// thread.
    ///
    /// Admission works exactly like [`acquire`]. Dropping the returned future
    /// after admission abandons the caller's place in the queue.
    ///
    /// [`acquire`]: RateLimiter::acquire
    ///
    /// # Example
    ///
    /// ```
    /// use leaky_gate::RateLimiter;
    /// use std::time::Duration;
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), leaky_gate::Error> {
    /// let limiter = RateLimiter::new(10, Duration::from_secs(1), 5)?;
    /// assert!(limiter.acquire_async().await?);
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Closed`] if the limiter is closed.
    pub async fn acquire_async(&self) -> Result<bool, Error> {
        let Some(permit) = self.admit()? else {
            return Ok(false);
        };

        permit.wait_async().await?;
        Ok(true)
    }

    /// Try to put a fresh permit in the queue.
    fn admit(&self) -> Result<Option<Arc<Permit>>, Error> {
        let permit = Arc::new(Permit::new());

        match self.queue.try_enqueue(permit.clone()) {
            Offer::Accepted => Ok(Some(permit)),
            Offer::Rejected => Ok(None),
            Offer::Closed => Err(Error::Closed),
        }
    }

    /// Close the rate limiter.
    ///
    /// Stops and joins the scheduler thread, and fails every caller that is
    /// still waiting with [`Error::Closed`]. Later acquires fail the same way.
    /// Calling this more than once has no further effect.
    pub fn close(&self) {
        for permit in self.queue.close() {
            permit.close();
        }

        let handle = self.scheduler.lock().take();

        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::warn!("scheduler thread panicked");
            }

            tracing::debug!("closed rate limiter");
        }
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        self.close();
    }
}
