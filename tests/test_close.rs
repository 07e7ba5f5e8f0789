use leaky_gate::{Error, RateLimiter};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Closing fails everyone still waiting and every later caller.
#[test]
fn test_close_fails_waiters() -> anyhow::Result<()> {
    let limiter = Arc::new(RateLimiter::new(1, Duration::from_secs(60), 4)?);
    assert!(limiter.acquire()?);

    let mut workers = Vec::new();

    for n in 0..4 {
        workers.push(thread::spawn({
            let limiter = limiter.clone();
            move || limiter.acquire()
        }));

        while limiter.waiting() < n + 1 {
            thread::yield_now();
        }
    }

    let start = Instant::now();
    limiter.close();
    assert!(start.elapsed() < Duration::from_secs(5));

    for worker in workers {
        assert!(matches!(worker.join().unwrap(), Err(Error::Closed)));
    }

    assert!(limiter.is_closed());
    assert_eq!(limiter.waiting(), 0);
    assert!(matches!(limiter.acquire(), Err(Error::Closed)));
    Ok(())
}

/// Dropping the limiter stops a scheduler that is waiting for a caller.
#[test]
fn test_drop_stops_scheduler() -> anyhow::Result<()> {
    let limiter = RateLimiter::builder()
        .rate(1)
        .duration(Duration::from_millis(100))
        .burst(0)
        .name("drop-scheduler")
        .build()?;

    thread::sleep(Duration::from_millis(20));

    let start = Instant::now();
    drop(limiter);
    assert!(start.elapsed() < Duration::from_secs(5));
    Ok(())
}
