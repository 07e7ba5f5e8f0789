use anyhow::Result;
use leaky_gate::{Error, Interrupt, RateLimiter};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn main() -> Result<()> {
    helpers::init_logging();

    let limiter = Arc::new(RateLimiter::new(1, Duration::from_secs(2), 2)?);
    // Spend the first tick.
    limiter.acquire()?;

    let interrupt = Interrupt::new();
    let start = Instant::now();

    let waiter = thread::spawn({
        let limiter = limiter.clone();
        let interrupt = interrupt.clone();
        move || limiter.acquire_interruptible(&interrupt)
    });

    thread::sleep(Duration::from_millis(500));
    println!("Interrupting waiter...");
    interrupt.interrupt();

    match waiter.join().expect("waiter panicked") {
        Err(Error::Interrupted) => println!("Interrupted after {:?}", start.elapsed()),
        other => println!("Unexpected outcome: {:?}", other),
    }

    println!("Waiting for a permit...");
    let granted = limiter.acquire()?;
    println!("Granted: {} after {:?}", granted, start.elapsed());
    Ok(())
}
