use anyhow::Result;
use leaky_gate::RateLimiter;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

fn main() -> Result<()> {
    helpers::init_logging();

    let limiter = Arc::new(RateLimiter::new(3, Duration::from_secs(1), 3)?);

    let mut workers = Vec::new();

    for n in 0..10 {
        let limiter = limiter.clone();

        workers.push(thread::spawn(move || -> Result<()> {
            for i in 0..20 {
                if limiter.acquire()? {
                    let now = SystemTime::now().duration_since(UNIX_EPOCH)?;
                    println!("tick: {}:{}:{}", n, i, now.as_secs());
                } else {
                    thread::sleep(Duration::from_millis(50));
                }
            }

            Ok(())
        }));
    }

    for worker in workers {
        worker.join().expect("worker panicked")?;
    }

    Ok(())
}
