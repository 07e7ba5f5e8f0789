use std::time::Duration;

/// Initialize logging for a given demo.
pub fn init_logging() {
    use tracing_subscriber::prelude::*;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_level(true)
                .with_thread_names(true)
                .compact(),
        )
        .init();
}

/// Assert that `actual` lies within `tolerance` of `expected`.
///
/// Limiter timing runs on a real thread, so tests compare against wall-clock
/// time with some slack for scheduling jitter.
#[track_caller]
pub fn assert_near(actual: Duration, expected: Duration, tolerance: Duration) {
    let diff = if actual > expected {
        actual - expected
    } else {
        expected - actual
    };

    assert! {
        diff <= tolerance,
        "expected {:?} (+/- {:?}), but was {:?}",
        expected,
        tolerance,
        actual,
    };
}
