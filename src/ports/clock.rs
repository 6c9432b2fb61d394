//! Clock implementations.

use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::time::{Duration, Instant};

use super::Clock;

/// Production clock: real `Instant`s and `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Test clock. `sleep` resolves immediately, advances virtual time by the
/// requested amount, and records the request so tests can assert on the
/// schedule the caller asked for.
#[derive(Debug)]
pub struct ManualClock {
    start: Instant,
    offset: Mutex<Duration>,
    slept: Mutex<Vec<Duration>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
            slept: Mutex::new(Vec::new()),
        }
    }

    /// Advance virtual time without recording a sleep.
    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }

    /// Durations passed to `sleep`, in call order.
    #[must_use]
    pub fn recorded_sleeps(&self) -> Vec<Duration> {
        self.slept.lock().clone()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + *self.offset.lock()
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        self.slept.lock().push(duration);
        *self.offset.lock() += duration;
        // Still a suspension point: callers polling in a loop must not be
        // able to starve the executor just because time is virtual.
        Box::pin(tokio::task::yield_now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_manual_clock_records_and_advances() {
        let clock = ManualClock::new();
        let before = clock.now();
        clock.sleep(Duration::from_millis(250)).await;
        clock.sleep(Duration::from_millis(750)).await;
        assert_eq!(clock.now() - before, Duration::from_secs(1));
        assert_eq!(
            clock.recorded_sleeps(),
            vec![Duration::from_millis(250), Duration::from_millis(750)]
        );
    }
}
