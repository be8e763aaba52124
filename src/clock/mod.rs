//! Monotonic time source used by the stateful primitives.
//!
//! The circuit breaker and rate limiter measure elapsed time against a
//! [`TimeSource`] rather than calling [`Instant::now`] directly, so their
//! state transitions can be driven deterministically in tests.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Provider of monotonic timestamps.
pub trait TimeSource: Send + Sync {
    /// Returns the current monotonic instant.
    fn now(&self) -> Instant;
}

/// Default time source backed by [`Instant::now`].
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl TimeSource for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced time source for tests.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    elapsed: Mutex<Duration>,
}

impl ManualClock {
    /// Creates a manual clock anchored at the current instant.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
        }
    }

    /// Advances the clock by `delta`.
    pub fn advance(&self, delta: Duration) {
        let mut elapsed = self.elapsed.lock().unwrap();
        *elapsed += delta;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> Instant {
        let elapsed = *self.elapsed.lock().unwrap();
        self.origin + elapsed
    }
}
