//! Circuit breaker over a sliding window of call outcomes.
//!
//! Stops calling a failing dependency once the failure rate over the
//! last N calls reaches a threshold, then probes it with a bounded
//! number of trial calls after a cooldown.

mod window;

pub use window::{CallOutcome, SlidingOutcomeWindow};

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::clock::{MonotonicClock, TimeSource};
use crate::error::{ErrorKind, ResilienceError};
use crate::events::EventListener;

/// Configuration for the circuit breaker.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Failure rate, in percent, at or above which the circuit opens.
    pub failure_rate_threshold: f32,
    /// How long the circuit stays open before admitting a trial call.
    pub wait_duration_in_open_state: Duration,
    /// Number of trial calls admitted in half-open state.
    pub permitted_calls_in_half_open: u32,
    /// Capacity of the sliding outcome window.
    pub sliding_window_size: usize,
    /// Successful calls slower than this are recorded as `Slow`.
    pub slow_call_duration: Option<Duration>,
    /// Error kinds recorded as failures; an empty list records every
    /// non-ignored kind.
    pub record: Vec<ErrorKind>,
    /// Error kinds that are never counted and never trip the breaker.
    pub ignore: Vec<ErrorKind>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_rate_threshold: 25.0,
            wait_duration_in_open_state: Duration::from_millis(25),
            permitted_calls_in_half_open: 1,
            sliding_window_size: 4,
            slow_call_duration: None,
            record: vec![
                ErrorKind::TaskTransient,
                ErrorKind::TaskFault,
                ErrorKind::TimedOut,
                ErrorKind::BulkheadFull,
                ErrorKind::ThreadPoolBulkheadFull,
            ],
            ignore: vec![ErrorKind::TaskIo],
        }
    }
}

impl CircuitBreakerConfig {
    /// Creates a configuration with the four window parameters; record
    /// and ignore sets keep their defaults.
    pub fn new(
        failure_rate_threshold: f32,
        wait_duration_in_open_state: Duration,
        permitted_calls_in_half_open: u32,
        sliding_window_size: usize,
    ) -> Self {
        Self {
            failure_rate_threshold,
            wait_duration_in_open_state,
            permitted_calls_in_half_open,
            sliding_window_size,
            ..Default::default()
        }
    }
}

/// The state of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls flow normally; outcomes fill the window.
    Closed,
    /// Calls are rejected until the open-state wait elapses.
    Open {
        /// When the circuit opened.
        since: Instant,
    },
    /// A bounded number of trial calls probe the dependency.
    HalfOpen,
}

impl CircuitState {
    fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open { .. } => "open",
            CircuitState::HalfOpen => "half-open",
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    window: SlidingOutcomeWindow,
    half_open_admitted: u32,
    half_open_successes: u32,
}

/// Circuit breaker gating calls on the window's failure rate.
///
/// Admission checks and outcome recording share one mutex, so no call is
/// admitted under a state that no longer holds when its outcome enters
/// the window. The lock is never held across the protected task's await.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    clock: Arc<dyn TimeSource>,
    listener: Option<Arc<dyn EventListener>>,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Creates a new circuit breaker with the given configuration.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        let window = SlidingOutcomeWindow::new(config.sliding_window_size);
        Self {
            name: "circuit-breaker".to_string(),
            config,
            clock: Arc::new(MonotonicClock),
            listener: None,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                window,
                half_open_admitted: 0,
                half_open_successes: 0,
            }),
        }
    }

    /// Creates a circuit breaker with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }

    /// Sets the breaker's name, used in rejections and events.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Replaces the time source; used by tests to drive transitions.
    pub fn with_clock(mut self, clock: Arc<dyn TimeSource>) -> Self {
        self.clock = clock;
        self
    }

    /// Installs an event listener.
    pub fn with_listener(mut self, listener: Arc<dyn EventListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Executes `task` if the current state permits it, recording the
    /// classified outcome.
    ///
    /// Rejections surface [`ResilienceError::CircuitOpen`], never the
    /// task's own error.
    pub async fn execute<F, Fut, T>(&self, task: F) -> Result<T, ResilienceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ResilienceError>>,
    {
        self.try_acquire_permission()?;

        let started = self.clock.now();
        let result = task().await;
        let elapsed = self.clock.now().saturating_duration_since(started);

        match &result {
            Ok(_) => self.record_success(elapsed),
            Err(error) => self.record_failure(error),
        }

        result
    }

    /// Checks whether a call may proceed, consuming a half-open slot if
    /// one is available.
    pub fn try_acquire_permission(&self) -> Result<(), ResilienceError> {
        let mut inner = self.inner.lock().unwrap();

        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open { since } => {
                let elapsed = self.clock.now().saturating_duration_since(since);
                if elapsed >= self.config.wait_duration_in_open_state {
                    self.transition(&mut inner, CircuitState::HalfOpen);
                    inner.half_open_admitted = 1;
                    if let Some(listener) = &self.listener {
                        listener.on_call_permitted(&self.name);
                    }
                    Ok(())
                } else {
                    let remaining = self.config.wait_duration_in_open_state - elapsed;
                    self.reject(Some(remaining))
                }
            }
            CircuitState::HalfOpen => {
                if inner.half_open_admitted < self.config.permitted_calls_in_half_open {
                    inner.half_open_admitted += 1;
                    Ok(())
                } else {
                    self.reject(None)
                }
            }
        }
    }

    /// Records a successful call outcome.
    pub fn record_success(&self, elapsed: Duration) {
        let mut inner = self.inner.lock().unwrap();
        let outcome = self.classify_success(elapsed);

        match inner.state {
            CircuitState::Closed => {
                inner.window.record(outcome);
                self.check_threshold(&mut inner);
            }
            CircuitState::HalfOpen => {
                inner.window.record(outcome);
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.permitted_calls_in_half_open {
                    inner.window.reset();
                    self.transition(&mut inner, CircuitState::Closed);
                }
            }
            CircuitState::Open { .. } => {
                // Late completion of a call admitted before opening.
            }
        }

        if let Some(listener) = &self.listener {
            listener.on_call_succeeded(&self.name, elapsed);
        }
    }

    /// Records a failed call outcome; ignored kinds never count.
    pub fn record_failure(&self, error: &ResilienceError) {
        let outcome = self.classify_error(error);
        let mut inner = self.inner.lock().unwrap();

        match outcome {
            CallOutcome::Ignored => {
                tracing::debug!(
                    breaker = %self.name,
                    kind = ?error.kind(),
                    "ignored error kind, not recorded"
                );
                if inner.state == CircuitState::HalfOpen && inner.half_open_admitted > 0 {
                    // The trial slot is returned; an ignored outcome
                    // proves nothing about the dependency.
                    inner.half_open_admitted -= 1;
                }
            }
            _ => match inner.state {
                CircuitState::Closed => {
                    inner.window.record(CallOutcome::Failure);
                    self.check_threshold(&mut inner);
                }
                CircuitState::HalfOpen => {
                    let now = self.clock.now();
                    inner.window.reset();
                    self.transition(&mut inner, CircuitState::Open { since: now });
                }
                CircuitState::Open { .. } => {}
            },
        }

        if let Some(listener) = &self.listener {
            listener.on_call_failed(&self.name, error);
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().unwrap().state
    }

    /// Failure rate in percent, once the window is full.
    pub fn failure_rate(&self) -> Option<f32> {
        self.inner.lock().unwrap().window.failure_rate()
    }

    /// Resets the breaker to closed with an empty window.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.window.reset();
        self.transition(&mut inner, CircuitState::Closed);
    }

    /// The breaker's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn classify_success(&self, elapsed: Duration) -> CallOutcome {
        match self.config.slow_call_duration {
            Some(budget) if elapsed > budget => CallOutcome::Slow,
            _ => CallOutcome::Success,
        }
    }

    fn classify_error(&self, error: &ResilienceError) -> CallOutcome {
        let kind = error.kind();
        if self.config.ignore.contains(&kind) {
            CallOutcome::Ignored
        } else if self.config.record.is_empty() || self.config.record.contains(&kind) {
            CallOutcome::Failure
        } else {
            CallOutcome::Ignored
        }
    }

    fn check_threshold(&self, inner: &mut BreakerInner) {
        if let Some(rate) = inner.window.failure_rate() {
            if rate >= self.config.failure_rate_threshold {
                tracing::warn!(
                    breaker = %self.name,
                    failure_rate = rate,
                    threshold = self.config.failure_rate_threshold,
                    "failure rate threshold exceeded"
                );
                let now = self.clock.now();
                inner.window.reset();
                self.transition(inner, CircuitState::Open { since: now });
            }
        }
    }

    fn transition(&self, inner: &mut BreakerInner, to: CircuitState) {
        let from = inner.state;
        if from.as_str() == to.as_str() {
            inner.state = to;
            return;
        }

        tracing::info!(
            breaker = %self.name,
            from = from.as_str(),
            to = to.as_str(),
            "circuit breaker state transition"
        );
        inner.state = to;
        inner.half_open_admitted = 0;
        inner.half_open_successes = 0;

        if let Some(listener) = &self.listener {
            listener.on_state_transition(&self.name, from.as_str(), to.as_str());
        }
    }

    fn reject(&self, retry_after: Option<Duration>) -> Result<(), ResilienceError> {
        if let Some(listener) = &self.listener {
            listener.on_call_rejected(&self.name, "circuit-open");
        }
        Err(ResilienceError::CircuitOpen {
            name: self.name.clone(),
            retry_after,
        })
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}
