//! Fixed-window rate limiter.
//!
//! A permit budget is restored at every window boundary; callers past
//! the budget either wait (bounded) for the next window or are rejected.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::clock::{MonotonicClock, TimeSource};
use crate::error::ResilienceError;
use crate::events::EventListener;

/// Configuration for the rate limiter.
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Permits granted per window.
    pub limit_for_period: u32,
    /// Window length; the budget resets at each boundary.
    pub limit_refresh_period: Duration,
    /// How long a caller may wait for the next window; zero means
    /// reject immediately once the budget is spent.
    pub timeout_duration: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            limit_for_period: 4,
            limit_refresh_period: Duration::from_millis(10_000),
            timeout_duration: Duration::ZERO,
        }
    }
}

impl RateLimiterConfig {
    /// Creates a new rate limiter configuration.
    pub fn new(
        limit_for_period: u32,
        limit_refresh_period: Duration,
        timeout_duration: Duration,
    ) -> Self {
        Self {
            limit_for_period,
            limit_refresh_period,
            timeout_duration,
        }
    }
}

#[derive(Debug)]
struct WindowState {
    window_start: Instant,
    remaining: u32,
}

/// Fixed-window admission limiter.
///
/// All state lives under one mutex, so racing callers are resolved
/// deterministically: a permit is handed out exactly once and the
/// budget is reset exactly once per boundary. Boundary refresh advances
/// the window start by whole periods, keeping windows aligned to the
/// first call rather than drifting with wall-clock scheduling.
pub struct RateLimiter {
    name: String,
    config: RateLimiterConfig,
    clock: Arc<dyn TimeSource>,
    listener: Option<Arc<dyn EventListener>>,
    state: Mutex<WindowState>,
}

impl RateLimiter {
    /// Creates a new rate limiter with the given configuration.
    pub fn new(config: RateLimiterConfig) -> Self {
        let clock: Arc<dyn TimeSource> = Arc::new(MonotonicClock);
        let state = WindowState {
            window_start: clock.now(),
            remaining: config.limit_for_period,
        };
        Self {
            name: "rate-limiter".to_string(),
            config,
            clock,
            listener: None,
            state: Mutex::new(state),
        }
    }

    /// Creates a rate limiter with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(RateLimiterConfig::default())
    }

    /// Sets the limiter's name, used in rejections and events.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Replaces the time source; resets the current window to now.
    pub fn with_clock(mut self, clock: Arc<dyn TimeSource>) -> Self {
        self.state = Mutex::new(WindowState {
            window_start: clock.now(),
            remaining: self.config.limit_for_period,
        });
        self.clock = clock;
        self
    }

    /// Installs an event listener.
    pub fn with_listener(mut self, listener: Arc<dyn EventListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Takes one permit from the current window without waiting.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        self.refresh(&mut state);

        if state.remaining > 0 {
            state.remaining -= 1;
            tracing::debug!(
                limiter = %self.name,
                remaining = state.remaining,
                "permit acquired"
            );
            true
        } else {
            false
        }
    }

    /// Acquires a permit, waiting up to `timeout_duration` for the next
    /// window when the current budget is spent.
    pub async fn acquire_permission(&self) -> Result<(), ResilienceError> {
        let deadline = self.clock.now() + self.config.timeout_duration;

        loop {
            let wait = {
                let mut state = self.state.lock().unwrap();
                self.refresh(&mut state);

                if state.remaining > 0 {
                    state.remaining -= 1;
                    if let Some(listener) = &self.listener {
                        listener.on_call_permitted(&self.name);
                    }
                    return Ok(());
                }

                let next_window = state.window_start + self.config.limit_refresh_period;
                if next_window > deadline {
                    tracing::info!(limiter = %self.name, "wait budget exhausted, call rejected");
                    if let Some(listener) = &self.listener {
                        listener.on_call_rejected(&self.name, "rate-limited");
                    }
                    return Err(ResilienceError::RateLimited {
                        name: self.name.clone(),
                    });
                }

                next_window.saturating_duration_since(self.clock.now())
            };

            tracing::debug!(limiter = %self.name, ?wait, "budget spent, waiting for next window");
            tokio::time::sleep(wait).await;
        }
    }

    /// Runs `task` once a permit is granted.
    pub async fn execute<F, Fut, T>(&self, task: F) -> Result<T, ResilienceError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, ResilienceError>>,
    {
        self.acquire_permission().await?;
        task().await
    }

    /// Permits left in the current window.
    pub fn available_permits(&self) -> u32 {
        let mut state = self.state.lock().unwrap();
        self.refresh(&mut state);
        state.remaining
    }

    /// Resets the window to now with a full budget.
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap();
        state.window_start = self.clock.now();
        state.remaining = self.config.limit_for_period;
    }

    /// The limiter's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Restores the budget if one or more boundaries have passed,
    /// advancing the window start by whole periods.
    fn refresh(&self, state: &mut WindowState) {
        let elapsed = self
            .clock
            .now()
            .saturating_duration_since(state.window_start);
        let period = self.config.limit_refresh_period;
        if elapsed >= period {
            let periods = elapsed.as_nanos() / period.as_nanos();
            state.window_start += period * periods as u32;
            state.remaining = self.config.limit_for_period;
        }
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("available_permits", &self.available_permits())
            .finish()
    }
}
