//! Builds every primitive once from the configuration surface.

use std::sync::Arc;
use std::time::Duration;

use crate::bulkhead::{Bulkhead, BulkheadConfig, ThreadPoolBulkhead, ThreadPoolBulkheadConfig};
use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::config::{ConfigError, PatternsConfig};
use crate::events::EventListener;
use crate::rate_limiter::{RateLimiter, RateLimiterConfig};
use crate::retry::{Retry, RetryConfig};
use crate::time_limiter::{TimeLimiter, TimeLimiterConfig};

/// Name of the time limiter instance.
pub const TIME_LIMITER: &str = "time-limiter";
/// Name of the semaphore bulkhead instance.
pub const SEMAPHORE_BULKHEAD: &str = "semaphore-bulkhead";
/// Name of the thread-pool bulkhead instance.
pub const THREAD_POOL_BULKHEAD: &str = "thread-pool-bulkhead";
/// Name of the retry executor instance.
pub const RETRY: &str = "retry";
/// Name of the circuit breaker instance.
pub const CIRCUIT_BREAKER: &str = "circuit-breaker";
/// Name of the rate limiter instance.
pub const RATE_LIMITER: &str = "rate-limiter";

/// One instance of each primitive, built from configuration at process
/// start and shared by every call site for the process lifetime.
pub struct PatternsFactory {
    /// Retry executor.
    pub retry: Arc<Retry>,
    /// Time limiter policy.
    pub time_limiter: TimeLimiter,
    /// Circuit breaker.
    pub circuit_breaker: Arc<CircuitBreaker>,
    /// Semaphore bulkhead.
    pub bulkhead: Arc<Bulkhead>,
    /// Thread-pool bulkhead.
    pub thread_pool_bulkhead: Arc<ThreadPoolBulkhead>,
    /// Rate limiter.
    pub rate_limiter: Arc<RateLimiter>,
}

impl PatternsFactory {
    /// Validates `config` and builds all six primitives.
    ///
    /// Must be called inside a Tokio runtime; the thread-pool bulkhead
    /// spawns its core workers here.
    pub fn from_config(config: &PatternsConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config, None))
    }

    /// Like [`from_config`](Self::from_config) with an event listener
    /// installed on every primitive.
    pub fn from_config_with_listener(
        config: &PatternsConfig,
        listener: Arc<dyn EventListener>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config, Some(listener)))
    }

    /// Builds all primitives from the default configuration.
    pub fn with_defaults() -> Self {
        Self::build(&PatternsConfig::default(), None)
    }

    fn build(config: &PatternsConfig, listener: Option<Arc<dyn EventListener>>) -> Self {
        let retry_config = RetryConfig::new(
            config.retry.max_attempts,
            Duration::from_millis(config.retry.initial_interval_millis),
            config.retry.multiplier,
        );
        let time_limiter_config = TimeLimiterConfig::new(
            Duration::from_millis(config.time_limiter.wait_time_duration),
            true,
        );
        let breaker_config = CircuitBreakerConfig::new(
            config.circuit_breaker.failure_rate_threshold,
            Duration::from_millis(config.circuit_breaker.wait_time_duration),
            config
                .circuit_breaker
                .permitted_number_of_calls_in_half_open_state,
            config.circuit_breaker.sliding_window_size,
        );
        let bulkhead_config = BulkheadConfig::new(config.bulkhead.number_of_threads, Duration::ZERO);
        let pool_config = ThreadPoolBulkheadConfig::sized_for(config.bulkhead.number_of_threads);
        let limiter_config = RateLimiterConfig::new(
            config.rate_limiter.limit_for_period,
            Duration::from_millis(config.rate_limiter.window_in_milliseconds),
            Duration::from_millis(config.rate_limiter.wait_time_for_thread),
        );

        tracing::info!(
            max_pool_size = pool_config.max_pool_size,
            core_pool_size = pool_config.core_pool_size,
            max_concurrent_calls = bulkhead_config.max_concurrent_calls,
            "building resilience primitives"
        );

        let mut retry = Retry::new(retry_config).with_name(RETRY);
        let mut time_limiter = TimeLimiter::new(time_limiter_config).with_name(TIME_LIMITER);
        let mut circuit_breaker = CircuitBreaker::new(breaker_config).with_name(CIRCUIT_BREAKER);
        let mut bulkhead = Bulkhead::new(bulkhead_config).with_name(SEMAPHORE_BULKHEAD);
        let mut thread_pool_bulkhead =
            ThreadPoolBulkhead::new(pool_config).with_name(THREAD_POOL_BULKHEAD);
        let mut rate_limiter = RateLimiter::new(limiter_config).with_name(RATE_LIMITER);

        if let Some(listener) = listener {
            retry = retry.with_listener(listener.clone());
            time_limiter = time_limiter.with_listener(listener.clone());
            circuit_breaker = circuit_breaker.with_listener(listener.clone());
            bulkhead = bulkhead.with_listener(listener.clone());
            thread_pool_bulkhead = thread_pool_bulkhead.with_listener(listener.clone());
            rate_limiter = rate_limiter.with_listener(listener);
        }

        Self {
            retry: Arc::new(retry),
            time_limiter,
            circuit_breaker: Arc::new(circuit_breaker),
            bulkhead: Arc::new(bulkhead),
            thread_pool_bulkhead: Arc::new(thread_pool_bulkhead),
            rate_limiter: Arc::new(rate_limiter),
        }
    }
}

impl std::fmt::Debug for PatternsFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatternsFactory")
            .field("circuit_breaker", &self.circuit_breaker)
            .field("bulkhead", &self.bulkhead)
            .field("rate_limiter", &self.rate_limiter)
            .finish()
    }
}
