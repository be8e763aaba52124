//! Configuration surface for the resilience engine.
//!
//! These structs carry the options recognized by the engine; an external
//! configuration loader (YAML or otherwise) deserializes into
//! [`PatternsConfig`] and hands it to
//! [`PatternsFactory`](crate::service::PatternsFactory). Field names
//! follow the camelCase keys of the reference configuration file.

use serde::Deserialize;
use thiserror::Error;

/// Default initial retry interval in milliseconds.
pub const DEFAULT_RETRY_INITIAL_INTERVAL_MILLIS: u64 = 500;

/// Default exponential backoff multiplier.
pub const DEFAULT_RETRY_MULTIPLIER: f64 = 5.0;

/// Default maximum retry attempts (including the first call).
pub const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 5;

/// Default time-limiter deadline in milliseconds.
pub const DEFAULT_TIME_LIMITER_MILLIS: u64 = 3_000;

/// Default circuit breaker failure-rate threshold, in percent.
pub const DEFAULT_FAILURE_RATE_THRESHOLD: f32 = 25.0;

/// Default open-state wait in milliseconds.
pub const DEFAULT_WAIT_IN_OPEN_STATE_MILLIS: u64 = 25;

/// Default number of trial calls permitted in half-open state.
pub const DEFAULT_PERMITTED_CALLS_IN_HALF_OPEN: u32 = 1;

/// Default sliding window size.
pub const DEFAULT_SLIDING_WINDOW_SIZE: usize = 4;

/// Default bulkhead concurrency (and thread-pool size).
pub const DEFAULT_NUMBER_OF_THREADS: usize = 4;

/// Default rate-limiter permits per window.
pub const DEFAULT_LIMIT_FOR_PERIOD: u32 = 4;

/// Default rate-limiter window length in milliseconds.
pub const DEFAULT_WINDOW_MILLIS: u64 = 10_000;

/// Default rate-limiter wait budget in milliseconds.
pub const DEFAULT_RATE_LIMITER_WAIT_MILLIS: u64 = 0;

/// Error raised when a configuration value is rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A value failed validation; `key` names the offending option.
    #[error("Invalid configuration for '{key}': {message}")]
    InvalidValue {
        /// Dotted key of the rejected option.
        key: String,
        /// Human-readable rejection reason.
        message: String,
    },
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}

/// Retry options.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrySettings {
    /// Initial backoff interval in milliseconds.
    pub initial_interval_millis: u64,
    /// Exponential backoff multiplier.
    pub multiplier: f64,
    /// Maximum attempts, including the first call.
    pub max_attempts: u32,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            initial_interval_millis: DEFAULT_RETRY_INITIAL_INTERVAL_MILLIS,
            multiplier: DEFAULT_RETRY_MULTIPLIER,
            max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
        }
    }
}

/// Time limiter options.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimeLimiterSettings {
    /// Deadline for the protected call, in milliseconds.
    pub wait_time_duration: u64,
}

impl Default for TimeLimiterSettings {
    fn default() -> Self {
        Self {
            wait_time_duration: DEFAULT_TIME_LIMITER_MILLIS,
        }
    }
}

/// Circuit breaker options.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CircuitBreakerSettings {
    /// Failure rate, in percent, at or above which the circuit opens.
    pub failure_rate_threshold: f32,
    /// Open-state wait before probing, in milliseconds.
    pub wait_time_duration: u64,
    /// Trial calls admitted in half-open state.
    pub permitted_number_of_calls_in_half_open_state: u32,
    /// Number of call outcomes kept in the sliding window.
    pub sliding_window_size: usize,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_rate_threshold: DEFAULT_FAILURE_RATE_THRESHOLD,
            wait_time_duration: DEFAULT_WAIT_IN_OPEN_STATE_MILLIS,
            permitted_number_of_calls_in_half_open_state: DEFAULT_PERMITTED_CALLS_IN_HALF_OPEN,
            sliding_window_size: DEFAULT_SLIDING_WINDOW_SIZE,
        }
    }
}

/// Bulkhead options; the same thread count sizes both bulkhead flavors.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BulkheadSettings {
    /// Concurrent-call limit and maximum worker count.
    pub number_of_threads: usize,
}

impl Default for BulkheadSettings {
    fn default() -> Self {
        Self {
            number_of_threads: DEFAULT_NUMBER_OF_THREADS,
        }
    }
}

/// Rate limiter options.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RateLimiterSettings {
    /// Permits granted per window.
    pub limit_for_period: u32,
    /// Window length in milliseconds.
    pub window_in_milliseconds: u64,
    /// How long a caller may wait for the next window, in milliseconds.
    pub wait_time_for_thread: u64,
}

impl Default for RateLimiterSettings {
    fn default() -> Self {
        Self {
            limit_for_period: DEFAULT_LIMIT_FOR_PERIOD,
            window_in_milliseconds: DEFAULT_WINDOW_MILLIS,
            wait_time_for_thread: DEFAULT_RATE_LIMITER_WAIT_MILLIS,
        }
    }
}

/// Root configuration for all six primitives.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PatternsConfig {
    /// Retry options.
    pub retry: RetrySettings,
    /// Time limiter options.
    pub time_limiter: TimeLimiterSettings,
    /// Circuit breaker options.
    pub circuit_breaker: CircuitBreakerSettings,
    /// Bulkhead options.
    pub bulkhead: BulkheadSettings,
    /// Rate limiter options.
    pub rate_limiter: RateLimiterSettings,
}

impl PatternsConfig {
    /// Validates every section, returning the first rejected option.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.maxAttempts", "must be at least 1"));
        }
        if self.retry.multiplier < 1.0 {
            return Err(invalid("retry.multiplier", "must be at least 1.0"));
        }
        if self.time_limiter.wait_time_duration == 0 {
            return Err(invalid("timeLimiter.waitTimeDuration", "must be positive"));
        }
        if !(0.0..=100.0).contains(&self.circuit_breaker.failure_rate_threshold)
            || self.circuit_breaker.failure_rate_threshold == 0.0
        {
            return Err(invalid(
                "circuitBreaker.failureRateThreshold",
                "must be in (0, 100]",
            ));
        }
        if self.circuit_breaker.sliding_window_size == 0 {
            return Err(invalid(
                "circuitBreaker.slidingWindowSize",
                "must be positive",
            ));
        }
        if self.circuit_breaker.permitted_number_of_calls_in_half_open_state == 0 {
            return Err(invalid(
                "circuitBreaker.permittedNumberOfCallsInHalfOpenState",
                "must be at least 1",
            ));
        }
        if self.bulkhead.number_of_threads == 0 {
            return Err(invalid("bulkhead.numberOfThreads", "must be at least 1"));
        }
        if self.rate_limiter.limit_for_period == 0 {
            return Err(invalid("rateLimiter.limitForPeriod", "must be at least 1"));
        }
        if self.rate_limiter.window_in_milliseconds == 0 {
            return Err(invalid(
                "rateLimiter.windowInMilliseconds",
                "must be positive",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_are_valid() {
        let config = PatternsConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.circuit_breaker.sliding_window_size, 4);
        assert_eq!(config.rate_limiter.limit_for_period, 4);
    }

    #[test]
    fn test_recognizes_camel_case_keys() {
        let raw = serde_json::json!({
            "retry": {
                "initialIntervalMillis": 500,
                "multiplier": 5.0,
                "maxAttempts": 5
            },
            "timeLimiter": { "waitTimeDuration": 3000 },
            "circuitBreaker": {
                "failureRateThreshold": 25.0,
                "waitTimeDuration": 25,
                "permittedNumberOfCallsInHalfOpenState": 1,
                "slidingWindowSize": 4
            },
            "bulkhead": { "numberOfThreads": 4 },
            "rateLimiter": {
                "limitForPeriod": 4,
                "windowInMilliseconds": 10000,
                "waitTimeForThread": 0
            }
        });

        let config: PatternsConfig = serde_json::from_value(raw).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.retry.initial_interval_millis, 500);
        assert_eq!(config.circuit_breaker.wait_time_duration, 25);
        assert_eq!(config.rate_limiter.window_in_milliseconds, 10_000);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let raw = serde_json::json!({
            "retry": { "maxAttempts": 3 }
        });

        let config: PatternsConfig = serde_json::from_value(raw).unwrap();
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(
            config.retry.initial_interval_millis,
            DEFAULT_RETRY_INITIAL_INTERVAL_MILLIS
        );
        assert_eq!(config.bulkhead.number_of_threads, DEFAULT_NUMBER_OF_THREADS);
    }

    #[test]
    fn test_rejects_zero_attempts() {
        let config = PatternsConfig {
            retry: RetrySettings {
                max_attempts: 0,
                ..Default::default()
            },
            ..Default::default()
        };

        let err = config.validate().unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "retry.maxAttempts")
        );
    }

    #[test]
    fn test_rejects_out_of_range_threshold() {
        let config = PatternsConfig {
            circuit_breaker: CircuitBreakerSettings {
                failure_rate_threshold: 120.0,
                ..Default::default()
            },
            ..Default::default()
        };

        assert!(config.validate().is_err());
    }
}
