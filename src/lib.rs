//! # Resilience Engine
//!
//! Composable call-protection primitives for asynchronous work:
//! circuit breaker, semaphore bulkhead, thread-pool bulkhead,
//! fixed-window rate limiter, exponential-backoff retry, and a
//! call-deadline time limiter, chained by a decorator pipeline that
//! routes failure kinds to typed fallback producers.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use resilience_engine::{DecoratedCalls, PatternsConfig, PatternsFactory, ResilienceError};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PatternsConfig::default();
//!     let calls = DecoratedCalls::new(PatternsFactory::from_config(&config)?);
//!
//!     let offerings = calls
//!         .call_with_bulkhead_and_fallback(
//!             || async { Ok::<_, ResilienceError>("payload".to_string()) },
//!             |reason| format!("degraded: {reason}"),
//!         )
//!         .await?;
//!     println!("{offerings}");
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - `clock` - Monotonic time source, injectable for tests
//! - `config` - Configuration surface and validation
//! - `error` - Error taxonomy (`ResilienceError`, `TaskError`)
//! - `events` - Optional lifecycle-event listener
//! - `circuit_breaker` - State machine over a sliding outcome window
//! - `bulkhead` - Semaphore and thread-pool bulkheads
//! - `rate_limiter` - Fixed-window admission limiter
//! - `retry` - Exponential-backoff retry
//! - `time_limiter` - Deadline enforcement with optional cancellation
//! - `pipeline` - Decorator pipeline and fallback routing
//! - `service` - Primitive factory and named call-site handles

#![warn(missing_docs)]
#![warn(clippy::all)]

// Public modules
pub mod bulkhead;
pub mod circuit_breaker;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod pipeline;
pub mod rate_limiter;
pub mod retry;
pub mod service;
pub mod time_limiter;

// Re-exports for convenience
pub use bulkhead::{
    Bulkhead, BulkheadConfig, TaskHandle, ThreadPoolBulkhead, ThreadPoolBulkheadConfig,
};
pub use circuit_breaker::{
    CallOutcome, CircuitBreaker, CircuitBreakerConfig, CircuitState, SlidingOutcomeWindow,
};
pub use clock::{ManualClock, MonotonicClock, TimeSource};
pub use config::{
    BulkheadSettings, CircuitBreakerSettings, ConfigError, PatternsConfig, RateLimiterSettings,
    RetrySettings, TimeLimiterSettings,
};
pub use error::{ErrorKind, ResilienceError, ResilienceResult, TaskError};
pub use events::{EventListener, TracingEventListener};
pub use pipeline::{DecoratorPipeline, DecoratorPipelineBuilder, FallbackMap};
pub use rate_limiter::{RateLimiter, RateLimiterConfig};
pub use retry::{DefaultRetryPolicy, KindRetryPolicy, Retry, RetryConfig, RetryPolicy};
pub use service::{DecoratedCalls, PatternsFactory};
pub use time_limiter::{TimeLimiter, TimeLimiterConfig};
