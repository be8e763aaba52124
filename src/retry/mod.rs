//! Retry with exponential backoff over retryable failures.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use crate::error::{ErrorKind, ResilienceError};
use crate::events::EventListener;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum attempts, including the first call.
    pub max_attempts: u32,
    /// Backoff before the second attempt.
    pub initial_interval: Duration,
    /// Multiplier applied to the backoff after each attempt.
    pub multiplier: f64,
    /// Ceiling on any single backoff interval.
    pub max_interval: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_interval: Duration::from_millis(500),
            multiplier: 5.0,
            max_interval: Duration::from_secs(60),
        }
    }
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new(max_attempts: u32, initial_interval: Duration, multiplier: f64) -> Self {
        Self {
            max_attempts,
            initial_interval,
            multiplier,
            ..Default::default()
        }
    }

    /// Creates a configuration that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Backoff before the given attempt (1-based); the first attempt
    /// runs immediately.
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exponent = (attempt - 2) as i32;
        let factor = self.multiplier.powi(exponent);
        let backoff = self.initial_interval.as_secs_f64() * factor;
        Duration::from_secs_f64(backoff.min(self.max_interval.as_secs_f64()))
    }
}

/// Decides which failures are worth another attempt.
pub trait RetryPolicy: Send + Sync {
    /// Returns true if the error should be retried.
    fn is_retryable(&self, error: &ResilienceError) -> bool;
}

/// Default policy: retry what [`ResilienceError::is_retryable`] allows.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultRetryPolicy;

impl RetryPolicy for DefaultRetryPolicy {
    fn is_retryable(&self, error: &ResilienceError) -> bool {
        error.is_retryable()
    }
}

/// Policy retrying an explicit set of error kinds.
#[derive(Debug, Clone)]
pub struct KindRetryPolicy {
    kinds: Vec<ErrorKind>,
}

impl KindRetryPolicy {
    /// Creates a policy retrying exactly the given kinds.
    pub fn new(kinds: Vec<ErrorKind>) -> Self {
        Self { kinds }
    }
}

impl RetryPolicy for KindRetryPolicy {
    fn is_retryable(&self, error: &ResilienceError) -> bool {
        self.kinds.contains(&error.kind())
    }
}

/// Executes tasks, re-invoking them on retryable failures.
pub struct Retry {
    name: String,
    config: RetryConfig,
    policy: Arc<dyn RetryPolicy>,
    listener: Option<Arc<dyn EventListener>>,
}

impl Retry {
    /// Creates a retry executor with the default policy.
    pub fn new(config: RetryConfig) -> Self {
        Self {
            name: "retry".to_string(),
            config,
            policy: Arc::new(DefaultRetryPolicy),
            listener: None,
        }
    }

    /// Creates a retry executor with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(RetryConfig::default())
    }

    /// Sets the executor's name, used in events.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Replaces the retryability policy.
    pub fn with_policy(mut self, policy: Arc<dyn RetryPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Installs an event listener.
    pub fn with_listener(mut self, listener: Arc<dyn EventListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Runs `task`, retrying retryable failures with exponential
    /// backoff.
    ///
    /// A success on any attempt returns immediately. A non-retryable
    /// failure propagates unchanged without consuming further attempts.
    /// Exhausting the budget returns
    /// [`ResilienceError::RetryExhausted`] carrying the last failure.
    pub async fn execute<F, Fut, T>(&self, task: F) -> Result<T, ResilienceError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ResilienceError>>,
    {
        let mut attempt = 1;

        loop {
            match task().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(
                            retry = %self.name,
                            attempt,
                            "call succeeded after retries"
                        );
                    }
                    return Ok(value);
                }
                Err(error) if !self.policy.is_retryable(&error) => {
                    tracing::debug!(
                        retry = %self.name,
                        kind = ?error.kind(),
                        "non-retryable failure, propagating"
                    );
                    return Err(error);
                }
                Err(error) => {
                    if attempt >= self.config.max_attempts {
                        tracing::warn!(
                            retry = %self.name,
                            attempts = attempt,
                            %error,
                            "retry budget exhausted"
                        );
                        return Err(ResilienceError::RetryExhausted {
                            attempts: attempt,
                            last: Box::new(error),
                        });
                    }

                    attempt += 1;
                    let backoff = self.config.backoff_for_attempt(attempt);
                    tracing::info!(
                        retry = %self.name,
                        attempt,
                        ?backoff,
                        %error,
                        "retrying after backoff"
                    );
                    if let Some(listener) = &self.listener {
                        listener.on_retry(&self.name, attempt, backoff);
                    }
                    sleep(backoff).await;
                }
            }
        }
    }

    /// The executor's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The retry configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}

impl std::fmt::Debug for Retry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retry")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaskError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transient() -> ResilienceError {
        ResilienceError::Task(TaskError::transient("degraded"))
    }

    fn quick_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_interval: Duration::from_millis(1),
            multiplier: 2.0,
            max_interval: Duration::from_millis(10),
        }
    }

    #[test]
    fn test_backoff_grows_exponentially() {
        let config = RetryConfig::new(5, Duration::from_millis(500), 5.0);

        assert_eq!(config.backoff_for_attempt(1), Duration::ZERO);
        assert_eq!(config.backoff_for_attempt(2), Duration::from_millis(500));
        assert_eq!(config.backoff_for_attempt(3), Duration::from_millis(2_500));
        assert_eq!(config.backoff_for_attempt(4), Duration::from_millis(12_500));
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = RetryConfig {
            max_attempts: 10,
            initial_interval: Duration::from_secs(30),
            multiplier: 10.0,
            max_interval: Duration::from_secs(60),
        };

        assert_eq!(config.backoff_for_attempt(4), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_succeeds_on_second_attempt() {
        let retry = Retry::new(quick_config(5));
        let attempts = AtomicU32::new(0);

        let result = retry
            .execute(|| async {
                let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 2 {
                    Err(transient())
                } else {
                    Ok("recovered")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "recovered");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_exhaustion_wraps_last_failure() {
        let retry = Retry::new(quick_config(5));
        let attempts = AtomicU32::new(0);

        let result: Result<(), _> = retry
            .execute(|| async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(transient())
            })
            .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 5);
        match result {
            Err(ResilienceError::RetryExhausted { attempts, last }) => {
                assert_eq!(attempts, 5);
                assert!(matches!(
                    *last,
                    ResilienceError::Task(TaskError::TransientOutage { .. })
                ));
            }
            other => panic!("expected RetryExhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_retryable_propagates_immediately() {
        let retry = Retry::new(quick_config(5));
        let attempts = AtomicU32::new(0);

        let result: Result<(), _> = retry
            .execute(|| async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(ResilienceError::Task(TaskError::io("connection reset")))
            })
            .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(matches!(
            result,
            Err(ResilienceError::Task(TaskError::Io { .. }))
        ));
    }

    #[tokio::test]
    async fn test_kind_policy_widens_retry_set() {
        let retry = Retry::new(quick_config(3)).with_policy(Arc::new(KindRetryPolicy::new(vec![
            ErrorKind::TaskTransient,
            ErrorKind::TimedOut,
        ])));
        let attempts = AtomicU32::new(0);

        let result: Result<(), _> = retry
            .execute(|| async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(ResilienceError::TimedOut {
                    duration: Duration::from_millis(10),
                })
            })
            .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert!(matches!(
            result,
            Err(ResilienceError::RetryExhausted { .. })
        ));
    }

    #[tokio::test]
    async fn test_single_attempt_config_never_retries() {
        let retry = Retry::new(RetryConfig::no_retry());
        let attempts = AtomicU32::new(0);

        let result: Result<(), _> = retry
            .execute(|| async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(transient())
            })
            .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(matches!(
            result,
            Err(ResilienceError::RetryExhausted { attempts: 1, .. })
        ));
    }
}
