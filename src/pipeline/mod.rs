//! Decorator pipeline chaining protection stages around one task.
//!
//! Stage order, outermost to innermost, is fixed: retry, circuit
//! breaker, rate limiter, bulkhead (semaphore or thread-pool), time
//! limiter, task. Callers pick a subset; omitted stages are simply
//! absent and the relative order of the rest is preserved.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use crate::bulkhead::{Bulkhead, ThreadPoolBulkhead};
use crate::circuit_breaker::CircuitBreaker;
use crate::error::{ErrorKind, ResilienceError};
use crate::rate_limiter::RateLimiter;
use crate::retry::Retry;
use crate::time_limiter::TimeLimiter;

type FallbackFn<T> = Arc<dyn Fn(&ResilienceError) -> T + Send + Sync>;

/// Routes error kinds to fallback producers.
///
/// Lookup is most-specific-first: an exact kind handler wins over the
/// task-failure umbrella, which wins over the catch-all.
pub struct FallbackMap<T> {
    by_kind: HashMap<ErrorKind, FallbackFn<T>>,
    on_task: Option<FallbackFn<T>>,
    catch_all: Option<FallbackFn<T>>,
}

impl<T> FallbackMap<T> {
    /// Creates an empty map; every error propagates.
    pub fn new() -> Self {
        Self {
            by_kind: HashMap::new(),
            on_task: None,
            catch_all: None,
        }
    }

    /// Registers a fallback for one exact error kind.
    pub fn on<F>(mut self, kind: ErrorKind, fallback: F) -> Self
    where
        F: Fn(&ResilienceError) -> T + Send + Sync + 'static,
    {
        self.by_kind.insert(kind, Arc::new(fallback));
        self
    }

    /// Registers a fallback for any task failure not matched exactly.
    pub fn on_task_failure<F>(mut self, fallback: F) -> Self
    where
        F: Fn(&ResilienceError) -> T + Send + Sync + 'static,
    {
        self.on_task = Some(Arc::new(fallback));
        self
    }

    /// Registers a fallback for anything not matched above.
    pub fn on_any<F>(mut self, fallback: F) -> Self
    where
        F: Fn(&ResilienceError) -> T + Send + Sync + 'static,
    {
        self.catch_all = Some(Arc::new(fallback));
        self
    }

    /// Produces a fallback value for `error`, most specific match
    /// first, or `None` when nothing is registered for it.
    pub fn recover(&self, error: &ResilienceError) -> Option<T> {
        let kind = error.kind();
        if let Some(fallback) = self.by_kind.get(&kind) {
            return Some(fallback(error));
        }
        if kind.is_task() {
            if let Some(fallback) = &self.on_task {
                return Some(fallback(error));
            }
        }
        self.catch_all.as_ref().map(|fallback| fallback(error))
    }

    /// Returns true when no fallback is registered.
    pub fn is_empty(&self) -> bool {
        self.by_kind.is_empty() && self.on_task.is_none() && self.catch_all.is_none()
    }
}

impl<T> Default for FallbackMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for FallbackMap<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackMap")
            .field("kinds", &self.by_kind.keys().collect::<Vec<_>>())
            .field("on_task", &self.on_task.is_some())
            .field("catch_all", &self.catch_all.is_some())
            .finish()
    }
}

/// Builder for [`DecoratorPipeline`].
///
/// The semaphore and thread-pool bulkheads occupy the same stage slot;
/// setting one clears the other.
#[derive(Default)]
pub struct DecoratorPipelineBuilder {
    retry: Option<Arc<Retry>>,
    circuit_breaker: Option<Arc<CircuitBreaker>>,
    rate_limiter: Option<Arc<RateLimiter>>,
    bulkhead: Option<Arc<Bulkhead>>,
    thread_pool_bulkhead: Option<Arc<ThreadPoolBulkhead>>,
    time_limiter: Option<TimeLimiter>,
}

impl DecoratorPipelineBuilder {
    /// Adds the retry stage.
    pub fn with_retry(mut self, retry: Arc<Retry>) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Adds the circuit breaker stage.
    pub fn with_circuit_breaker(mut self, circuit_breaker: Arc<CircuitBreaker>) -> Self {
        self.circuit_breaker = Some(circuit_breaker);
        self
    }

    /// Adds the rate limiter stage.
    pub fn with_rate_limiter(mut self, rate_limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = Some(rate_limiter);
        self
    }

    /// Adds the semaphore bulkhead stage.
    pub fn with_bulkhead(mut self, bulkhead: Arc<Bulkhead>) -> Self {
        self.bulkhead = Some(bulkhead);
        self.thread_pool_bulkhead = None;
        self
    }

    /// Adds the thread-pool bulkhead stage.
    pub fn with_thread_pool_bulkhead(mut self, bulkhead: Arc<ThreadPoolBulkhead>) -> Self {
        self.thread_pool_bulkhead = Some(bulkhead);
        self.bulkhead = None;
        self
    }

    /// Adds the time limiter stage.
    pub fn with_time_limiter(mut self, time_limiter: TimeLimiter) -> Self {
        self.time_limiter = Some(time_limiter);
        self
    }

    /// Builds the pipeline.
    pub fn build(self) -> DecoratorPipeline {
        DecoratorPipeline {
            retry: self.retry,
            circuit_breaker: self.circuit_breaker,
            rate_limiter: self.rate_limiter,
            bulkhead: self.bulkhead,
            thread_pool_bulkhead: self.thread_pool_bulkhead,
            time_limiter: self.time_limiter,
        }
    }
}

/// Composes configured primitives around a zero-argument task.
///
/// The pipeline holds no call state of its own; all state lives in the
/// shared primitives, so one pipeline is built per call-site and reused
/// across calls.
#[derive(Clone)]
pub struct DecoratorPipeline {
    retry: Option<Arc<Retry>>,
    circuit_breaker: Option<Arc<CircuitBreaker>>,
    rate_limiter: Option<Arc<RateLimiter>>,
    bulkhead: Option<Arc<Bulkhead>>,
    thread_pool_bulkhead: Option<Arc<ThreadPoolBulkhead>>,
    time_limiter: Option<TimeLimiter>,
}

impl DecoratorPipeline {
    /// Starts an empty pipeline builder.
    pub fn builder() -> DecoratorPipelineBuilder {
        DecoratorPipelineBuilder::default()
    }

    /// Runs `task` through every configured stage.
    pub async fn execute<F, Fut, T>(&self, task: F) -> Result<T, ResilienceError>
    where
        F: Fn() -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ResilienceError>> + Send + 'static,
        T: Send + 'static,
    {
        match &self.retry {
            Some(retry) => retry.execute(|| self.guarded(task.clone())).await,
            None => self.guarded(task).await,
        }
    }

    /// Runs `task` through every configured stage, converting a failure
    /// into a registered fallback value.
    ///
    /// Conversion is terminal: the fallback result is returned as
    /// success and never re-enters any stage. Exactly one outcome —
    /// success, fallback value, or unrecovered error — results per
    /// invocation.
    pub async fn execute_with_fallback<F, Fut, T>(
        &self,
        task: F,
        fallbacks: &FallbackMap<T>,
    ) -> Result<T, ResilienceError>
    where
        F: Fn() -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ResilienceError>> + Send + 'static,
        T: Send + 'static,
    {
        match self.execute(task).await {
            Ok(value) => Ok(value),
            Err(error) => match fallbacks.recover(&error) {
                Some(value) => {
                    tracing::info!(reason = error.reason(), "failure recovered by fallback");
                    Ok(value)
                }
                None => Err(error),
            },
        }
    }

    /// Circuit breaker stage.
    async fn guarded<F, Fut, T>(&self, task: F) -> Result<T, ResilienceError>
    where
        F: Fn() -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ResilienceError>> + Send + 'static,
        T: Send + 'static,
    {
        match &self.circuit_breaker {
            Some(circuit_breaker) => circuit_breaker.execute(|| self.admitted(task)).await,
            None => self.admitted(task).await,
        }
    }

    /// Rate limiter stage.
    async fn admitted<F, Fut, T>(&self, task: F) -> Result<T, ResilienceError>
    where
        F: Fn() -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ResilienceError>> + Send + 'static,
        T: Send + 'static,
    {
        if let Some(rate_limiter) = &self.rate_limiter {
            rate_limiter.acquire_permission().await?;
        }
        self.isolated(task).await
    }

    /// Bulkhead stage; the thread-pool flavor owns the time limiter's
    /// deadline over its completion handle.
    async fn isolated<F, Fut, T>(&self, task: F) -> Result<T, ResilienceError>
    where
        F: Fn() -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ResilienceError>> + Send + 'static,
        T: Send + 'static,
    {
        if let Some(pool) = &self.thread_pool_bulkhead {
            let handle = pool.submit(task)?;
            return match &self.time_limiter {
                Some(time_limiter) => time_limiter.limit(handle).await,
                None => handle.await,
            };
        }

        match &self.bulkhead {
            Some(bulkhead) => bulkhead.execute(|| self.timed(task)).await,
            None => self.timed(task).await,
        }
    }

    /// Time limiter stage.
    async fn timed<F, Fut, T>(&self, task: F) -> Result<T, ResilienceError>
    where
        F: Fn() -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ResilienceError>> + Send + 'static,
        T: Send + 'static,
    {
        match &self.time_limiter {
            Some(time_limiter) => time_limiter.execute(task).await,
            None => task().await,
        }
    }
}

impl std::fmt::Debug for DecoratorPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoratorPipeline")
            .field("retry", &self.retry.is_some())
            .field("circuit_breaker", &self.circuit_breaker.is_some())
            .field("rate_limiter", &self.rate_limiter.is_some())
            .field("bulkhead", &self.bulkhead.is_some())
            .field("thread_pool_bulkhead", &self.thread_pool_bulkhead.is_some())
            .field("time_limiter", &self.time_limiter.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bulkhead::BulkheadConfig;
    use crate::circuit_breaker::CircuitBreakerConfig;
    use crate::error::TaskError;
    use crate::retry::RetryConfig;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn quick_retry(max_attempts: u32) -> Arc<Retry> {
        Arc::new(Retry::new(RetryConfig {
            max_attempts,
            initial_interval: Duration::from_millis(1),
            multiplier: 2.0,
            max_interval: Duration::from_millis(10),
        }))
    }

    #[tokio::test]
    async fn test_bare_pipeline_runs_the_task() {
        let pipeline = DecoratorPipeline::builder().build();

        let result = pipeline
            .execute(|| async { Ok::<_, ResilienceError>("plain") })
            .await;
        assert_eq!(result.unwrap(), "plain");
    }

    #[tokio::test]
    async fn test_retry_reenters_the_circuit_breaker() {
        let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig::new(
            100.0,
            Duration::from_millis(25),
            1,
            4,
        )));
        let pipeline = DecoratorPipeline::builder()
            .with_retry(quick_retry(3))
            .with_circuit_breaker(breaker.clone())
            .build();

        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let result = pipeline
            .execute(move || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    if n < 3 {
                        Err(ResilienceError::Task(TaskError::transient("degraded")))
                    } else {
                        Ok("recovered")
                    }
                }
            })
            .await;

        // Each retry attempt passed the breaker again: two failures and
        // one success are in its window.
        assert_eq!(result.unwrap(), "recovered");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fallback_specificity_order() {
        let fallbacks = FallbackMap::new()
            .on(ErrorKind::TaskTransient, |_| "exact")
            .on_task_failure(|_| "task-umbrella")
            .on_any(|_| "catch-all");

        let transient = ResilienceError::Task(TaskError::transient("x"));
        assert_eq!(fallbacks.recover(&transient), Some("exact"));

        let fault = ResilienceError::Task(TaskError::fault("x"));
        assert_eq!(fallbacks.recover(&fault), Some("task-umbrella"));

        let open = ResilienceError::CircuitOpen {
            name: "circuit-breaker".into(),
            retry_after: None,
        };
        assert_eq!(fallbacks.recover(&open), Some("catch-all"));
    }

    #[tokio::test]
    async fn test_unmatched_error_propagates() {
        let pipeline = DecoratorPipeline::builder().build();
        let fallbacks: FallbackMap<&str> = FallbackMap::new().on(ErrorKind::TimedOut, |_| "late");

        let result = pipeline
            .execute_with_fallback(
                || async { Err::<&str, _>(ResilienceError::Task(TaskError::fault("boom"))) },
                &fallbacks,
            )
            .await;

        assert!(matches!(result, Err(ResilienceError::Task(_))));
    }

    #[tokio::test]
    async fn test_fallback_converts_bulkhead_rejection() {
        let bulkhead = Arc::new(Bulkhead::new(BulkheadConfig::new(1, Duration::ZERO)));
        let pipeline = DecoratorPipeline::builder()
            .with_bulkhead(bulkhead.clone())
            .build();
        let fallbacks = FallbackMap::new()
            .on(ErrorKind::BulkheadFull, |e| format!("fallback: {}", e.reason()));

        // Hold the only permit, then call through the pipeline.
        let permit = bulkhead.acquire().await.unwrap();
        let result = pipeline
            .execute_with_fallback(
                || async { Ok::<_, ResilienceError>("never runs".to_string()) },
                &fallbacks,
            )
            .await;
        drop(permit);

        assert_eq!(result.unwrap(), "fallback: bulkhead-full");
    }

    #[tokio::test]
    async fn test_setting_one_bulkhead_clears_the_other() {
        let semaphore = Arc::new(Bulkhead::with_defaults());
        let pool = Arc::new(ThreadPoolBulkhead::with_defaults());

        let pipeline = DecoratorPipeline::builder()
            .with_bulkhead(semaphore)
            .with_thread_pool_bulkhead(pool)
            .build();

        assert!(pipeline.bulkhead.is_none());
        assert!(pipeline.thread_pool_bulkhead.is_some());
    }
}
