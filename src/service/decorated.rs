//! Named call-site handles over the shared primitives.
//!
//! Each handle decorates a caller-supplied task with one configured
//! combination of stages; call sites close over their own parameters.
//! Handles taking a `fallback` producer hand it a human-readable
//! message whose reason substring identifies the rejecting stage
//! (`bulkhead-full`, `circuit-open`, `rate-limited`, `timed-out`).

use std::future::Future;
use std::sync::Arc;

use crate::error::{ErrorKind, ResilienceError};
use crate::pipeline::{DecoratorPipeline, FallbackMap};

use super::factory::PatternsFactory;

fn reason_message(error: &ResilienceError) -> String {
    format!("{error} ({})", error.reason())
}

/// Decorated call sites backed by one [`PatternsFactory`].
pub struct DecoratedCalls {
    factory: PatternsFactory,
}

impl DecoratedCalls {
    /// Wraps the factory's primitives into callable handles.
    pub fn new(factory: PatternsFactory) -> Self {
        Self { factory }
    }

    /// The underlying factory.
    pub fn factory(&self) -> &PatternsFactory {
        &self.factory
    }

    /// Retry only; exhaustion and non-retryable failures propagate.
    pub async fn call_with_retry<F, Fut, T>(&self, task: F) -> Result<T, ResilienceError>
    where
        F: Fn() -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ResilienceError>> + Send + 'static,
        T: Send + 'static,
    {
        DecoratorPipeline::builder()
            .with_retry(self.factory.retry.clone())
            .build()
            .execute(task)
            .await
    }

    /// Retry with a fallback for failures that survive the attempts.
    pub async fn call_with_retry_and_fallback<F, Fut, T, FB>(
        &self,
        task: F,
        fallback: FB,
    ) -> Result<T, ResilienceError>
    where
        F: Fn() -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ResilienceError>> + Send + 'static,
        T: Send + 'static,
        FB: Fn(&str) -> T + Send + Sync + 'static,
    {
        let fallback = Arc::new(fallback);
        let exhausted = fallback.clone();
        let fallbacks = FallbackMap::new()
            .on(ErrorKind::RetryExhausted, move |error| {
                exhausted(&reason_message(error))
            })
            .on_task_failure(move |error| fallback(&reason_message(error)));

        DecoratorPipeline::builder()
            .with_retry(self.factory.retry.clone())
            .build()
            .execute_with_fallback(task, &fallbacks)
            .await
    }

    /// Circuit breaker only; rejections and failures propagate.
    pub async fn call_with_circuit_breaker<F, Fut, T>(&self, task: F) -> Result<T, ResilienceError>
    where
        F: Fn() -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ResilienceError>> + Send + 'static,
        T: Send + 'static,
    {
        DecoratorPipeline::builder()
            .with_circuit_breaker(self.factory.circuit_breaker.clone())
            .build()
            .execute(task)
            .await
    }

    /// Circuit breaker with a fallback for any failure, open-circuit
    /// rejections included.
    pub async fn call_with_circuit_breaker_and_fallback<F, Fut, T, FB>(
        &self,
        task: F,
        fallback: FB,
    ) -> Result<T, ResilienceError>
    where
        F: Fn() -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ResilienceError>> + Send + 'static,
        T: Send + 'static,
        FB: Fn(&str) -> T + Send + Sync + 'static,
    {
        let fallbacks = FallbackMap::new().on_any(move |error| fallback(&reason_message(error)));

        DecoratorPipeline::builder()
            .with_circuit_breaker(self.factory.circuit_breaker.clone())
            .build()
            .execute_with_fallback(task, &fallbacks)
            .await
    }

    /// Rate limiter with a fallback for any failure; a spent window
    /// surfaces as a `rate-limited` message.
    pub async fn call_with_rate_limiter<F, Fut, T, FB>(
        &self,
        task: F,
        fallback: FB,
    ) -> Result<T, ResilienceError>
    where
        F: Fn() -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ResilienceError>> + Send + 'static,
        T: Send + 'static,
        FB: Fn(&str) -> T + Send + Sync + 'static,
    {
        let fallbacks = FallbackMap::new().on_any(move |error| fallback(&reason_message(error)));

        DecoratorPipeline::builder()
            .with_rate_limiter(self.factory.rate_limiter.clone())
            .build()
            .execute_with_fallback(task, &fallbacks)
            .await
    }

    /// Semaphore bulkhead only; rejections propagate.
    pub async fn call_with_bulkhead<F, Fut, T>(&self, task: F) -> Result<T, ResilienceError>
    where
        F: Fn() -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ResilienceError>> + Send + 'static,
        T: Send + 'static,
    {
        DecoratorPipeline::builder()
            .with_bulkhead(self.factory.bulkhead.clone())
            .build()
            .execute(task)
            .await
    }

    /// Semaphore bulkhead with a fallback; saturation surfaces as a
    /// `bulkhead-full` message.
    pub async fn call_with_bulkhead_and_fallback<F, Fut, T, FB>(
        &self,
        task: F,
        fallback: FB,
    ) -> Result<T, ResilienceError>
    where
        F: Fn() -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ResilienceError>> + Send + 'static,
        T: Send + 'static,
        FB: Fn(&str) -> T + Send + Sync + 'static,
    {
        let fallback = Arc::new(fallback);
        let full = fallback.clone();
        let fallbacks = FallbackMap::new()
            .on(ErrorKind::BulkheadFull, move |error| {
                full(&reason_message(error))
            })
            .on_any(move |error| fallback(&reason_message(error)));

        DecoratorPipeline::builder()
            .with_bulkhead(self.factory.bulkhead.clone())
            .build()
            .execute_with_fallback(task, &fallbacks)
            .await
    }

    /// Time limiter with a fallback; a blown deadline surfaces as a
    /// `timed-out` message.
    pub async fn call_with_time_limiter<F, Fut, T, FB>(
        &self,
        task: F,
        fallback: FB,
    ) -> Result<T, ResilienceError>
    where
        F: Fn() -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ResilienceError>> + Send + 'static,
        T: Send + 'static,
        FB: Fn(&str) -> T + Send + Sync + 'static,
    {
        let fallbacks = FallbackMap::new().on_any(move |error| fallback(&reason_message(error)));

        DecoratorPipeline::builder()
            .with_time_limiter(self.factory.time_limiter.clone())
            .build()
            .execute_with_fallback(task, &fallbacks)
            .await
    }

    /// Thread-pool bulkhead only; the caller awaits the pool's outcome.
    pub async fn call_with_thread_pool_bulkhead<F, Fut, T>(
        &self,
        task: F,
    ) -> Result<T, ResilienceError>
    where
        F: Fn() -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ResilienceError>> + Send + 'static,
        T: Send + 'static,
    {
        DecoratorPipeline::builder()
            .with_thread_pool_bulkhead(self.factory.thread_pool_bulkhead.clone())
            .build()
            .execute(task)
            .await
    }

    /// Thread-pool bulkhead under a deadline, with fallbacks for pool
    /// saturation and the blown deadline; other failures propagate.
    pub async fn call_with_thread_pool_bulkhead_and_time_limiter<F, Fut, T, FB>(
        &self,
        task: F,
        fallback: FB,
    ) -> Result<T, ResilienceError>
    where
        F: Fn() -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ResilienceError>> + Send + 'static,
        T: Send + 'static,
        FB: Fn(&str) -> T + Send + Sync + 'static,
    {
        let fallback = Arc::new(fallback);
        let full = fallback.clone();
        let fallbacks = FallbackMap::new()
            .on(ErrorKind::ThreadPoolBulkheadFull, move |error| {
                full(&reason_message(error))
            })
            .on(ErrorKind::TimedOut, move |error| {
                fallback(&reason_message(error))
            });

        DecoratorPipeline::builder()
            .with_thread_pool_bulkhead(self.factory.thread_pool_bulkhead.clone())
            .with_time_limiter(self.factory.time_limiter.clone())
            .build()
            .execute_with_fallback(task, &fallbacks)
            .await
    }

    /// The degrading-service chain: retry outermost, then circuit
    /// breaker, then thread-pool bulkhead, then the deadline, with
    /// fallbacks for pool saturation, open circuit, and blown deadline.
    pub async fn call_degrading_service<F, Fut, T, FB>(
        &self,
        task: F,
        fallback: FB,
    ) -> Result<T, ResilienceError>
    where
        F: Fn() -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ResilienceError>> + Send + 'static,
        T: Send + 'static,
        FB: Fn(&str) -> T + Send + Sync + 'static,
    {
        let fallback = Arc::new(fallback);
        let full = fallback.clone();
        let open = fallback.clone();
        let fallbacks = FallbackMap::new()
            .on(ErrorKind::ThreadPoolBulkheadFull, move |error| {
                full(&reason_message(error))
            })
            .on(ErrorKind::CircuitOpen, move |error| {
                open(&reason_message(error))
            })
            .on(ErrorKind::TimedOut, move |error| {
                fallback(&reason_message(error))
            });

        DecoratorPipeline::builder()
            .with_retry(self.factory.retry.clone())
            .with_circuit_breaker(self.factory.circuit_breaker.clone())
            .with_thread_pool_bulkhead(self.factory.thread_pool_bulkhead.clone())
            .with_time_limiter(self.factory.time_limiter.clone())
            .build()
            .execute_with_fallback(task, &fallbacks)
            .await
    }
}

impl std::fmt::Debug for DecoratedCalls {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoratedCalls")
            .field("factory", &self.factory)
            .finish()
    }
}
