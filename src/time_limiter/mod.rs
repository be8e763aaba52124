//! Deadline enforcement for asynchronous work.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{ResilienceError, TaskError};
use crate::events::EventListener;

/// Configuration for the time limiter.
#[derive(Debug, Clone)]
pub struct TimeLimiterConfig {
    /// Deadline for the protected call.
    pub timeout_duration: Duration,
    /// Whether to actively cancel the running task on timeout; when
    /// false the task is detached and its eventual result discarded.
    pub cancel_running_future: bool,
}

impl Default for TimeLimiterConfig {
    fn default() -> Self {
        Self {
            timeout_duration: Duration::from_millis(3_000),
            cancel_running_future: true,
        }
    }
}

impl TimeLimiterConfig {
    /// Creates a new time limiter configuration.
    pub fn new(timeout_duration: Duration, cancel_running_future: bool) -> Self {
        Self {
            timeout_duration,
            cancel_running_future,
        }
    }
}

/// Enforces a deadline on an asynchronous unit of work.
///
/// Cancellation is best-effort: a task that ignores it still yields
/// [`ResilienceError::TimedOut`] to the caller at the deadline; the
/// caller is never left waiting past it.
#[derive(Clone)]
pub struct TimeLimiter {
    name: String,
    config: TimeLimiterConfig,
    listener: Option<Arc<dyn EventListener>>,
}

impl TimeLimiter {
    /// Creates a new time limiter with the given configuration.
    pub fn new(config: TimeLimiterConfig) -> Self {
        Self {
            name: "time-limiter".to_string(),
            config,
            listener: None,
        }
    }

    /// Creates a time limiter with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(TimeLimiterConfig::default())
    }

    /// Sets the limiter's name, used in events.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Installs an event listener.
    pub fn with_listener(mut self, listener: Arc<dyn EventListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Spawns `task` and awaits it under the deadline.
    ///
    /// On timeout the spawned task is aborted when
    /// `cancel_running_future` is set, otherwise detached to finish on
    /// its own with the result discarded.
    pub async fn execute<F, Fut, T>(&self, task: F) -> Result<T, ResilienceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ResilienceError>> + Send + 'static,
        T: Send + 'static,
    {
        let mut handle = tokio::spawn(task());

        match tokio::time::timeout(self.config.timeout_duration, &mut handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => {
                // The spawned task panicked or was aborted externally.
                tracing::error!(limiter = %self.name, %join_error, "protected task died");
                Err(ResilienceError::Task(TaskError::fault(format!(
                    "protected task died: {join_error}"
                ))))
            }
            Err(_) => {
                if self.config.cancel_running_future {
                    handle.abort();
                } else {
                    // Detached: the task keeps running, its result is
                    // discarded when the handle drops.
                    drop(handle);
                }
                Err(self.timed_out())
            }
        }
    }

    /// Awaits an already-running computation's handle under the
    /// deadline; on timeout the handle is dropped and the computation
    /// left to its owner.
    pub async fn limit<Fut, T>(&self, future: Fut) -> Result<T, ResilienceError>
    where
        Fut: Future<Output = Result<T, ResilienceError>>,
    {
        match tokio::time::timeout(self.config.timeout_duration, future).await {
            Ok(result) => result,
            Err(_) => Err(self.timed_out()),
        }
    }

    /// The limiter's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The configured deadline.
    pub fn timeout_duration(&self) -> Duration {
        self.config.timeout_duration
    }

    fn timed_out(&self) -> ResilienceError {
        tracing::info!(
            limiter = %self.name,
            deadline = ?self.config.timeout_duration,
            "deadline elapsed"
        );
        if let Some(listener) = &self.listener {
            listener.on_timeout(&self.name, self.config.timeout_duration);
        }
        ResilienceError::TimedOut {
            duration: self.config.timeout_duration,
        }
    }
}

impl std::fmt::Debug for TimeLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeLimiter")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn test_completes_within_deadline() {
        let limiter = TimeLimiter::new(TimeLimiterConfig::new(Duration::from_millis(100), true));

        let result = limiter
            .execute(|| async { Ok::<_, ResilienceError>("fast") })
            .await;
        assert_eq!(result.unwrap(), "fast");
    }

    #[tokio::test]
    async fn test_timeout_cancels_running_task() {
        let limiter = TimeLimiter::new(TimeLimiterConfig::new(Duration::from_millis(10), true));
        let finished = Arc::new(AtomicBool::new(false));

        let flag = finished.clone();
        let result = limiter
            .execute(move || async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                flag.store(true, Ordering::SeqCst);
                Ok::<_, ResilienceError>(())
            })
            .await;

        assert!(matches!(result, Err(ResilienceError::TimedOut { duration })
            if duration == Duration::from_millis(10)));

        // The abort lands before the task's sleep finishes.
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_timeout_abandons_task_when_not_cancelling() {
        let limiter = TimeLimiter::new(TimeLimiterConfig::new(Duration::from_millis(10), false));
        let finished = Arc::new(AtomicBool::new(false));

        let flag = finished.clone();
        let result = limiter
            .execute(move || async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                flag.store(true, Ordering::SeqCst);
                Ok::<_, ResilienceError>(())
            })
            .await;

        assert!(matches!(result, Err(ResilienceError::TimedOut { .. })));

        // The detached task runs to completion; its result is discarded.
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_limit_applies_deadline_to_existing_future() {
        let limiter = TimeLimiter::new(TimeLimiterConfig::new(Duration::from_millis(10), true));

        let result = limiter
            .limit(async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok::<_, ResilienceError>(())
            })
            .await;
        assert!(matches!(result, Err(ResilienceError::TimedOut { .. })));

        let result = limiter
            .limit(async { Ok::<_, ResilienceError>("quick") })
            .await;
        assert_eq!(result.unwrap(), "quick");
    }

    #[tokio::test]
    async fn test_task_panic_surfaces_as_task_failure() {
        let limiter = TimeLimiter::with_defaults();

        let result: Result<(), _> = limiter
            .execute(|| async { panic!("task blew up") })
            .await;

        match result {
            Err(ResilienceError::Task(TaskError::ServiceFault { message })) => {
                assert!(message.contains("protected task died"));
            }
            other => panic!("expected task failure, got {other:?}"),
        }
    }
}
