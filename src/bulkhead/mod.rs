//! Bulkheads bounding how many calls may run concurrently.
//!
//! The semaphore [`Bulkhead`] limits in-flight calls on the caller's own
//! task; the [`ThreadPoolBulkhead`] executes work on a bounded worker
//! pool behind a bounded queue.

mod thread_pool;

pub use thread_pool::{TaskHandle, ThreadPoolBulkhead, ThreadPoolBulkheadConfig};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Semaphore, SemaphorePermit};

use crate::error::ResilienceError;
use crate::events::EventListener;

/// Configuration for the semaphore bulkhead.
#[derive(Debug, Clone)]
pub struct BulkheadConfig {
    /// Maximum calls running concurrently.
    pub max_concurrent_calls: usize,
    /// How long an acquire may wait for a permit; zero means fail fast.
    pub max_wait_duration: Duration,
}

impl Default for BulkheadConfig {
    fn default() -> Self {
        Self {
            max_concurrent_calls: 4,
            max_wait_duration: Duration::ZERO,
        }
    }
}

impl BulkheadConfig {
    /// Creates a new bulkhead configuration.
    pub fn new(max_concurrent_calls: usize, max_wait_duration: Duration) -> Self {
        Self {
            max_concurrent_calls,
            max_wait_duration,
        }
    }
}

/// Semaphore bulkhead isolating a resource behind a permit pool.
///
/// A permit is acquired before the task runs and released when the task
/// completes, whether it succeeded, failed, or was cancelled.
pub struct Bulkhead {
    name: String,
    config: BulkheadConfig,
    semaphore: Semaphore,
    listener: Option<Arc<dyn EventListener>>,
}

impl Bulkhead {
    /// Creates a new bulkhead with the given configuration.
    pub fn new(config: BulkheadConfig) -> Self {
        let semaphore = Semaphore::new(config.max_concurrent_calls);
        Self {
            name: "semaphore-bulkhead".to_string(),
            config,
            semaphore,
            listener: None,
        }
    }

    /// Creates a bulkhead with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(BulkheadConfig::default())
    }

    /// Sets the bulkhead's name, used in rejections and events.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Installs an event listener.
    pub fn with_listener(mut self, listener: Arc<dyn EventListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Acquires a permit, waiting up to `max_wait_duration`.
    pub async fn acquire(&self) -> Result<SemaphorePermit<'_>, ResilienceError> {
        let permit = if self.config.max_wait_duration.is_zero() {
            self.semaphore.try_acquire().ok()
        } else {
            match tokio::time::timeout(self.config.max_wait_duration, self.semaphore.acquire())
                .await
            {
                Ok(acquired) => acquired.ok(),
                Err(_) => None,
            }
        };

        match permit {
            Some(permit) => {
                if let Some(listener) = &self.listener {
                    listener.on_call_permitted(&self.name);
                }
                Ok(permit)
            }
            None => {
                tracing::info!(bulkhead = %self.name, "no permit available, call rejected");
                if let Some(listener) = &self.listener {
                    listener.on_call_rejected(&self.name, "bulkhead-full");
                }
                Err(ResilienceError::BulkheadFull {
                    name: self.name.clone(),
                })
            }
        }
    }

    /// Runs `task` under a permit.
    ///
    /// The permit is held for the task's full duration and released on
    /// drop, so it is returned on success, failure, and cancellation
    /// alike.
    pub async fn execute<F, Fut, T>(&self, task: F) -> Result<T, ResilienceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ResilienceError>>,
    {
        let _permit = self.acquire().await?;
        let result = task().await;
        tracing::debug!(bulkhead = %self.name, ok = result.is_ok(), "call finished");
        result
    }

    /// Permits currently free.
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// The bulkhead's name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for Bulkhead {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bulkhead")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("available_permits", &self.available_permits())
            .finish()
    }
}
