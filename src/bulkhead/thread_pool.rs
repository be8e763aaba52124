//! Worker-pool bulkhead executing submissions asynchronously.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::{mpsc, oneshot, Mutex};

use crate::error::{ResilienceError, TaskError};
use crate::events::EventListener;

type Job = BoxFuture<'static, ()>;
type SharedQueue = Arc<Mutex<mpsc::Receiver<Job>>>;

/// Configuration for the thread-pool bulkhead.
#[derive(Debug, Clone)]
pub struct ThreadPoolBulkheadConfig {
    /// Workers kept alive for the pool's lifetime.
    pub core_pool_size: usize,
    /// Upper bound on workers, including temporary ones.
    pub max_pool_size: usize,
    /// Submissions buffered while all workers are busy.
    pub queue_capacity: usize,
    /// Idle time after which a worker above the core size exits.
    pub keep_alive_duration: Duration,
}

impl Default for ThreadPoolBulkheadConfig {
    fn default() -> Self {
        Self {
            core_pool_size: 3,
            max_pool_size: 4,
            queue_capacity: 4,
            keep_alive_duration: Duration::from_secs(2),
        }
    }
}

impl ThreadPoolBulkheadConfig {
    /// Sizes the pool from an available-thread count: one worker short
    /// of the count (four short on 8+ threads) stays core, the rest is
    /// headroom for temporary workers.
    pub fn sized_for(number_of_threads: usize) -> Self {
        let core_factor = if number_of_threads >= 8 { 4 } else { 1 };
        let core = number_of_threads.saturating_sub(core_factor).max(1);
        Self {
            core_pool_size: core,
            max_pool_size: number_of_threads.max(core),
            ..Default::default()
        }
    }
}

/// Handle resolving to the eventual outcome of a submitted task.
#[derive(Debug)]
pub struct TaskHandle<T> {
    rx: oneshot::Receiver<Result<T, ResilienceError>>,
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, ResilienceError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|received| match received {
            Ok(result) => result,
            Err(_) => Err(ResilienceError::Task(TaskError::fault(
                "task abandoned by worker pool",
            ))),
        })
    }
}

/// Bulkhead that runs submissions on a bounded worker pool.
///
/// Submission never blocks the caller: a task is queued, handed to a
/// temporary worker, or rejected immediately. Must be constructed
/// inside a Tokio runtime, since workers are spawned at build time.
pub struct ThreadPoolBulkhead {
    name: String,
    config: ThreadPoolBulkheadConfig,
    queue: mpsc::Sender<Job>,
    shared: SharedQueue,
    workers: Arc<AtomicUsize>,
    listener: Option<Arc<dyn EventListener>>,
}

impl ThreadPoolBulkhead {
    /// Creates the pool and spawns its core workers.
    pub fn new(config: ThreadPoolBulkheadConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let shared: SharedQueue = Arc::new(Mutex::new(rx));
        let workers = Arc::new(AtomicUsize::new(config.core_pool_size));

        for id in 0..config.core_pool_size {
            let queue = shared.clone();
            tokio::spawn(async move {
                loop {
                    let job = {
                        let mut guard = queue.lock().await;
                        guard.recv().await
                    };
                    match job {
                        Some(job) => job.await,
                        None => break,
                    }
                }
                tracing::debug!(worker = id, "core worker shutting down");
            });
        }

        Self {
            name: "thread-pool-bulkhead".to_string(),
            config,
            queue: tx,
            shared,
            workers,
            listener: None,
        }
    }

    /// Creates a pool with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ThreadPoolBulkheadConfig::default())
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

    /// Submits `task` for asynchronous execution.
    ///
    /// Returns a [`TaskHandle`] resolving to the task's outcome, or
    /// [`ResilienceError::ThreadPoolBulkheadFull`] when the queue is
    /// full and no worker slot below `max_pool_size` is free.
    pub fn submit<F, Fut, T>(&self, task: F) -> Result<TaskHandle<T>, ResilienceError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, ResilienceError>> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::pin(async move {
            let result = task().await;
            let _ = tx.send(result);
        });

        match self.queue.try_send(job) {
            Ok(()) => {
                if let Some(listener) = &self.listener {
                    listener.on_call_permitted(&self.name);
                }
                Ok(TaskHandle { rx })
            }
            Err(mpsc::error::TrySendError::Full(job)) => {
                if self.try_spawn_temporary_worker(job) {
                    if let Some(listener) = &self.listener {
                        listener.on_call_permitted(&self.name);
                    }
                    Ok(TaskHandle { rx })
                } else {
                    Err(self.reject())
                }
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(self.reject()),
        }
    }

    /// Runs a task on the pool and awaits its outcome in one call.
    pub async fn execute<F, Fut, T>(&self, task: F) -> Result<T, ResilienceError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, ResilienceError>> + Send + 'static,
        T: Send + 'static,
    {
        self.submit(task)?.await
    }

    /// Workers currently alive (core plus temporary).
    pub fn worker_count(&self) -> usize {
        self.workers.load(Ordering::SeqCst)
    }

    /// Free slots in the submission queue.
    pub fn remaining_queue_capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// The bulkhead's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn try_spawn_temporary_worker(&self, job: Job) -> bool {
        let grown = self
            .workers
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                (count < self.config.max_pool_size).then_some(count + 1)
            })
            .is_ok();
        if !grown {
            return false;
        }

        let queue = self.shared.clone();
        let workers = self.workers.clone();
        let keep_alive = self.config.keep_alive_duration;
        let name = self.name.clone();
        tokio::spawn(async move {
            job.await;
            loop {
                let received = tokio::time::timeout(keep_alive, async {
                    let mut guard = queue.lock().await;
                    guard.recv().await
                })
                .await;
                match received {
                    Ok(Some(job)) => job.await,
                    // Idle past keep-alive, or the pool shut down.
                    Ok(None) | Err(_) => break,
                }
            }
            workers.fetch_sub(1, Ordering::SeqCst);
            tracing::debug!(bulkhead = %name, "temporary worker reclaimed");
        });
        true
    }

    fn reject(&self) -> ResilienceError {
        tracing::info!(bulkhead = %self.name, "workers busy and queue full, call rejected");
        if let Some(listener) = &self.listener {
            listener.on_call_rejected(&self.name, "thread-pool-bulkhead-full");
        }
        ResilienceError::ThreadPoolBulkheadFull {
            name: self.name.clone(),
        }
    }
}

impl std::fmt::Debug for ThreadPoolBulkhead {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPoolBulkhead")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("workers", &self.worker_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use tokio::sync::Notify;

    fn small_pool(core: usize, max: usize, queue: usize) -> ThreadPoolBulkhead {
        ThreadPoolBulkhead::new(ThreadPoolBulkheadConfig {
            core_pool_size: core,
            max_pool_size: max,
            queue_capacity: queue,
            keep_alive_duration: Duration::from_millis(50),
        })
    }

    #[tokio::test]
    async fn test_submit_resolves_to_task_outcome() {
        let pool = ThreadPoolBulkhead::with_defaults();

        let ok = pool.submit(|| async { Ok::<_, ResilienceError>(7) }).unwrap();
        assert_eq!(ok.await.unwrap(), 7);

        let err = pool
            .submit(|| async { Err::<u32, _>(ResilienceError::Task(TaskError::fault("boom"))) })
            .unwrap();
        assert!(matches!(err.await, Err(ResilienceError::Task(_))));
    }

    #[tokio::test]
    async fn test_rejects_when_workers_busy_and_queue_full() {
        let pool = small_pool(1, 1, 1);
        let release = Arc::new(Notify::new());
        let entered = Arc::new(AtomicU32::new(0));

        // Occupy the single worker.
        let blocker = {
            let release = release.clone();
            let entered = entered.clone();
            pool.submit(move || async move {
                entered.fetch_add(1, Ordering::SeqCst);
                release.notified().await;
                Ok::<_, ResilienceError>("blocker")
            })
            .unwrap()
        };
        while entered.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        // Fill the queue.
        let queued = pool
            .submit(|| async { Ok::<_, ResilienceError>("queued") })
            .unwrap();

        // Worker busy, queue full, no headroom: immediate rejection.
        let rejected = pool.submit(|| async { Ok::<_, ResilienceError>("rejected") });
        assert!(matches!(
            rejected,
            Err(ResilienceError::ThreadPoolBulkheadFull { .. })
        ));

        release.notify_waiters();
        assert_eq!(blocker.await.unwrap(), "blocker");
        assert_eq!(queued.await.unwrap(), "queued");
    }

    #[tokio::test]
    async fn test_temporary_worker_takes_overflow() {
        let pool = small_pool(1, 2, 1);
        let release = Arc::new(Notify::new());
        let entered = Arc::new(AtomicU32::new(0));

        let blocker = {
            let release = release.clone();
            let entered = entered.clone();
            pool.submit(move || async move {
                entered.fetch_add(1, Ordering::SeqCst);
                release.notified().await;
                Ok::<_, ResilienceError>(())
            })
            .unwrap()
        };
        while entered.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        let queued = pool
            .submit(|| async { Ok::<_, ResilienceError>("queued") })
            .unwrap();

        // Queue full; this submission grows the pool to max instead of
        // rejecting, and completes while the core worker stays blocked.
        let overflow = pool
            .submit(|| async { Ok::<_, ResilienceError>("overflow") })
            .unwrap();
        assert_eq!(overflow.await.unwrap(), "overflow");
        assert_eq!(pool.worker_count(), 2);

        release.notify_waiters();
        blocker.await.unwrap();
        assert_eq!(queued.await.unwrap(), "queued");
    }

    #[tokio::test]
    async fn test_temporary_worker_reclaimed_after_keep_alive() {
        let pool = small_pool(1, 2, 1);
        let release = Arc::new(Notify::new());
        let entered = Arc::new(AtomicU32::new(0));

        let blocker = {
            let release = release.clone();
            let entered = entered.clone();
            pool.submit(move || async move {
                entered.fetch_add(1, Ordering::SeqCst);
                release.notified().await;
                Ok::<_, ResilienceError>(())
            })
            .unwrap()
        };
        while entered.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        let _queued = pool
            .submit(|| async { Ok::<_, ResilienceError>(()) })
            .unwrap();
        let overflow = pool
            .submit(|| async { Ok::<_, ResilienceError>(()) })
            .unwrap();
        overflow.await.unwrap();

        // Past the keep-alive the pool shrinks back to its core size.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(pool.worker_count(), 1);

        release.notify_waiters();
        blocker.await.unwrap();
    }

    #[tokio::test]
    async fn test_sized_for_reserves_headroom() {
        let config = ThreadPoolBulkheadConfig::sized_for(4);
        assert_eq!(config.core_pool_size, 3);
        assert_eq!(config.max_pool_size, 4);

        let config = ThreadPoolBulkheadConfig::sized_for(8);
        assert_eq!(config.core_pool_size, 4);
        assert_eq!(config.max_pool_size, 8);
    }
}
