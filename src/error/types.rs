//! Main error type for the resilience engine.

use std::time::Duration;
use thiserror::Error;

use super::categories::TaskError;

/// Result type alias for protected calls.
pub type ResilienceResult<T> = Result<T, ResilienceError>;

/// Top-level error type for the resilience engine.
///
/// Every primitive raises its own distinguishable variant on rejection;
/// a task's own domain failure travels as [`ResilienceError::Task`].
#[derive(Error, Debug, Clone)]
pub enum ResilienceError {
    /// The protected task itself failed.
    #[error("Task failure: {0}")]
    Task(#[from] TaskError),

    /// The semaphore bulkhead had no free permit within its wait budget.
    #[error("Bulkhead '{name}' is full")]
    BulkheadFull {
        /// Name of the rejecting bulkhead.
        name: String,
    },

    /// The thread-pool bulkhead's workers were busy and its queue full.
    #[error("Thread pool bulkhead '{name}' is full")]
    ThreadPoolBulkheadFull {
        /// Name of the rejecting bulkhead.
        name: String,
    },

    /// The circuit breaker is open or its half-open budget is spent.
    #[error("Circuit breaker '{name}' does not permit the call")]
    CircuitOpen {
        /// Name of the rejecting breaker.
        name: String,
        /// Remaining open-state wait, when known.
        retry_after: Option<Duration>,
    },

    /// The rate limiter's window budget was spent and the wait timed out.
    #[error("Rate limiter '{name}' rejected the call")]
    RateLimited {
        /// Name of the rejecting limiter.
        name: String,
    },

    /// All retry attempts were consumed; carries the last failure.
    #[error("Retries exhausted after {attempts} attempts: {last}")]
    RetryExhausted {
        /// Total attempts made, including the first.
        attempts: u32,
        /// The failure observed on the final attempt.
        last: Box<ResilienceError>,
    },

    /// The call did not complete within the configured deadline.
    #[error("Call timed out after {duration:?}")]
    TimedOut {
        /// The deadline that elapsed.
        duration: Duration,
    },
}

/// Classification key for an error, used by fallback routing and the
/// circuit breaker's record/ignore sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A transient-outage task failure.
    TaskTransient,
    /// A service-fault task failure.
    TaskFault,
    /// An I/O task failure.
    TaskIo,
    /// Semaphore bulkhead rejection.
    BulkheadFull,
    /// Thread-pool bulkhead rejection.
    ThreadPoolBulkheadFull,
    /// Circuit breaker rejection.
    CircuitOpen,
    /// Rate limiter rejection.
    RateLimited,
    /// Retry budget exhaustion.
    RetryExhausted,
    /// Deadline expiry.
    TimedOut,
}

impl ErrorKind {
    /// Returns true for the task-failure kinds.
    pub fn is_task(self) -> bool {
        matches!(
            self,
            ErrorKind::TaskTransient | ErrorKind::TaskFault | ErrorKind::TaskIo
        )
    }
}

impl ResilienceError {
    /// Returns the classification kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ResilienceError::Task(TaskError::TransientOutage { .. }) => ErrorKind::TaskTransient,
            ResilienceError::Task(TaskError::ServiceFault { .. }) => ErrorKind::TaskFault,
            ResilienceError::Task(TaskError::Io { .. }) => ErrorKind::TaskIo,
            ResilienceError::BulkheadFull { .. } => ErrorKind::BulkheadFull,
            ResilienceError::ThreadPoolBulkheadFull { .. } => ErrorKind::ThreadPoolBulkheadFull,
            ResilienceError::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            ResilienceError::RateLimited { .. } => ErrorKind::RateLimited,
            ResilienceError::RetryExhausted { .. } => ErrorKind::RetryExhausted,
            ResilienceError::TimedOut { .. } => ErrorKind::TimedOut,
        }
    }

    /// Returns true if this error is retryable under the default policy.
    ///
    /// Only transient-outage and service-fault task failures are retried;
    /// rejections raised by the protection stages themselves are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ResilienceError::Task(TaskError::TransientOutage { .. })
                | ResilienceError::Task(TaskError::ServiceFault { .. })
        )
    }

    /// Stable machine-readable reason identifying the stage that produced
    /// this error; used in fallback payload messages.
    pub fn reason(&self) -> &'static str {
        match self {
            ResilienceError::Task(_) => "task-failure",
            ResilienceError::BulkheadFull { .. } => "bulkhead-full",
            ResilienceError::ThreadPoolBulkheadFull { .. } => "thread-pool-bulkhead-full",
            ResilienceError::CircuitOpen { .. } => "circuit-open",
            ResilienceError::RateLimited { .. } => "rate-limited",
            ResilienceError::RetryExhausted { .. } => "retries-exhausted",
            ResilienceError::TimedOut { .. } => "timed-out",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_is_retryable() {
        let transient = ResilienceError::Task(TaskError::transient("degraded"));
        assert!(transient.is_retryable());

        let fault = ResilienceError::Task(TaskError::fault("boom"));
        assert!(fault.is_retryable());

        let io = ResilienceError::Task(TaskError::io("connection reset"));
        assert!(!io.is_retryable());

        let open = ResilienceError::CircuitOpen {
            name: "circuit-breaker".into(),
            retry_after: Some(Duration::from_millis(25)),
        };
        assert!(!open.is_retryable());
    }

    #[test]
    fn test_reason_identifies_stage() {
        let full = ResilienceError::BulkheadFull {
            name: "semaphore-bulkhead".into(),
        };
        assert_eq!(full.reason(), "bulkhead-full");

        let pool_full = ResilienceError::ThreadPoolBulkheadFull {
            name: "thread-pool-bulkhead".into(),
        };
        assert!(pool_full.reason().contains("bulkhead-full"));

        let timed_out = ResilienceError::TimedOut {
            duration: Duration::from_millis(3000),
        };
        assert_eq!(timed_out.reason(), "timed-out");
    }

    #[test]
    fn test_retry_exhausted_preserves_last_failure() {
        let last = ResilienceError::Task(TaskError::transient("still down"));
        let exhausted = ResilienceError::RetryExhausted {
            attempts: 5,
            last: Box::new(last),
        };

        assert_eq!(exhausted.kind(), ErrorKind::RetryExhausted);
        match exhausted {
            ResilienceError::RetryExhausted { attempts, last } => {
                assert_eq!(attempts, 5);
                assert_eq!(last.kind(), ErrorKind::TaskTransient);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_kind_partition() {
        assert!(ErrorKind::TaskIo.is_task());
        assert!(!ErrorKind::CircuitOpen.is_task());
    }
}
