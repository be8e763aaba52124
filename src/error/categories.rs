//! Fault categories for the protected unit of work.

use thiserror::Error;

/// Domain failure raised by a protected task.
///
/// The engine never inspects a task's payload; it only classifies the
/// failure kind to decide retryability and circuit-breaker recording.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// A transient outage of the downstream dependency; safe to retry.
    #[error("Temporary service outage: {message}")]
    TransientOutage { message: String },

    /// A service fault reported by the dependency; retried and recorded.
    #[error("Service fault: {message}")]
    ServiceFault { message: String },

    /// An I/O-level failure; by default neither retried nor recorded by
    /// the circuit breaker.
    #[error("I/O failure: {message}")]
    Io { message: String },
}

impl TaskError {
    /// Convenience constructor for a transient outage.
    pub fn transient(message: impl Into<String>) -> Self {
        TaskError::TransientOutage {
            message: message.into(),
        }
    }

    /// Convenience constructor for a service fault.
    pub fn fault(message: impl Into<String>) -> Self {
        TaskError::ServiceFault {
            message: message.into(),
        }
    }

    /// Convenience constructor for an I/O failure.
    pub fn io(message: impl Into<String>) -> Self {
        TaskError::Io {
            message: message.into(),
        }
    }
}
