//! Optional observer hooks for primitive lifecycle events.
//!
//! Listeners are an observability hook, never required for correctness:
//! every primitive works identically with no listener installed. The
//! engine also logs each event inline via `tracing`.

use std::time::Duration;

use crate::error::ResilienceError;

/// Observer invoked by a primitive at each lifecycle event.
///
/// All methods are no-ops by default; implementors override the events
/// they care about. Invocations happen on the caller's task, so
/// implementations must be cheap and non-blocking.
#[cfg_attr(test, mockall::automock)]
pub trait EventListener: Send + Sync {
    /// A call was admitted by the primitive.
    fn on_call_permitted(&self, name: &str) {
        let _ = name;
    }

    /// A call was rejected; `reason` is the stage's stable reason string.
    fn on_call_rejected(&self, name: &str, reason: &'static str) {
        let _ = (name, reason);
    }

    /// A protected call completed successfully.
    fn on_call_succeeded(&self, name: &str, elapsed: Duration) {
        let _ = (name, elapsed);
    }

    /// A protected call completed with a failure.
    fn on_call_failed(&self, name: &str, error: &ResilienceError) {
        let _ = (name, error);
    }

    /// A circuit breaker moved between states.
    fn on_state_transition(&self, name: &str, from: &'static str, to: &'static str) {
        let _ = (name, from, to);
    }

    /// A retry attempt is about to be scheduled after `delay`.
    fn on_retry(&self, name: &str, attempt: u32, delay: Duration) {
        let _ = (name, attempt, delay);
    }

    /// A deadline elapsed before the protected call completed.
    fn on_timeout(&self, name: &str, deadline: Duration) {
        let _ = (name, deadline);
    }
}

/// Listener that forwards every event to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventListener;

impl EventListener for TracingEventListener {
    fn on_call_permitted(&self, name: &str) {
        tracing::debug!(primitive = name, "call permitted");
    }

    fn on_call_rejected(&self, name: &str, reason: &'static str) {
        tracing::info!(primitive = name, reason, "call rejected");
    }

    fn on_call_succeeded(&self, name: &str, elapsed: Duration) {
        tracing::debug!(primitive = name, ?elapsed, "call succeeded");
    }

    fn on_call_failed(&self, name: &str, error: &ResilienceError) {
        tracing::debug!(primitive = name, %error, "call failed");
    }

    fn on_state_transition(&self, name: &str, from: &'static str, to: &'static str) {
        tracing::info!(primitive = name, from, to, "state transition");
    }

    fn on_retry(&self, name: &str, attempt: u32, delay: Duration) {
        tracing::info!(primitive = name, attempt, ?delay, "retry scheduled");
    }

    fn on_timeout(&self, name: &str, deadline: Duration) {
        tracing::info!(primitive = name, ?deadline, "deadline elapsed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaskError;

    #[test]
    fn default_methods_are_noops() {
        struct Silent;
        impl EventListener for Silent {}

        let listener = Silent;
        listener.on_call_permitted("semaphore-bulkhead");
        listener.on_call_rejected("semaphore-bulkhead", "bulkhead-full");
        listener.on_call_failed(
            "circuit-breaker",
            &ResilienceError::Task(TaskError::fault("boom")),
        );
    }

    #[test]
    fn mock_listener_observes_rejection() {
        let mut mock = MockEventListener::new();
        mock.expect_on_call_rejected()
            .withf(|name, reason| name == "rate-limiter" && reason == "rate-limited")
            .times(1)
            .return_const(());

        mock.on_call_rejected("rate-limiter", "rate-limited");
    }
}
