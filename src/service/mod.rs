//! Call-site surface: primitive factory and named decorated handles.

mod decorated;
mod factory;

pub use decorated::DecoratedCalls;
pub use factory::{
    PatternsFactory, CIRCUIT_BREAKER, RATE_LIMITER, RETRY, SEMAPHORE_BULKHEAD,
    THREAD_POOL_BULKHEAD, TIME_LIMITER,
};
