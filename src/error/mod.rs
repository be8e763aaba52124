//! Error types for the resilience engine.

mod types;
mod categories;

pub use types::*;
pub use categories::*;
