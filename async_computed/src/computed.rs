//! Reactive values computed from asynchronous evaluators.

mod async_computed;
pub use async_computed::*;
