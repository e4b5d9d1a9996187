//! Reactive values derived from asynchronous computations.
//!
//! An [`ArcAsyncComputed`](computed::ArcAsyncComputed) holds the latest value produced by an
//! `async` evaluator. Reactive values read inside the evaluator are tracked as its
//! dependencies; when one of them changes, the evaluator runs again. Each run is a *round*,
//! numbered by a monotonically increasing generation:
//!
//! 1. **Last start wins.** A round that settles after a newer round has started is discarded,
//!    whether it succeeded or failed. Completion order never decides which value is shown.
//! 2. **Cooperative cancellation.** The evaluator receives a
//!    [`CancelHandle`](computed::CancelHandle). Cleanups registered on it run exactly once,
//!    when the round is superseded or the cell is disposed, so the evaluator can abort timers
//!    or requests it started. The engine itself never preempts a running future.
//! 3. **In-flight indicator.** [`evaluating`](computed::ArcAsyncComputed::evaluating) is `true`
//!    while the most recently started round has not settled.
//!
//! Rounds start either eagerly (at construction and on every dependency change) or lazily
//! (when the value is read and a dependency has changed since the last round started).
//!
//! ```rust
//! # tokio_test::block_on(async move {
//! # _ = any_spawner::Executor::init_futures_executor();
//! use async_computed::{computed::ArcAsyncComputed, prelude::*};
//! use reactive_graph::signal::ArcRwSignal;
//!
//! let count = ArcRwSignal::new(1i32);
//! let doubled = ArcAsyncComputed::new(0, {
//!     let count = count.clone();
//!     move |_cancel| {
//!         // reads made while the evaluator is called are tracked
//!         let count = count.get();
//!         async move { count * 2 }
//!     }
//! });
//!
//! assert_eq!(doubled.clone().await.unwrap(), 2);
//!
//! count.set(5i32);
//! assert_eq!(doubled.await.unwrap(), 10);
//! # });
//! ```
//!
//! Async computed values are nodes of the [`reactive_graph`] runtime: they track its signals
//! and memos, can be read by its effects, and are disposed along with the
//! [`Owner`](reactive_graph::owner::Owner) they were created in. Futures are spawned with
//! [`any_spawner::Executor`], so the application chooses the async runtime.

#![deny(missing_docs)]

pub mod computed;
mod error;

pub use error::*;

/// Reexports frequently-used traits.
pub mod prelude {
    pub use reactive_graph::traits::*;
}
