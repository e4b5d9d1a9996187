mod arc_async_computed;
pub use arc_async_computed::*;
mod cancel;
pub use cancel::*;
mod future_impls;
pub use future_impls::*;
mod inner;
mod options;
pub use options::*;
mod round;
pub use round::AsyncComputedState;
use futures::Future;
use inner::AsyncComputedInner;
use pin_project_lite::pin_project;
use reactive_graph::{
    graph::{untrack, AnySubscriber, WithObserver},
    owner::Owner,
};
use std::{
    pin::Pin,
    sync::Weak,
    task::{Context, Poll},
};

pin_project! {
    /// The future of a single round, polled inside the value's owner.
    ///
    /// While the round is current, its reads are tracked as dependencies of the value. Once it
    /// has been superseded (or the value disposed) it keeps running, but nothing it reads is
    /// tracked any more.
    pub(crate) struct RoundFuture<T, Fut> {
        token: u64,
        node: Weak<AsyncComputedInner<T>>,
        owner: Owner,
        observer: AnySubscriber,
        #[pin]
        fut: Fut,
    }
}

impl<T, Fut> RoundFuture<T, Fut> {
    pub(crate) fn new(
        token: u64,
        node: Weak<AsyncComputedInner<T>>,
        owner: Owner,
        observer: AnySubscriber,
        fut: Fut,
    ) -> Self {
        Self {
            token,
            node,
            owner,
            observer,
            fut,
        }
    }
}

impl<T, Fut> Future for RoundFuture<T, Fut>
where
    T: Send + Sync + 'static,
    Fut: Future,
{
    type Output = Fut::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let current = this
            .node
            .upgrade()
            .is_some_and(|node| node.is_current(*this.token));
        let observer = this.observer;
        let fut = this.fut;
        this.owner.with(move || {
            if current {
                observer.with_observer(move || fut.poll(cx))
            } else {
                untrack(move || fut.poll(cx))
            }
        })
    }
}
