use super::{inner::AsyncComputedInner, ArcAsyncComputed};
use crate::ComputeError;
use or_poisoned::OrPoisoned;
use reactive_graph::traits::Track;
use std::{
    future::{Future, IntoFuture},
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

impl<T> IntoFuture for ArcAsyncComputed<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Output = Result<T, ComputeError>;
    type IntoFuture = AsyncComputedFuture<T>;

    #[track_caller]
    fn into_future(self) -> Self::IntoFuture {
        self.settled()
    }
}

/// A [`Future`] that is ready when an [`ArcAsyncComputed`] has settled.
///
/// Resolves to the committed value, or to the error the latest round failed with. Polling it
/// inside an evaluator tracks the value as a dependency of that evaluator.
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct AsyncComputedFuture<T> {
    pub(crate) inner: Arc<AsyncComputedInner<T>>,
}

impl<T> Future for AsyncComputedFuture<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Output = Result<T, ComputeError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.pull();
        self.inner.trigger.track();

        let mut state = self.inner.state.write().or_poisoned();
        if state.disposed {
            Poll::Ready(Err(ComputeError::Disposed))
        } else if self.inner.is_settling(&state) {
            // also covers a batched change whose round the flush loop has yet to start
            if !state.wakers.iter().any(|w| w.will_wake(cx.waker())) {
                state.wakers.push(cx.waker().clone());
            }
            Poll::Pending
        } else {
            Poll::Ready(match &state.last_error {
                Some(error) => Err(ComputeError::Evaluation(error.clone())),
                None => Ok(self.inner.value.read().or_poisoned().clone()),
            })
        }
    }
}
