use futures::future::{AbortHandle, Abortable};
use or_poisoned::OrPoisoned;
use std::{
    fmt::Debug,
    future::Future,
    mem,
    pin::Pin,
    sync::{Arc, Mutex},
    task::{Context, Poll, Waker},
};

type Cleanup = Box<dyn FnOnce() + Send>;

/// The cancellation registry of a single evaluation round.
///
/// Every call to the evaluator receives a fresh handle. Cleanups registered on it run exactly
/// once, in registration order, when the round is superseded by a newer one or the async
/// computed value is disposed. They never run for a round that settles while it is still
/// current.
///
/// Cancellation is cooperative: the engine never stops polling a superseded round's future by
/// itself. Use [`on_cancel`](Self::on_cancel) to abort timers or requests,
/// [`abortable`](Self::abortable) to stop a future at its next poll, or
/// [`cancelled`](Self::cancelled) to race against cancellation.
///
/// ```rust
/// # tokio_test::block_on(async move {
/// # _ = any_spawner::Executor::init_futures_executor();
/// use async_computed::{computed::ArcAsyncComputed, prelude::*};
///
/// let value = ArcAsyncComputed::new(None, |cancel| {
///     cancel.on_cancel(|| println!("no longer needed"));
///     async move { cancel.abortable(async { 42 }).await.ok() }
/// });
/// assert_eq!(value.await.unwrap(), Some(42));
/// # });
/// ```
#[derive(Clone)]
pub struct CancelHandle {
    inner: Arc<Mutex<Registry>>,
}

enum Registry {
    Pending {
        cleanups: Vec<Cleanup>,
        wakers: Vec<Waker>,
    },
    Cancelled,
}

impl Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl CancelHandle {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Registry::Pending {
                cleanups: Vec::new(),
                wakers: Vec::new(),
            })),
        }
    }

    /// Registers a cleanup to run when this round is cancelled.
    ///
    /// If the round has already been cancelled, the cleanup runs immediately.
    pub fn on_cancel(&self, cleanup: impl FnOnce() + Send + 'static) {
        let mut lock = self.inner.lock().or_poisoned();
        if let Registry::Pending { cleanups, .. } = &mut *lock {
            cleanups.push(Box::new(cleanup));
            return;
        }
        drop(lock);
        cleanup();
    }

    /// Whether this round has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(*self.inner.lock().or_poisoned(), Registry::Cancelled)
    }

    /// Returns a [`Future`] that resolves once this round has been cancelled.
    ///
    /// If the round settles while still current, this never resolves.
    pub fn cancelled(&self) -> Cancelled {
        Cancelled {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Wraps a future so that it stops at its next poll once this round is cancelled,
    /// resolving to `Err(Aborted)`.
    pub fn abortable<Fut: Future>(&self, fut: Fut) -> Abortable<Fut> {
        let (handle, registration) = AbortHandle::new_pair();
        self.on_cancel(move || handle.abort());
        Abortable::new(fut, registration)
    }

    /// Runs every registered cleanup, in registration order. Only the first call has any
    /// effect.
    pub(crate) fn cancel(&self) -> bool {
        let prev = mem::replace(
            &mut *self.inner.lock().or_poisoned(),
            Registry::Cancelled,
        );
        match prev {
            Registry::Pending { cleanups, wakers } => {
                for waker in wakers {
                    waker.wake();
                }
                for cleanup in cleanups {
                    cleanup();
                }
                true
            }
            Registry::Cancelled => false,
        }
    }
}

/// A [`Future`] that resolves when an evaluation round is cancelled.
///
/// Created by [`CancelHandle::cancelled`].
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Cancelled {
    inner: Arc<Mutex<Registry>>,
}

impl Future for Cancelled {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut *self.inner.lock().or_poisoned() {
            Registry::Cancelled => Poll::Ready(()),
            Registry::Pending { wakers, .. } => {
                if !wakers.iter().any(|w| w.will_wake(cx.waker())) {
                    wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}
