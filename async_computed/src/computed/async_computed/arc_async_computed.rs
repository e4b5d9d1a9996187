use super::{
    inner::{AsyncComputedInner, Evaluator},
    round::CellState,
    AsyncComputedFuture, AsyncComputedOptions, AsyncComputedState,
    CancelHandle, Flush,
};
use crate::EvaluationError;
use any_spawner::Executor;
use core::fmt::Debug;
use futures::{channel::mpsc, future, FutureExt, StreamExt, TryFutureExt};
use or_poisoned::OrPoisoned;
use reactive_graph::{
    owner::Owner,
    signal::{
        guards::{Plain, ReadGuard},
        ArcReadSignal, ArcRwSignal, ArcTrigger,
    },
    traits::{
        DefinedAt, Dispose, GetUntracked, IsDisposed, ReadUntracked, Set,
        Track,
    },
};
use std::{
    future::Future,
    panic::Location,
    sync::{Arc, RwLock},
};

/// A reactive value that is derived by running an asynchronous function.
///
/// Each time the evaluator runs is a *round*. Any reactive value the evaluator reads, before
/// or between its `.await` points, becomes a dependency: when one of them changes, a new round
/// starts and supersedes the previous one. Only the most recently started round can change the
/// value, so a slow, stale round can never overwrite the result of a newer one.
///
/// Until the first round settles, reading the value returns the initial value passed to the
/// constructor. Awaiting it waits until the current round has settled.
///
/// ## Examples
/// ```rust
/// # use async_computed::{computed::ArcAsyncComputed, prelude::*};
/// # use reactive_graph::signal::ArcRwSignal;
/// # tokio_test::block_on(async move {
/// # _ = any_spawner::Executor::init_futures_executor();
/// let user_id = ArcRwSignal::new(1u32);
///
/// let user = ArcAsyncComputed::new(String::new(), {
///     let user_id = user_id.clone();
///     move |_cancel| {
///         // read synchronously, so the new id is tracked before anything is awaited
///         let id = user_id.get();
///         async move { format!("user #{id}") }
///     }
/// });
/// assert_eq!(user.clone().await.unwrap(), "user #1");
///
/// user_id.set(2u32);
/// assert_eq!(user.clone().await.unwrap(), "user #2");
/// # });
/// ```
///
/// ## Core Trait Implementations
/// - [`.get()`](reactive_graph::traits::Get) clones the latest committed value, tracking it.
/// - [`.with()`](reactive_graph::traits::With) applies a callback to it by reference, tracking
///   it.
/// - [`.get_untracked()`](reactive_graph::traits::GetUntracked) and
///   [`.with_untracked()`](reactive_graph::traits::WithUntracked) do the same without tracking.
/// - `.await` resolves to the value once the current round has settled, or the error it
///   failed with.
///
/// For a lazy value, any read starts a round if one is needed.
pub struct ArcAsyncComputed<T> {
    pub(crate) inner: Arc<AsyncComputedInner<T>>,
}

impl<T> Clone for ArcAsyncComputed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for ArcAsyncComputed<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.read().or_poisoned();
        f.debug_struct("ArcAsyncComputed")
            .field("type", &std::any::type_name::<T>())
            .field("state", &state.state())
            .field("generation", &state.generation)
            .field("lazy", &self.inner.lazy)
            .finish()
    }
}

impl<T> PartialEq for ArcAsyncComputed<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Eq for ArcAsyncComputed<T> {}

impl<T> DefinedAt for ArcAsyncComputed<T> {
    #[inline(always)]
    fn defined_at(&self) -> Option<&'static Location<'static>> {
        #[cfg(debug_assertions)]
        {
            Some(self.inner.defined_at)
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    }
}

fn evaluator<T, Fut>(
    fun: impl Fn(CancelHandle) -> Fut + Send + Sync + 'static,
) -> Evaluator<T>
where
    Fut: Future<Output = Result<T, EvaluationError>> + Send + 'static,
{
    Box::new(move |cancel| fun(cancel).boxed())
}

impl<T> ArcAsyncComputed<T>
where
    T: Send + Sync + 'static,
{
    /// Creates an eager async computed value from an evaluator that cannot fail.
    ///
    /// The first round starts immediately. `initial` is the value until it settles.
    #[track_caller]
    pub fn new<Fut>(
        initial: T,
        fun: impl Fn(CancelHandle) -> Fut + Send + Sync + 'static,
    ) -> Self
    where
        Fut: Future<Output = T> + Send + 'static,
    {
        Self::with_evaluator(
            initial,
            AsyncComputedOptions::default(),
            evaluator(move |cancel| fun(cancel).map(Ok::<T, EvaluationError>)),
        )
    }

    /// Creates an eager async computed value from an evaluator that may fail.
    ///
    /// A failed round leaves the previous value in place and records the error, which can be
    /// read with [`last_error`](Self::last_error).
    #[track_caller]
    pub fn new_fallible<Fut, E>(
        initial: T,
        fun: impl Fn(CancelHandle) -> Fut + Send + Sync + 'static,
    ) -> Self
    where
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<EvaluationError> + 'static,
    {
        Self::with_options(initial, AsyncComputedOptions::default(), fun)
    }

    /// Creates an async computed value with the given options.
    #[track_caller]
    pub fn with_options<Fut, E>(
        initial: T,
        options: AsyncComputedOptions,
        fun: impl Fn(CancelHandle) -> Fut + Send + Sync + 'static,
    ) -> Self
    where
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<EvaluationError> + 'static,
    {
        Self::with_evaluator(
            initial,
            options,
            evaluator(move |cancel| {
                fun(cancel).map_err(|err| -> EvaluationError { err.into() })
            }),
        )
    }

    /// Creates an async computed value from a synchronous evaluator.
    ///
    /// Each round settles as soon as it starts, so the value is always up to date after a
    /// change, without waiting on the executor.
    #[track_caller]
    pub fn from_fn<E>(
        initial: T,
        options: AsyncComputedOptions,
        fun: impl Fn(CancelHandle) -> Result<T, E> + Send + Sync + 'static,
    ) -> Self
    where
        E: Into<EvaluationError> + 'static,
    {
        Self::with_evaluator(
            initial,
            options,
            evaluator(move |cancel| {
                future::ready(
                    fun(cancel).map_err(|err| -> EvaluationError { err.into() }),
                )
            }),
        )
    }

    #[track_caller]
    fn with_evaluator(
        initial: T,
        options: AsyncComputedOptions,
        evaluator: Evaluator<T>,
    ) -> Self {
        let AsyncComputedOptions {
            lazy,
            flush,
            on_error,
            evaluating,
        } = options;
        #[cfg(debug_assertions)]
        let defined_at = Location::caller();
        let evaluating = evaluating.unwrap_or_else(|| ArcRwSignal::new(false));
        let (notifier, rx) = if !lazy && flush == Flush::Batched {
            let (tx, rx) = mpsc::unbounded();
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        let inner = Arc::new_cyclic(|this| AsyncComputedInner {
            this: this.clone(),
            #[cfg(debug_assertions)]
            defined_at,
            value: Arc::new(RwLock::new(initial)),
            state: RwLock::new(CellState::default()),
            trigger: ArcTrigger::new(),
            evaluator,
            lazy,
            flush,
            on_error,
            evaluating,
            owner: Owner::new(),
            notifier,
        });

        // disposing the enclosing owner disposes this value
        Owner::on_cleanup({
            let this = Arc::downgrade(&inner);
            move || {
                if let Some(this) = this.upgrade() {
                    this.dispose();
                }
            }
        });

        if let Some(mut rx) = rx {
            let this = Arc::downgrade(&inner);
            Executor::spawn(async move {
                // changes queued before the loop wakes share one round, since
                // only the first wake-up finds the value dirty
                while rx.next().await.is_some() {
                    let Some(this) = this.upgrade() else {
                        break;
                    };
                    this.start_round_if(|state| state.dirty);
                }
            });
        }

        let this = Self { inner };
        if lazy {
            // a supplied signal may start out `true`
            if this.inner.evaluating.get_untracked() {
                this.inner.evaluating.set(false);
            }
        } else {
            this.inner.start_round();
        }
        this
    }

    /// A read-only signal that is `true` while a round is in flight.
    ///
    /// This is the same signal passed in [`AsyncComputedOptions::evaluating`], if one was.
    pub fn evaluating(&self) -> ArcReadSignal<bool> {
        self.inner.evaluating.read_only()
    }

    /// Whether a round is in flight, without tracking.
    pub fn is_evaluating(&self) -> bool {
        self.inner.state.read().or_poisoned().evaluating
    }

    /// The error of the most recently committed round, if it failed.
    ///
    /// This is cleared as soon as a round succeeds. Calling it inside an effect or evaluator
    /// subscribes to the value.
    #[track_caller]
    pub fn last_error(&self) -> Option<EvaluationError> {
        self.inner.trigger.track();
        self.inner.state.read().or_poisoned().last_error.clone()
    }

    /// The number of rounds started so far.
    pub fn generation(&self) -> u64 {
        self.inner.state.read().or_poisoned().generation
    }

    /// The current lifecycle state.
    pub fn state(&self) -> AsyncComputedState {
        self.inner.state.read().or_poisoned().state()
    }
}

impl<T: Clone + Send + Sync + 'static> ArcAsyncComputed<T> {
    /// Returns a future that resolves once the current round has settled.
    ///
    /// If another round starts before then, it waits for that one instead. For a lazy value,
    /// this starts a round if one is needed.
    #[track_caller]
    pub fn settled(&self) -> AsyncComputedFuture<T> {
        AsyncComputedFuture {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + Sync + 'static> IsDisposed for ArcAsyncComputed<T> {
    fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }
}

impl<T: Send + Sync + 'static> Dispose for ArcAsyncComputed<T> {
    /// Cancels the outstanding round, releases every dependency, and stops all future rounds.
    ///
    /// Afterwards the `try_` accessors return `None`, and awaiting resolves to
    /// [`ComputeError::Disposed`](crate::ComputeError::Disposed).
    fn dispose(self) {
        self.inner.dispose();
    }
}

impl<T: Send + Sync + 'static> Track for ArcAsyncComputed<T> {
    #[track_caller]
    fn track(&self) {
        // pull first, so a round that commits synchronously does not notify this reader
        self.inner.pull();
        self.inner.trigger.track();
    }
}

impl<T: Send + Sync + 'static> ReadUntracked for ArcAsyncComputed<T> {
    type Value = ReadGuard<T, Plain<T>>;

    #[track_caller]
    fn try_read_untracked(&self) -> Option<Self::Value> {
        self.inner.pull();
        if self.inner.is_disposed() {
            return None;
        }
        Plain::try_new(Arc::clone(&self.inner.value)).map(ReadGuard::new)
    }
}
