use super::{
    round::{CellState, Committed},
    CancelHandle, Flush, OnError, RoundFuture,
};
use crate::EvaluationError;
use any_spawner::Executor;
use futures::{channel::mpsc::UnboundedSender, future::BoxFuture, FutureExt};
use or_poisoned::OrPoisoned;
use reactive_graph::{
    graph::{
        AnySource, AnySubscriber, ReactiveNode, Source, Subscriber,
        ToAnySubscriber, WithObserver,
    },
    owner::Owner,
    signal::{ArcRwSignal, ArcTrigger},
    traits::{GetUntracked, Notify, Set},
};
use std::{
    mem,
    sync::{Arc, RwLock, Weak},
};

pub(crate) type Evaluator<T> = Box<
    dyn Fn(CancelHandle) -> BoxFuture<'static, Result<T, EvaluationError>>
        + Send
        + Sync,
>;

pub(crate) struct AsyncComputedInner<T> {
    pub this: Weak<AsyncComputedInner<T>>,
    #[cfg(debug_assertions)]
    pub defined_at: &'static std::panic::Location<'static>,
    // the committed value; only written while `state` is locked
    pub value: Arc<RwLock<T>>,
    pub state: RwLock<CellState>,
    // readers subscribe to this, and are notified on every commit
    pub trigger: ArcTrigger,
    pub evaluator: Evaluator<T>,
    pub lazy: bool,
    pub flush: Flush,
    pub on_error: Option<OnError>,
    // mirrors `state.evaluating` for reactive readers
    pub evaluating: ArcRwSignal<bool>,
    // parent of everything created while an evaluator runs
    pub owner: Owner,
    // wakes the flush loop; only set for eager values with a batched flush
    pub notifier: Option<UnboundedSender<()>>,
}

impl<T> AsyncComputedInner<T> {
    pub fn is_current(&self, token: u64) -> bool {
        self.state.read().or_poisoned().is_current(token)
    }

    pub fn is_disposed(&self) -> bool {
        self.state.read().or_poisoned().disposed
    }

    /// Whether awaiting the value has to wait for a round that is running or about to run.
    pub fn is_settling(&self, state: &CellState) -> bool {
        state.evaluating || (state.dirty && self.notifier.is_some())
    }

    // copies the lock-protected flag into the public signal, notifying only on change
    fn sync_evaluating(&self) {
        let evaluating = self.state.read().or_poisoned().evaluating;
        if self.evaluating.get_untracked() != evaluating {
            self.evaluating.set(evaluating);
        }
    }
}

impl<T: Send + Sync + 'static> AsyncComputedInner<T> {
    /// Starts a new round, superseding the current one.
    pub fn start_round(&self) -> bool {
        self.start_round_if(|_| true)
    }

    /// Starts a new round if the value is not disposed and `should_start` agrees, checked under
    /// the same lock that registers the round.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn start_round_if(
        &self,
        should_start: impl FnOnce(&CellState) -> bool,
    ) -> bool {
        let start = {
            let mut state = self.state.write().or_poisoned();
            if state.disposed || !should_start(&state) {
                return false;
            }
            state.begin_round()
        };

        #[cfg(feature = "tracing")]
        tracing::trace!(generation = start.token, "starting round");

        if let Some(superseded) = start.superseded {
            if superseded.cancel() {
                #[cfg(feature = "tracing")]
                tracing::trace!(
                    generation = start.token - 1,
                    "cancelled superseded round"
                );
            }
        }
        let subscriber = self.to_any_subscriber();
        for source in start.stale_sources {
            source.remove_subscriber(&subscriber);
        }
        self.sync_evaluating();

        self.invoke(start.token, start.cancel, subscriber);
        true
    }

    fn invoke(&self, token: u64, cancel: CancelHandle, subscriber: AnySubscriber) {
        // whatever the previous round created inside the owner is cleaned up now
        let fut = self.owner.with_cleanup(|| {
            subscriber.with_observer(|| (self.evaluator)(cancel))
        });
        let mut fut = Box::pin(RoundFuture::new(
            token,
            self.this.clone(),
            self.owner.clone(),
            subscriber,
            fut,
        ));

        // evaluators that are ready on their first poll commit without a trip to the executor
        match fut.as_mut().now_or_never() {
            Some(outcome) => self.commit(token, outcome),
            None => {
                let this = self.this.clone();
                Executor::spawn(async move {
                    let outcome = fut.await;
                    if let Some(this) = this.upgrade() {
                        this.commit(token, outcome);
                    }
                });
            }
        }
    }

    /// Applies the outcome of round `token` if it is still current, then notifies.
    pub fn commit(&self, token: u64, outcome: Result<T, EvaluationError>) {
        let committed = {
            let mut state = self.state.write().or_poisoned();
            let mut committed = state.commit(token, outcome);
            if let Some(Committed {
                value: Some(value), ..
            }) = &mut committed
            {
                mem::swap(&mut *self.value.write().or_poisoned(), value);
            }
            committed
        };
        let Some(Committed { error, wakers, .. }) = committed else {
            #[cfg(feature = "tracing")]
            tracing::trace!(generation = token, "discarded stale round");
            return;
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(
            generation = token,
            failed = error.is_some(),
            "committed round"
        );

        self.sync_evaluating();
        if let (Some(error), Some(on_error)) = (&error, &self.on_error) {
            on_error(error);
        }
        self.trigger.notify();
        for waker in wakers {
            waker.wake();
        }
    }

    /// Starts a round for a lazy value that has never run, or whose sources have changed.
    pub fn pull(&self) {
        if self.lazy {
            self.start_round_if(|state| {
                !state.evaluating && (state.generation == 0 || state.dirty)
            });
        }
    }

    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn dispose(&self) {
        let (round, sources, wakers) = {
            let mut state = self.state.write().or_poisoned();
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.evaluating = false;
            (
                state.round.take(),
                mem::take(&mut state.sources),
                mem::take(&mut state.wakers),
            )
        };
        if let Some(round) = round {
            round.cancel();
        }
        let subscriber = self.to_any_subscriber();
        for source in sources {
            source.remove_subscriber(&subscriber);
        }
        self.trigger.clear_subscribers();
        self.sync_evaluating();
        self.owner.cleanup();
        for waker in wakers {
            waker.wake();
        }
    }
}

impl<T> Drop for AsyncComputedInner<T> {
    fn drop(&mut self) {
        if let Ok(state) = self.state.get_mut() {
            if let Some(round) = state.round.take() {
                round.cancel();
            }
        }
    }
}

impl<T: Send + Sync + 'static> ReactiveNode for AsyncComputedInner<T> {
    fn mark_dirty(&self) {
        if self.lazy {
            {
                let mut state = self.state.write().or_poisoned();
                if state.disposed {
                    return;
                }
                state.dirty = true;
            }
            // readers pull the new round when they next read
            self.trigger.notify();
            return;
        }

        match self.flush {
            Flush::Sync => {
                self.start_round();
            }
            Flush::Batched => {
                {
                    let mut state = self.state.write().or_poisoned();
                    if state.disposed {
                        return;
                    }
                    state.dirty = true;
                }
                if let Some(notifier) = &self.notifier {
                    _ = notifier.unbounded_send(());
                }
            }
        }
    }

    fn mark_check(&self) {
        if self.update_if_necessary() {
            self.mark_dirty();
        }
    }

    fn mark_subscribers_check(&self) {}

    fn update_if_necessary(&self) -> bool {
        let sources = self.state.read().or_poisoned().sources.clone();
        sources
            .into_iter()
            .any(|source| source.update_if_necessary())
    }
}

impl<T: Send + Sync + 'static> Subscriber for AsyncComputedInner<T> {
    fn add_source(&self, source: AnySource) {
        self.state.write().or_poisoned().track(source);
    }

    fn clear_sources(&self, subscriber: &AnySubscriber) {
        let sources = mem::take(&mut self.state.write().or_poisoned().sources);
        for source in sources {
            source.remove_subscriber(subscriber);
        }
    }
}

impl<T: Send + Sync + 'static> ToAnySubscriber for AsyncComputedInner<T> {
    fn to_any_subscriber(&self) -> AnySubscriber {
        AnySubscriber(
            self.this.as_ptr() as usize,
            self.this.clone() as Weak<dyn Subscriber + Send + Sync>,
        )
    }
}
