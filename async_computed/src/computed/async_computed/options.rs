use crate::EvaluationError;
use reactive_graph::signal::ArcRwSignal;
use std::{fmt::Debug, sync::Arc};

pub(crate) type OnError = Arc<dyn Fn(&EvaluationError) + Send + Sync>;

/// When an eager async computed value starts a new round after one of its dependencies changes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Flush {
    /// Start the round synchronously, inside the change notification.
    ///
    /// Every change starts (and supersedes) a round.
    #[default]
    Sync,
    /// Start the round on the next tick of the executor.
    ///
    /// Any number of changes made before then start a single round.
    Batched,
}

/// Options for constructing an [`ArcAsyncComputed`](super::ArcAsyncComputed).
///
/// ```
/// use async_computed::computed::{AsyncComputedOptions, Flush};
/// use reactive_graph::signal::ArcRwSignal;
///
/// let loading = ArcRwSignal::new(false);
/// let options = AsyncComputedOptions::default()
///     .lazy(false)
///     .flush(Flush::Batched)
///     .evaluating(loading)
///     .on_error(|err| eprintln!("could not load: {err}"));
/// ```
#[derive(Clone, Default)]
#[must_use]
pub struct AsyncComputedOptions {
    pub(crate) lazy: bool,
    pub(crate) flush: Flush,
    pub(crate) on_error: Option<OnError>,
    pub(crate) evaluating: Option<ArcRwSignal<bool>>,
}

impl Debug for AsyncComputedOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncComputedOptions")
            .field("lazy", &self.lazy)
            .field("flush", &self.flush)
            .field("on_error", &self.on_error.is_some())
            .field("evaluating", &self.evaluating)
            .finish()
    }
}

impl AsyncComputedOptions {
    /// Creates the default options: eager, synchronous flush, no error handler.
    pub fn new() -> Self {
        Self::default()
    }

    /// If `true`, rounds only start when the value is read, and only if a dependency has
    /// changed since the last round started. Defaults to `false`.
    pub fn lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    /// When an eager value starts a round after a dependency changes. Defaults to
    /// [`Flush::Sync`]. Ignored for lazy values.
    pub fn flush(mut self, flush: Flush) -> Self {
        self.flush = flush;
        self
    }

    /// Called with the error whenever the current round fails.
    ///
    /// Failures of superseded rounds are discarded without calling this.
    pub fn on_error(
        mut self,
        on_error: impl Fn(&EvaluationError) + Send + Sync + 'static,
    ) -> Self {
        self.on_error = Some(Arc::new(on_error));
        self
    }

    /// Mirrors the in-flight flag into an existing signal, instead of a new one.
    pub fn evaluating(mut self, signal: ArcRwSignal<bool>) -> Self {
        self.evaluating = Some(signal);
        self
    }
}
