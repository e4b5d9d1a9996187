//! Generation counting and commit rules.
//!
//! Every started round takes the next generation as its token. A settled round may only
//! commit while its token is still the current generation; anything else is stale and is
//! dropped without a trace. This makes commit order follow start order, regardless of the
//! order in which rounds actually finish.

use super::CancelHandle;
use crate::EvaluationError;
use reactive_graph::graph::AnySource;
use std::{mem, task::Waker};

/// The lifecycle state of an async computed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AsyncComputedState {
    /// No round has started yet. Only lazy values are ever in this state.
    Uninitialized,
    /// The most recently started round has not settled.
    Evaluating,
    /// The most recently started round has settled.
    Settled,
    /// The value has been disposed; no further rounds will start.
    Disposed,
}

/// The bookkeeping of an async computed value, kept behind a single lock so that starting and
/// committing rounds are atomic with respect to each other.
#[derive(Default)]
pub(crate) struct CellState {
    pub generation: u64,
    pub evaluating: bool,
    pub last_error: Option<EvaluationError>,
    // the cancellation registry of the current round, while it is outstanding
    pub round: Option<CancelHandle>,
    // a tracked source has changed since the current round started
    pub dirty: bool,
    pub disposed: bool,
    // what the current round has read so far
    pub sources: Vec<AnySource>,
    // `.await`ers waiting for the current round to settle
    pub wakers: Vec<Waker>,
}

/// What the caller must do after a round has been registered as started.
pub(crate) struct RoundStart {
    pub token: u64,
    pub cancel: CancelHandle,
    /// The registry of the round this one supersedes, if it had not settled.
    pub superseded: Option<CancelHandle>,
    /// Sources tracked by the previous round, to unsubscribe from.
    pub stale_sources: Vec<AnySource>,
}

/// What the caller must do after a round has committed.
pub(crate) struct Committed<T> {
    /// The new value, unless the round failed.
    pub value: Option<T>,
    pub error: Option<EvaluationError>,
    pub wakers: Vec<Waker>,
}

impl CellState {
    pub fn state(&self) -> AsyncComputedState {
        if self.disposed {
            AsyncComputedState::Disposed
        } else if self.evaluating {
            AsyncComputedState::Evaluating
        } else if self.generation == 0 {
            AsyncComputedState::Uninitialized
        } else {
            AsyncComputedState::Settled
        }
    }

    pub fn is_current(&self, token: u64) -> bool {
        !self.disposed && token == self.generation
    }

    /// Records a source read by the current round, once.
    pub fn track(&mut self, source: AnySource) {
        if !self.disposed && !self.sources.contains(&source) {
            self.sources.push(source);
        }
    }

    /// Issues the next token and makes it the only round allowed to commit.
    pub fn begin_round(&mut self) -> RoundStart {
        self.generation += 1;
        self.evaluating = true;
        self.dirty = false;
        let cancel = CancelHandle::new();
        RoundStart {
            token: self.generation,
            superseded: self.round.replace(cancel.clone()),
            cancel,
            stale_sources: mem::take(&mut self.sources),
        }
    }

    /// Applies the outcome of round `token`, if it is still current.
    ///
    /// Returns `None` if the round is stale (or the value disposed), in which case nothing
    /// has changed.
    pub fn commit<T>(
        &mut self,
        token: u64,
        outcome: Result<T, EvaluationError>,
    ) -> Option<Committed<T>> {
        if !self.is_current(token) {
            return None;
        }
        let (value, error) = match outcome {
            Ok(value) => {
                self.last_error = None;
                (Some(value), None)
            }
            Err(error) => {
                self.last_error = Some(error.clone());
                (None, Some(error))
            }
        };
        self.evaluating = false;
        // a settled round can no longer be cancelled
        self.round = None;
        Some(Committed {
            value,
            error,
            wakers: mem::take(&mut self.wakers),
        })
    }
}
