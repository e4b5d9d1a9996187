use std::{error, fmt, ops, sync::Arc};
use thiserror::Error;

/// The error produced by an evaluator whose round was still current when it failed.
///
/// This is a cheaply-clonable wrapper for any error type: anything that implements
/// [`std::error::Error`] can be converted into it with `?` or `.into()`.
#[derive(Debug, Clone)]
#[repr(transparent)]
pub struct EvaluationError(Arc<dyn error::Error + Send + Sync>);

impl EvaluationError {
    /// Wraps the given error.
    pub fn new(error: impl error::Error + Send + Sync + 'static) -> Self {
        Self(Arc::new(error))
    }

    /// Converts the wrapper into the inner reference-counted error.
    pub fn into_inner(self) -> Arc<dyn error::Error + Send + Sync> {
        self.0
    }
}

impl ops::Deref for EvaluationError {
    type Target = Arc<dyn error::Error + Send + Sync>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for EvaluationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<T> From<T> for EvaluationError
where
    T: error::Error + Send + Sync + 'static,
{
    fn from(value: T) -> Self {
        EvaluationError(Arc::new(value))
    }
}

/// Errors returned when waiting for an async computed value to settle.
#[derive(Error, Debug, Clone)]
pub enum ComputeError {
    /// The latest round settled with an error.
    #[error("the evaluator failed: {0}")]
    Evaluation(EvaluationError),
    /// The value was disposed before or while it was being awaited.
    #[error("the async computed value has already been disposed")]
    Disposed,
}

impl From<EvaluationError> for ComputeError {
    fn from(value: EvaluationError) -> Self {
        ComputeError::Evaluation(value)
    }
}
