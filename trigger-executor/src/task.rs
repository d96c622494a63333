//! Units of work accepted by the executor.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Result alias returned by task bodies.
pub type TaskResult<T> = Result<T, TaskError>;

/// Boxed future produced by async task bodies.
pub type TaskFuture<T> = BoxFuture<'static, TaskResult<T>>;

type AsyncBody<T> = dyn Fn(Attempt) -> TaskFuture<T> + Send + Sync;
type BlockingBody<T> = dyn Fn(Attempt) -> TaskResult<T> + Send + Sync;

type ErrorSource = Arc<dyn std::error::Error + Send + Sync>;

/// Failure reported by a task body.
///
/// The typed error a body failed with can be kept as the source and
/// recovered with [`TaskError::downcast_source`].
#[derive(Debug, Clone, Error)]
#[error("{reason}")]
pub struct TaskError {
    reason: String,
    #[source]
    source: Option<ErrorSource>,
}

impl TaskError {
    /// Creates an error from the supplied reason.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            source: None,
        }
    }

    /// Wraps a typed error, using its message as the reason.
    #[must_use]
    pub fn from_source<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            reason: source.to_string(),
            source: Some(Arc::new(source)),
        }
    }

    /// Returns the human-readable reason.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Returns the wrapped error when it is an `E`.
    #[must_use]
    pub fn downcast_source<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        self.source.as_deref()?.downcast_ref::<E>()
    }
}

impl PartialEq for TaskError {
    fn eq(&self, other: &Self) -> bool {
        self.reason == other.reason
    }
}

impl Eq for TaskError {}

impl From<String> for TaskError {
    fn from(reason: String) -> Self {
        Self::new(reason)
    }
}

impl From<&str> for TaskError {
    fn from(reason: &str) -> Self {
        Self::new(reason)
    }
}

/// Per-attempt information handed to a task body.
#[derive(Debug, Clone)]
pub struct Attempt {
    number: u32,
    cancellation: CancellationToken,
}

impl Attempt {
    pub(crate) fn new(number: u32) -> Self {
        Self {
            number,
            cancellation: CancellationToken::new(),
        }
    }

    /// Returns the 1-based attempt number.
    #[must_use]
    pub const fn number(&self) -> u32 {
        self.number
    }

    /// Returns the token cancelled when this attempt is abandoned.
    ///
    /// Blocking bodies should poll [`Attempt::is_cancelled`] (or select on
    /// the token) to stop promptly after a timeout.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Returns `true` once the executor has abandoned this attempt.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// A callable the executor can run any number of times.
pub enum Task<T> {
    /// Body returning a future.
    Async(Arc<AsyncBody<T>>),
    /// Synchronous body that may block the thread it runs on.
    Blocking(Arc<BlockingBody<T>>),
}

impl<T> Clone for Task<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Async(body) => Self::Async(Arc::clone(body)),
            Self::Blocking(body) => Self::Blocking(Arc::clone(body)),
        }
    }
}

impl<T> fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::Async(_) => "async",
            Self::Blocking(_) => "blocking",
        };
        f.debug_tuple("Task").field(&kind).finish()
    }
}

impl<T: Send + 'static> Task<T> {
    /// Wraps an async body.
    pub fn from_async<F, Fut>(body: F) -> Self
    where
        F: Fn(Attempt) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TaskResult<T>> + Send + 'static,
    {
        let body: Arc<AsyncBody<T>> = Arc::new(move |attempt: Attempt| body(attempt).boxed());
        Self::Async(body)
    }

    /// Wraps a synchronous, possibly blocking body.
    pub fn blocking<F>(body: F) -> Self
    where
        F: Fn(Attempt) -> TaskResult<T> + Send + Sync + 'static,
    {
        Self::Blocking(Arc::new(body))
    }

    /// Returns `true` for synchronous bodies.
    #[must_use]
    pub const fn is_blocking(&self) -> bool {
        matches!(self, Self::Blocking(_))
    }
}
