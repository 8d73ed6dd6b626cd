//! Error types for pool operations
use std::time::Duration;

use thiserror::Error;

/// Boxed source error carried by upstream variants.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for pool operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for pool operations.
///
/// Variants split into terminal errors (never retried by [`Pool::with`]) and
/// retryable ones; [`Error::is_retryable`] is the single classification point
/// consulted by the acquire loop and the retry wrapper.
///
/// [`Pool::with`]: crate::Pool::with
#[derive(Error, Debug)]
pub enum Error {
    /// The pool has been closed; no further admissions.
    #[error("pool is closed")]
    Closed,

    /// No capacity for another live or in-creation item.
    #[error("pool overflow: no capacity for a new item")]
    Overflow,

    /// An item was released in a dead state.
    #[error("item is not alive")]
    ItemNotAlive,

    /// A creation attempt completed without producing an item or an error.
    #[error("no progress can be made")]
    NoProgress,

    /// The caller's context was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// Item creation exceeded the configured deadline.
    #[error("item creation timed out after {timeout:?}")]
    CreateTimeout {
        /// The deadline that was exceeded.
        timeout: Duration,
    },

    /// Authorization failure from the server; never retried.
    #[error("unauthorized")]
    Unauthorized {
        /// The underlying error.
        #[source]
        source: BoxError,
    },

    /// An upstream resource is unavailable.
    #[error("item source unavailable: {reason}")]
    Unavailable {
        /// The unavailability reason.
        reason: String,
        /// Whether the resource might become available later.
        retryable: bool,
    },

    /// Generic internal error.
    #[error("internal error: {message}")]
    Internal {
        /// The error message.
        message: String,
        /// The underlying error.
        #[source]
        source: Option<BoxError>,
    },

    /// Marker wrapper forcing the wrapped error to be treated as retryable.
    ///
    /// Used for context-class failures that originate inside the detached
    /// creation task, where the caller can make progress by trying again.
    #[error(transparent)]
    Retryable(Box<Error>),

    /// Two causes observed across consecutive acquisition attempts.
    #[error("{last} (prior attempt: {prior})")]
    Joined {
        /// The error that ended the acquisition.
        last: Box<Error>,
        /// The error remembered from an earlier attempt.
        prior: Box<Error>,
    },

    /// Acquisition gave up after exhausting its attempt budget.
    #[error(
        "failed to get item from pool after {attempts} attempts and {elapsed:?}, \
         pool has {index} items ({busy} busy, {idle} idle, {create_in_progress} create_in_progress)"
    )]
    Exhausted {
        /// Attempts performed before giving up.
        attempts: usize,
        /// Wall-clock time spent in the acquire loop.
        elapsed: Duration,
        /// Registry size at the time of failure.
        index: usize,
        /// Checked-out items at the time of failure.
        busy: usize,
        /// Idle items at the time of failure.
        idle: usize,
        /// Creations in flight at the time of failure.
        create_in_progress: usize,
        /// The last error seen by the loop, if any.
        #[source]
        source: Option<Box<Error>>,
    },

    /// The retry wrapper ran out of attempts.
    #[error("pool operation failed after {attempts} attempts")]
    RetriesExhausted {
        /// Attempts performed, counting the first call.
        attempts: usize,
        /// The error from the final attempt.
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create an internal error from a message.
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap an upstream authorization failure.
    pub fn unauthorized<E: Into<BoxError>>(source: E) -> Self {
        Self::Unauthorized {
            source: source.into(),
        }
    }

    /// Create an unavailability error, marking whether it is worth retrying.
    pub fn unavailable<S: Into<String>>(reason: S, retryable: bool) -> Self {
        Self::Unavailable {
            reason: reason.into(),
            retryable,
        }
    }

    /// Force `err` to be treated as retryable.
    #[must_use]
    pub fn retryable(err: Error) -> Self {
        Self::Retryable(Box::new(err))
    }

    /// Join the error that ended an attempt with one remembered from an
    /// earlier attempt, keeping both in the cause chain.
    #[must_use]
    pub fn join(last: Error, prior: Option<Error>) -> Self {
        match prior {
            Some(prior) => Self::Joined {
                last: Box::new(last),
                prior: Box::new(prior),
            },
            None => last,
        }
    }

    /// Check if this error is retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Overflow | Self::NoProgress | Self::CreateTimeout { .. } | Self::Retryable(_) => {
                true
            }
            Self::Unavailable { retryable, .. } => *retryable,
            // Retryability of a wrapped cause survives joins and the
            // exhaustion diagnostic.
            Self::Joined { last, .. } => last.is_retryable(),
            Self::Exhausted { source, .. } => source.as_ref().is_some_and(|e| e.is_retryable()),
            Self::Closed
            | Self::ItemNotAlive
            | Self::Cancelled
            | Self::Unauthorized { .. }
            | Self::Internal { .. }
            | Self::RetriesExhausted { .. } => false,
        }
    }

    /// Check if this error is a context-class failure (cancellation or
    /// deadline) rather than a fault of the item source itself.
    #[must_use]
    pub fn is_context(&self) -> bool {
        match self {
            Self::Cancelled | Self::CreateTimeout { .. } => true,
            Self::Retryable(inner) => inner.is_context(),
            _ => false,
        }
    }

    /// Innermost cause on the primary chain, unwrapping the retry, join,
    /// and attempt-reporting wrappers.
    #[must_use]
    pub fn root_cause(&self) -> &Error {
        match self {
            Self::Retryable(inner) => inner.root_cause(),
            Self::Joined { last, .. } => last.root_cause(),
            Self::RetriesExhausted { source, .. } => source.root_cause(),
            Self::Exhausted {
                source: Some(source),
                ..
            } => source.root_cause(),
            _ => self,
        }
    }
}
