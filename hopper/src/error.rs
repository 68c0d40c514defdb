//! Outcomes of queue operations that did not complete.

use thiserror::Error;

/// A blocking `put` that gave up. The rejected item is handed back.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PutError<T> {
    /// The wait bound expired while the queue stayed full.
    #[error("timed out waiting for queue space")]
    Timeout(T),
    /// The caller's cancel token fired while it was waiting.
    #[error("put cancelled")]
    Cancelled(T),
}

impl<T> PutError<T> {
    /// Recovers the item that was not enqueued.
    pub fn into_inner(self) -> T {
        match self {
            Self::Timeout(item) | Self::Cancelled(item) => item,
        }
    }

    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

/// A blocking `take` that gave up without removing anything.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TakeError {
    /// The wait bound expired while the queue stayed empty.
    #[error("timed out waiting for an item")]
    Timeout,
    /// The caller's cancel token fired while it was waiting.
    #[error("take cancelled")]
    Cancelled,
}

impl TakeError {
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Returned by [`CancelToken::sleep`](crate::CancelToken::sleep) when the
/// token fires before the pause ends.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("cancelled")]
pub struct Cancelled;

/// Queue capacity must be at least one.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("queue capacity must be greater than 0")]
pub struct CapacityError;
