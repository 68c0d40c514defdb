//! Wait bounds for blocking queue operations.

use std::time::{Duration, Instant};

/// Wait bound for blocking operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Timeout {
    /// Wait indefinitely.
    #[default]
    Infinite,
    /// Wait for at most the specified duration.
    Duration(Duration),
}

impl From<Duration> for Timeout {
    fn from(d: Duration) -> Self {
        Self::Duration(d)
    }
}

impl From<Option<Duration>> for Timeout {
    fn from(d: Option<Duration>) -> Self {
        d.map_or(Self::Infinite, Self::Duration)
    }
}

impl Timeout {
    /// Fixes the timeout to an absolute point, starting now.
    #[must_use]
    pub(crate) fn start(self) -> Deadline {
        match self {
            Self::Infinite => Deadline(None),
            // An unrepresentable deadline is as good as none.
            Self::Duration(d) => Deadline(Instant::now().checked_add(d)),
        }
    }
}

/// Absolute expiry computed once per blocking call, so repeated wake-ups do
/// not stretch the total wait.
///
/// Measured on the std monotonic clock, the same one `Condvar::wait_timeout`
/// sleeps against.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline(Option<Instant>);

impl Deadline {
    /// Time left before expiry.
    ///
    /// `None` means wait without bound, `Some(Duration::ZERO)` means expired.
    pub(crate) fn remaining(&self) -> Option<Duration> {
        self.0
            .map(|at| at.checked_duration_since(Instant::now()).unwrap_or_default())
    }

    pub(crate) fn expired(&self) -> bool {
        self.remaining().is_some_and(|left| left.is_zero())
    }
}
