//! Cooperative cancellation for blocked producers and consumers.
//!
//! A [`CancelToken`] is shared between whoever owns a role (the harness, a
//! service shutting down) and the role itself. Firing it makes every
//! `put_blocking`/`take_blocking` waiting on that token return a `Cancelled`
//! outcome, and cuts short any [`CancelToken::sleep`] in progress.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use hopper::{BoundedQueue, CancelToken, TakeError, Timeout};
//!
//! let queue = BoundedQueue::<u32>::with_capacity(1).unwrap();
//! let token = CancelToken::new();
//!
//! let waiter = {
//!     let queue = queue.clone();
//!     let token = token.clone();
//!     std::thread::spawn(move || queue.take_blocking(Timeout::Infinite, Some(&token)))
//! };
//!
//! std::thread::sleep(Duration::from_millis(10));
//! token.cancel();
//! assert_eq!(waiter.join().unwrap(), Err(TakeError::Cancelled));
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::time::Duration;

use crate::error::Cancelled;
use crate::sync::{lock, wait};
use crate::timeout::Timeout;

/// Something blocked on a condition that must re-check it when a token fires.
pub(crate) trait Wake: Send + Sync {
    fn wake(&self);
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    wakers: Vec<(u64, Weak<dyn Wake>)>,
}

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
    registry: Mutex<Registry>,
    /// Signalled once, on cancel, for threads inside [`CancelToken::sleep`].
    sleepers: Condvar,
}

/// Shared, one-shot cancellation flag.
///
/// Clones observe the same flag. Once cancelled a token stays cancelled.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires the token and wakes everything waiting on it.
    ///
    /// Idempotent.
    pub fn cancel(&self) {
        let wakers = {
            let mut registry = lock(&self.inner.registry);
            if self.inner.cancelled.swap(true, Ordering::AcqRel) {
                return;
            }
            self.inner.sleepers.notify_all();
            std::mem::take(&mut registry.wakers)
        };

        // The registry lock is released before any queue lock is taken.
        for (_, waker) in wakers {
            if let Some(waker) = waker.upgrade() {
                waker.wake();
            }
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Pauses the calling thread for `duration`, returning early if the
    /// token fires.
    ///
    /// Holds no queue state, so it is safe to use between `put`/`take`
    /// calls to pace a role.
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`] if the token is, or becomes, cancelled before
    /// the pause ends.
    pub fn sleep(&self, duration: Duration) -> Result<(), Cancelled> {
        let deadline = Timeout::Duration(duration).start();
        let mut registry = lock(&self.inner.registry);
        loop {
            if self.is_cancelled() {
                return Err(Cancelled);
            }
            if deadline.expired() {
                return Ok(());
            }
            registry = wait(&self.inner.sleepers, registry, &deadline);
        }
    }

    /// Registers `waker` to be called on cancel until the returned guard
    /// drops.
    ///
    /// If the token has already fired nothing is stored; callers re-check
    /// [`is_cancelled`](Self::is_cancelled) under their own lock afterwards.
    pub(crate) fn register(&self, waker: Weak<dyn Wake>) -> Registration<'_> {
        let mut registry = lock(&self.inner.registry);
        let id = registry.next_id;
        registry.next_id += 1;
        if !self.is_cancelled() {
            registry.wakers.push((id, waker));
        }
        Registration { token: self, id }
    }

    #[cfg(test)]
    fn registered(&self) -> usize {
        lock(&self.inner.registry).wakers.len()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Removes a waker from its token when dropped.
pub(crate) struct Registration<'a> {
    token: &'a CancelToken,
    id: u64,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        let id = self.id;
        lock(&self.token.inner.registry)
            .wakers
            .retain(|(other, _)| *other != id);
    }
}
