//! Bounded blocking MPMC queue for in-process (inter-thread) communication.
//!
//! A fixed-capacity FIFO buffer guarded by one mutex and two condition
//! variables: producers wait on `not_full`, consumers wait on `not_empty`.
//!
//! # Overview
//!
//! - [`BoundedQueue::put`] / [`BoundedQueue::take`] - block without bound
//! - [`BoundedQueue::put_timeout`] / [`BoundedQueue::take_timeout`] - give
//!   up after a duration
//! - [`BoundedQueue::put_blocking`] / [`BoundedQueue::take_blocking`] -
//!   optional timeout plus a [`CancelToken`]
//! - [`BoundedQueue::try_put`] / [`BoundedQueue::try_take`] - never block
//!
//! Any number of threads may hold clones of the queue and call any
//! operation concurrently. Items come out in the order their `put`
//! completed. Which blocked producer (or consumer) is woken first is
//! unspecified.
//!
//! # Example
//!
//! ```
//! use hopper::BoundedQueue;
//!
//! let queue = BoundedQueue::with_capacity(2).unwrap();
//! let consumer = {
//!     let queue = queue.clone();
//!     std::thread::spawn(move || (0..4).map(|_| queue.take()).collect::<Vec<u32>>())
//! };
//!
//! for i in 0..4 {
//!     queue.put(i); // blocks while two items are already waiting
//! }
//! assert_eq!(consumer.join().unwrap(), vec![0, 1, 2, 3]);
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::time::Duration;

use crate::cancel::{CancelToken, Wake};
use crate::error::{CapacityError, PutError, TakeError};
use crate::sync::{lock, wait};
use crate::timeout::{Deadline, Timeout};
use crate::trace::trace;

/// Upper bound on the up-front buffer allocation; larger queues grow on
/// demand.
const PREALLOC_LIMIT: usize = 4096;

/// Everything the mutex protects.
struct State<T> {
    items: VecDeque<T>,
    blocked_putters: usize,
    blocked_takers: usize,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    /// Signalled when an item is removed.
    not_full: Condvar,
    /// Signalled when an item is inserted.
    not_empty: Condvar,
    capacity: NonZeroUsize,
}

impl<T: Send> Wake for Shared<T> {
    fn wake(&self) {
        // Taking the lock orders this wake after any waiter that already
        // checked its token, so the notification cannot slip in between that
        // check and the wait.
        drop(lock(&self.state));
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }
}

/// Fixed-capacity FIFO queue with blocking `put` and `take`.
///
/// Cloning is cheap and yields another handle to the same buffer.
pub struct BoundedQueue<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for BoundedQueue<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.shared.state);
        f.debug_struct("BoundedQueue")
            .field("capacity", &self.shared.capacity)
            .field("len", &state.items.len())
            .field("blocked_putters", &state.blocked_putters)
            .field("blocked_takers", &state.blocked_takers)
            .finish()
    }
}

impl<T> BoundedQueue<T> {
    /// Creates an empty queue holding at most `capacity` items.
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    items: VecDeque::with_capacity(capacity.get().min(PREALLOC_LIMIT)),
                    blocked_putters: 0,
                    blocked_takers: 0,
                }),
                not_full: Condvar::new(),
                not_empty: Condvar::new(),
                capacity,
            }),
        }
    }

    /// Creates an empty queue holding at most `capacity` items.
    ///
    /// # Errors
    ///
    /// Returns [`CapacityError`] if `capacity` is zero.
    pub fn with_capacity(capacity: usize) -> Result<Self, CapacityError> {
        NonZeroUsize::new(capacity)
            .map(Self::new)
            .ok_or(CapacityError)
    }

    /// Appends `item`, waiting for as long as the queue is full.
    pub fn put(&self, item: T) {
        // Only a deadline or a token can end the wait early.
        if self.put_until(item, Timeout::Infinite.start(), None).is_err() {
            unreachable!("unbounded put gave up");
        }
    }

    /// Removes the oldest item, waiting for as long as the queue is empty.
    pub fn take(&self) -> T {
        match self.take_until(Timeout::Infinite.start(), None) {
            Ok(item) => item,
            Err(_) => unreachable!("unbounded take gave up"),
        }
    }

    /// Appends `item`, waiting at most `timeout` for space.
    ///
    /// # Errors
    ///
    /// Returns [`PutError::Timeout`] carrying the item if the queue stayed
    /// full for the whole wait.
    pub fn put_timeout(&self, item: T, timeout: Duration) -> Result<(), PutError<T>> {
        self.put_until(item, Timeout::Duration(timeout).start(), None)
    }

    /// Removes the oldest item, waiting at most `timeout` for one to arrive.
    ///
    /// # Errors
    ///
    /// Returns [`TakeError::Timeout`] if the queue stayed empty for the
    /// whole wait.
    pub fn take_timeout(&self, timeout: Duration) -> Result<T, TakeError> {
        self.take_until(Timeout::Duration(timeout).start(), None)
    }

    /// Appends `item` if there is space right now.
    ///
    /// # Errors
    ///
    /// Returns `Err(item)` if the queue is full, allowing retry.
    pub fn try_put(&self, item: T) -> Result<(), T> {
        let mut state = lock(&self.shared.state);
        if state.items.len() >= self.shared.capacity.get() {
            return Err(item);
        }
        self.push_locked(&mut state, item);
        drop(state);
        self.shared.not_empty.notify_one();
        Ok(())
    }

    /// Removes the oldest item if there is one.
    ///
    /// Returns `None` if the queue is empty.
    #[must_use]
    pub fn try_take(&self) -> Option<T> {
        let item = lock(&self.shared.state).items.pop_front()?;
        self.shared.not_full.notify_one();
        Some(item)
    }

    /// Removes up to `max` items from the head in a single critical section.
    ///
    /// Wakes every blocked producer, since several slots may have opened.
    pub fn drain(&self, max: usize) -> Vec<T> {
        let drained: Vec<T> = {
            let mut state = lock(&self.shared.state);
            let count = max.min(state.items.len());
            state.items.drain(..count).collect()
        };
        if !drained.is_empty() {
            self.shared.not_full.notify_all();
        }
        drained
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.shared.capacity.get()
    }

    /// Number of items currently queued.
    ///
    /// A snapshot: other threads may change it as soon as this returns.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.shared.state).items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity()
    }

    /// Free slots at this instant.
    #[must_use]
    pub fn remaining_capacity(&self) -> usize {
        self.capacity() - self.len()
    }

    /// Producers currently waiting for space.
    #[must_use]
    pub fn blocked_putters(&self) -> usize {
        lock(&self.shared.state).blocked_putters
    }

    /// Consumers currently waiting for an item.
    #[must_use]
    pub fn blocked_takers(&self) -> usize {
        lock(&self.shared.state).blocked_takers
    }

    fn push_locked(&self, state: &mut State<T>, item: T) {
        state.items.push_back(item);
        debug_assert!(
            state.items.len() <= self.shared.capacity.get(),
            "queue length exceeded capacity"
        );
    }

    fn put_until(
        &self,
        item: T,
        deadline: Deadline,
        cancel: Option<&CancelToken>,
    ) -> Result<(), PutError<T>> {
        let capacity = self.shared.capacity.get();
        let mut state = lock(&self.shared.state);
        loop {
            if cancel.is_some_and(CancelToken::is_cancelled) {
                // We may have absorbed a notify_one meant for a producer that
                // can proceed; pass it on.
                if state.items.len() < capacity {
                    self.shared.not_full.notify_one();
                }
                trace!(len = state.items.len(), "put cancelled");
                return Err(PutError::Cancelled(item));
            }
            if state.items.len() < capacity {
                break;
            }
            if deadline.expired() {
                trace!(len = state.items.len(), "put timed out");
                return Err(PutError::Timeout(item));
            }

            trace!(capacity, "put blocked on full queue");
            state.blocked_putters += 1;
            state = wait(&self.shared.not_full, state, &deadline);
            state.blocked_putters -= 1;
        }

        self.push_locked(&mut state, item);
        drop(state);
        self.shared.not_empty.notify_one();
        Ok(())
    }

    fn take_until(&self, deadline: Deadline, cancel: Option<&CancelToken>) -> Result<T, TakeError> {
        let mut state = lock(&self.shared.state);
        let item = loop {
            if cancel.is_some_and(CancelToken::is_cancelled) {
                if !state.items.is_empty() {
                    self.shared.not_empty.notify_one();
                }
                trace!(len = state.items.len(), "take cancelled");
                return Err(TakeError::Cancelled);
            }
            if let Some(item) = state.items.pop_front() {
                break item;
            }
            if deadline.expired() {
                trace!("take timed out");
                return Err(TakeError::Timeout);
            }

            trace!("take blocked on empty queue");
            state.blocked_takers += 1;
            state = wait(&self.shared.not_empty, state, &deadline);
            state.blocked_takers -= 1;
        };

        drop(state);
        self.shared.not_full.notify_one();
        Ok(item)
    }
}

impl<T: Clone> BoundedQueue<T> {
    /// Copies the current contents, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<T> {
        lock(&self.shared.state).items.iter().cloned().collect()
    }
}

impl<T: Send + 'static> BoundedQueue<T> {
    /// Appends `item`, waiting for space until `timeout` expires or `cancel`
    /// fires.
    ///
    /// Cancellation is checked before space: a fired token makes the call
    /// return without enqueuing even if a slot is free.
    ///
    /// # Errors
    ///
    /// - [`PutError::Timeout`] if the wait bound expired
    /// - [`PutError::Cancelled`] if the token fired
    ///
    /// Both hand back the item; the queue is left untouched.
    pub fn put_blocking(
        &self,
        item: T,
        timeout: Timeout,
        cancel: Option<&CancelToken>,
    ) -> Result<(), PutError<T>> {
        let deadline = timeout.start();
        let _registration = cancel.map(|token| token.register(self.waker()));
        self.put_until(item, deadline, cancel)
    }

    /// Removes the oldest item, waiting until `timeout` expires or `cancel`
    /// fires.
    ///
    /// # Errors
    ///
    /// - [`TakeError::Timeout`] if the wait bound expired
    /// - [`TakeError::Cancelled`] if the token fired
    pub fn take_blocking(
        &self,
        timeout: Timeout,
        cancel: Option<&CancelToken>,
    ) -> Result<T, TakeError> {
        let deadline = timeout.start();
        let _registration = cancel.map(|token| token.register(self.waker()));
        self.take_until(deadline, cancel)
    }

    fn waker(&self) -> Weak<dyn Wake> {
        let shared: Arc<dyn Wake> = self.shared.clone();
        Arc::downgrade(&shared)
    }
}
