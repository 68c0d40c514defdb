//! Split producer/consumer handles over a [`BoundedQueue`].
//!
//! [`channel`] returns a `(Producer, Consumer)` pair sharing one queue. Both
//! ends are `Clone`, so any number of producers and consumers can be handed
//! to different threads while each can only call its own side of the API.
//!
//! # Example
//!
//! ```
//! use std::num::NonZeroUsize;
//! use hopper::sync::channel;
//!
//! let (tx, rx) = channel::channel::<String>(NonZeroUsize::new(16).unwrap());
//!
//! tx.put("hello".to_string());
//! assert_eq!(rx.take(), "hello");
//! ```

use std::num::NonZeroUsize;
use std::time::Duration;

use crate::cancel::CancelToken;
use crate::error::{PutError, TakeError};
use crate::sync::queue::BoundedQueue;
use crate::timeout::Timeout;

/// Write end of a bounded channel.
#[derive(Debug)]
pub struct Producer<T> {
    queue: BoundedQueue<T>,
}

/// Read end of a bounded channel.
#[derive(Debug)]
pub struct Consumer<T> {
    queue: BoundedQueue<T>,
}

impl<T> Clone for Producer<T> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
        }
    }
}

impl<T> Clone for Consumer<T> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
        }
    }
}

/// Creates a bounded channel holding at most `capacity` items.
#[must_use]
pub fn channel<T>(capacity: NonZeroUsize) -> (Producer<T>, Consumer<T>) {
    split(BoundedQueue::new(capacity))
}

/// Splits an existing queue into producer and consumer ends.
///
/// Other clones of `queue` stay usable and see the same items.
#[must_use]
pub fn split<T>(queue: BoundedQueue<T>) -> (Producer<T>, Consumer<T>) {
    let producer = Producer {
        queue: queue.clone(),
    };
    (producer, Consumer { queue })
}

impl<T> Producer<T> {
    /// Blocks until there is space, then enqueues `item`.
    #[inline]
    pub fn put(&self, item: T) {
        self.queue.put(item);
    }

    /// Enqueues `item` if there is space right now.
    ///
    /// # Errors
    ///
    /// Returns `Err(item)` if the queue is full.
    #[inline]
    pub fn try_put(&self, item: T) -> Result<(), T> {
        self.queue.try_put(item)
    }

    /// # Errors
    ///
    /// Returns [`PutError::Timeout`] if no space opened within `timeout`.
    #[inline]
    pub fn put_timeout(&self, item: T, timeout: Duration) -> Result<(), PutError<T>> {
        self.queue.put_timeout(item, timeout)
    }

    #[must_use]
    pub fn queue(&self) -> &BoundedQueue<T> {
        &self.queue
    }
}

impl<T: Send + 'static> Producer<T> {
    /// # Errors
    ///
    /// See [`BoundedQueue::put_blocking`].
    #[inline]
    pub fn put_blocking(
        &self,
        item: T,
        timeout: Timeout,
        cancel: Option<&CancelToken>,
    ) -> Result<(), PutError<T>> {
        self.queue.put_blocking(item, timeout, cancel)
    }
}

impl<T> Consumer<T> {
    /// Blocks until an item is available, then dequeues it.
    #[inline]
    pub fn take(&self) -> T {
        self.queue.take()
    }

    /// Dequeues the oldest item if there is one.
    #[inline]
    #[must_use]
    pub fn try_take(&self) -> Option<T> {
        self.queue.try_take()
    }

    /// # Errors
    ///
    /// Returns [`TakeError::Timeout`] if nothing arrived within `timeout`.
    #[inline]
    pub fn take_timeout(&self, timeout: Duration) -> Result<T, TakeError> {
        self.queue.take_timeout(timeout)
    }

    /// Removes up to `max` queued items without blocking.
    pub fn drain(&self, max: usize) -> Vec<T> {
        self.queue.drain(max)
    }

    #[must_use]
    pub fn queue(&self) -> &BoundedQueue<T> {
        &self.queue
    }
}

impl<T: Send + 'static> Consumer<T> {
    /// # Errors
    ///
    /// See [`BoundedQueue::take_blocking`].
    #[inline]
    pub fn take_blocking(
        &self,
        timeout: Timeout,
        cancel: Option<&CancelToken>,
    ) -> Result<T, TakeError> {
        self.queue.take_blocking(timeout, cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    fn cap(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn test_ends_share_one_queue() {
        let (tx, rx) = channel::<u32>(cap(4));
        tx.put(1);
        assert_eq!(rx.queue().len(), 1);
        assert_eq!(rx.take(), 1);
        assert!(tx.queue().is_empty());
    }

    #[test]
    fn test_split_existing_queue() {
        let queue = BoundedQueue::with_capacity(2).unwrap();
        queue.put('a');
        let (tx, rx) = split(queue.clone());

        tx.put('b');
        assert_eq!(tx.try_put('c'), Err('c'));
        assert_eq!(rx.drain(8), vec!['a', 'b']);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_send_to_thread() {
        let (tx, rx) = channel::<u64>(cap(16));

        let handle = thread::spawn(move || {
            for i in 0..10 {
                tx.put(i);
            }
        });
        handle.join().unwrap();

        for i in 0..10 {
            assert_eq!(rx.try_take(), Some(i));
        }
        assert_eq!(rx.try_take(), None);
    }

    #[test]
    fn test_cloned_producers_and_consumers() {
        let (tx, rx) = channel::<(usize, usize)>(cap(3));
        let per_producer = 200;

        let producers: Vec<_> = (0..3)
            .map(|id| {
                let tx = tx.clone();
                thread::spawn(move || {
                    for seq in 0..per_producer {
                        tx.put((id, seq));
                    }
                })
            })
            .collect();
        drop(tx);

        let consumers: Vec<_> = (0..2)
            .map(|_| {
                let rx = rx.clone();
                thread::spawn(move || {
                    let mut got = Vec::new();
                    while let Ok(item) = rx.take_timeout(Duration::from_millis(200)) {
                        got.push(item);
                    }
                    got
                })
            })
            .collect();

        for handle in producers {
            handle.join().unwrap();
        }
        let mut seen = HashSet::new();
        for handle in consumers {
            for item in handle.join().unwrap() {
                assert!(seen.insert(item), "duplicate delivery of {item:?}");
            }
        }
        assert_eq!(seen.len(), 3 * per_producer);
    }

    #[test]
    fn test_blocking_ends_with_token() {
        let (tx, rx) = channel::<u8>(cap(1));
        let token = CancelToken::new();

        tx.put_blocking(1, Timeout::Infinite, Some(&token)).unwrap();
        assert_eq!(
            tx.put_blocking(2, Duration::from_millis(10).into(), Some(&token)),
            Err(PutError::Timeout(2))
        );
        assert_eq!(rx.take_blocking(Timeout::Infinite, Some(&token)), Ok(1));

        token.cancel();
        assert_eq!(
            rx.take_blocking(Timeout::Infinite, Some(&token)),
            Err(TakeError::Cancelled)
        );
    }
}
