//! Synchronization primitives for in-process communication.
//!
//! This module provides the bounded blocking queue and the split
//! producer/consumer handles built on it.

pub mod channel;
pub mod queue;

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use crate::timeout::Deadline;

/// Locks `mutex`, recovering the guard if another thread panicked while
/// holding it.
///
/// Every critical section in this crate leaves its data consistent at each
/// step, so a poisoned lock carries no torn state.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Blocks on `condvar` until notified or `deadline` passes, releasing the
/// lock for the duration of the wait.
///
/// May return early (spurious wake-up); callers loop and re-check.
pub(crate) fn wait<'a, T>(
    condvar: &Condvar,
    guard: MutexGuard<'a, T>,
    deadline: &Deadline,
) -> MutexGuard<'a, T> {
    match deadline.remaining() {
        Some(left) => {
            condvar
                .wait_timeout(guard, left)
                .unwrap_or_else(PoisonError::into_inner)
                .0
        }
        None => condvar.wait(guard).unwrap_or_else(PoisonError::into_inner),
    }
}
