//! Producer and consumer loops driven by the harness.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::thread;
use std::time::Duration;

use minstant::Instant;

use crate::cancel::CancelToken;
use crate::error::{PutError, TakeError};
use crate::sync::queue::BoundedQueue;
use crate::timeout::Timeout;
use crate::trace::{debug, error, info, warn};

/// Lifecycle of a role.
///
/// `Idle -> Running -> {BlockedOnPut | BlockedOnTake} -> Running -> ... -> Terminated`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RoleState {
    Idle = 0,
    Running = 1,
    BlockedOnPut = 2,
    BlockedOnTake = 3,
    Terminated = 4,
}

impl RoleState {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Idle,
            1 => Self::Running,
            2 => Self::BlockedOnPut,
            3 => Self::BlockedOnTake,
            _ => Self::Terminated,
        }
    }
}

/// A role's current [`RoleState`], readable from other threads.
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) const fn new() -> Self {
        Self(AtomicU8::new(RoleState::Idle as u8))
    }

    pub(crate) fn get(&self) -> RoleState {
        RoleState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, state: RoleState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

/// Fires the harness token if the owning role thread unwinds, so roles
/// blocked on the queue do not wait for a peer that is gone.
pub(crate) struct CancelOnPanic<'a> {
    #[cfg_attr(not(feature = "tracing"), allow(dead_code))]
    pub(crate) name: &'a str,
    pub(crate) cancel: &'a CancelToken,
    pub(crate) state: &'a StateCell,
}

impl Drop for CancelOnPanic<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            error!(role = self.name, "role panicked, cancelling harness");
            self.state.set(RoleState::Terminated);
            self.cancel.cancel();
        }
    }
}

/// When a role stops on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCondition {
    /// After this many items have been produced or consumed.
    Count(u64),
    /// Only when cancelled.
    UntilCancelled,
}

impl StopCondition {
    const fn reached(self, processed: u64) -> bool {
        match self {
            Self::Count(limit) => processed >= limit,
            Self::UntilCancelled => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleKind {
    Producer,
    Consumer,
}

/// Why a role reached `Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Completed,
    Cancelled,
}

/// A tagged item: unique across all producers of one harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Item {
    pub producer: usize,
    pub seq: u64,
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.producer, self.seq)
    }
}

/// What a role did before terminating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleReport {
    pub name: String,
    pub kind: RoleKind,
    /// Items successfully put (producer) or taken (consumer).
    pub processed: u64,
    /// Bounded waits that expired and were retried.
    pub timeouts: u64,
    pub stop: StopReason,
    pub elapsed: Duration,
    /// Items a consumer received, in the order it received them.
    ///
    /// Only recorded for counted runs; a consumer running until cancelled
    /// leaves this empty and reports just `processed`.
    pub received: Vec<Item>,
}

/// Per-role settings shared by both loops.
pub(crate) struct RoleSetup<'a> {
    pub(crate) name: &'a str,
    pub(crate) stop: StopCondition,
    pub(crate) pause: Duration,
    pub(crate) wait: Timeout,
    pub(crate) cancel: &'a CancelToken,
    pub(crate) state: &'a StateCell,
}

impl RoleSetup<'_> {
    fn finish(
        &self,
        kind: RoleKind,
        processed: u64,
        timeouts: u64,
        stop: StopReason,
        started: Instant,
        received: Vec<Item>,
    ) -> RoleReport {
        self.state.set(RoleState::Terminated);
        debug!(role = self.name, processed, ?stop, "role terminated");
        RoleReport {
            name: self.name.to_owned(),
            kind,
            processed,
            timeouts,
            stop,
            elapsed: started.elapsed(),
            received,
        }
    }

    /// Inter-iteration pause, taken without touching the queue.
    fn pause(&self) -> Result<(), StopReason> {
        if self.pause.is_zero() {
            return Ok(());
        }
        self.cancel
            .sleep(self.pause)
            .map_err(|_| StopReason::Cancelled)
    }
}

/// Puts `producer:0`, `producer:1`, ... until the stop condition or the
/// cancel token ends the loop.
pub(crate) fn run_producer(
    setup: &RoleSetup<'_>,
    producer: usize,
    queue: &BoundedQueue<Item>,
) -> RoleReport {
    let started = Instant::now();
    let mut seq = 0u64;
    let mut timeouts = 0u64;
    setup.state.set(RoleState::Running);
    debug!(role = setup.name, "producer started");

    let stop = 'produce: loop {
        if setup.stop.reached(seq) {
            break StopReason::Completed;
        }
        if setup.cancel.is_cancelled() {
            break StopReason::Cancelled;
        }

        let mut item = Item { producer, seq };
        if let Err(rejected) = queue.try_put(item) {
            item = rejected;
            setup.state.set(RoleState::BlockedOnPut);
            loop {
                match queue.put_blocking(item, setup.wait, Some(setup.cancel)) {
                    Ok(()) => break,
                    Err(PutError::Timeout(rejected)) => {
                        timeouts += 1;
                        warn!(role = setup.name, item = %rejected, "put timed out, retrying");
                        item = rejected;
                    }
                    Err(PutError::Cancelled(_)) => break 'produce StopReason::Cancelled,
                }
            }
            setup.state.set(RoleState::Running);
        }
        info!(role = setup.name, %item, "produced");
        seq += 1;

        if let Err(stop) = setup.pause() {
            break stop;
        }
    };

    setup.finish(RoleKind::Producer, seq, timeouts, stop, started, Vec::new())
}

/// Takes items until the stop condition or the cancel token ends the loop.
pub(crate) fn run_consumer(setup: &RoleSetup<'_>, queue: &BoundedQueue<Item>) -> RoleReport {
    let started = Instant::now();
    let mut received = Vec::new();
    // Bounded by the count; an open-ended run would grow without limit.
    let record = matches!(setup.stop, StopCondition::Count(_));
    let mut processed = 0u64;
    let mut timeouts = 0u64;
    setup.state.set(RoleState::Running);
    debug!(role = setup.name, "consumer started");

    let stop = 'consume: loop {
        if setup.stop.reached(processed) {
            break StopReason::Completed;
        }
        if setup.cancel.is_cancelled() {
            break StopReason::Cancelled;
        }

        let item = match queue.try_take() {
            Some(item) => item,
            None => {
                setup.state.set(RoleState::BlockedOnTake);
                let item = loop {
                    match queue.take_blocking(setup.wait, Some(setup.cancel)) {
                        Ok(item) => break item,
                        Err(TakeError::Timeout) => {
                            timeouts += 1;
                            warn!(role = setup.name, "take timed out, retrying");
                        }
                        Err(TakeError::Cancelled) => break 'consume StopReason::Cancelled,
                    }
                };
                setup.state.set(RoleState::Running);
                item
            }
        };
        info!(role = setup.name, %item, "consumed");
        processed += 1;
        if record {
            received.push(item);
        }

        if let Err(stop) = setup.pause() {
            break stop;
        }
    };

    setup.finish(RoleKind::Consumer, processed, timeouts, stop, started, received)
}
