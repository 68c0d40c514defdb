//! Threaded producer/consumer harness around a [`BoundedQueue`].
//!
//! The harness owns nothing but the queue, a shared [`CancelToken`] and the
//! role threads. Each producer puts tagged [`Item`]s, each consumer takes
//! and logs them; both may pause between iterations. Roles stop after a
//! fixed count or when the harness is cancelled, even while blocked.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use hopper::harness::{Harness, HarnessConfig, StopReason};
//!
//! let config = HarnessConfig {
//!     capacity: 2,
//!     producers: 2,
//!     consumers: 1,
//!     items_per_producer: Some(5),
//!     produce_pause: Duration::ZERO,
//!     consume_pause: Duration::ZERO,
//!     ..HarnessConfig::default()
//! };
//!
//! let report = Harness::spawn(config)?.join()?;
//! assert_eq!(report.produced(), 10);
//! assert_eq!(report.consumed(), 10);
//! assert!(report.roles.iter().all(|role| role.stop == StopReason::Completed));
//! # Ok::<(), hopper::harness::HarnessError>(())
//! ```

mod config;
mod role;

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use minstant::Instant;
use thiserror::Error;

pub use config::{CONSUMER_CPU_ENV, ConfigError, HarnessConfig, PRODUCER_CPU_ENV};
pub use role::{Item, RoleKind, RoleReport, RoleState, StopCondition, StopReason};

use crate::cancel::CancelToken;
use crate::sync::queue::BoundedQueue;
use crate::trace::{debug, error, info, warn};
use role::{CancelOnPanic, RoleSetup, StateCell, run_consumer, run_producer};

/// Error spawning or joining the harness.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    /// The OS refused to start a role thread.
    #[error("failed to spawn {role}: {source}")]
    Spawn {
        role: String,
        #[source]
        source: std::io::Error,
    },
    /// A role thread panicked instead of returning a report.
    #[error("{0} panicked")]
    RolePanicked(String),
}

/// A running role thread.
struct RoleHandle {
    name: String,
    kind: RoleKind,
    state: Arc<StateCell>,
    thread: Option<JoinHandle<RoleReport>>,
}

/// Outcome of a finished harness run.
#[derive(Debug, Clone)]
pub struct HarnessReport {
    pub roles: Vec<RoleReport>,
    /// Items still queued when the last role stopped, oldest first.
    pub leftover: Vec<Item>,
    pub elapsed: Duration,
}

impl HarnessReport {
    /// Total items successfully put.
    #[must_use]
    pub fn produced(&self) -> u64 {
        self.total(RoleKind::Producer)
    }

    /// Total items successfully taken.
    #[must_use]
    pub fn consumed(&self) -> u64 {
        self.total(RoleKind::Consumer)
    }

    /// Every item taken by any consumer.
    pub fn received(&self) -> impl Iterator<Item = &Item> {
        self.roles.iter().flat_map(|role| role.received.iter())
    }

    fn total(&self, kind: RoleKind) -> u64 {
        self.roles
            .iter()
            .filter(|role| role.kind == kind)
            .map(|role| role.processed)
            .sum()
    }
}

/// Handle to running producer and consumer threads.
///
/// Dropping the handle cancels every role but does not wait for the threads.
/// Use [`Harness::join`] or [`Harness::shutdown`] to collect reports.
pub struct Harness {
    queue: BoundedQueue<Item>,
    cancel: CancelToken,
    roles: Vec<RoleHandle>,
    started: Instant,
}

impl Harness {
    /// Creates the queue and starts every role.
    ///
    /// Consumers are started before producers; the order carries no
    /// guarantee, roles are independent.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or a thread cannot
    /// be spawned. Roles already started are cancelled in that case.
    pub fn spawn(config: HarnessConfig) -> Result<Self, HarnessError> {
        config.validate()?;
        let queue = BoundedQueue::with_capacity(config.capacity)
            .map_err(|_| ConfigError::ZeroCapacity)?;

        info!(
            capacity = config.capacity,
            producers = config.producers,
            consumers = config.consumers,
            items_per_producer = ?config.items_per_producer,
            "harness starting"
        );

        let mut harness = Self {
            queue,
            cancel: CancelToken::new(),
            roles: Vec::with_capacity(config.producers + config.consumers),
            started: Instant::now(),
        };

        for index in 0..config.consumers {
            let cpu = if index == 0 { config.consumer_cpu } else { None };
            harness.start_role(&config, RoleKind::Consumer, index, cpu)?;
        }
        for index in 0..config.producers {
            let cpu = if index == 0 { config.producer_cpu } else { None };
            harness.start_role(&config, RoleKind::Producer, index, cpu)?;
        }

        info!("harness started");
        Ok(harness)
    }

    fn start_role(
        &mut self,
        config: &HarnessConfig,
        kind: RoleKind,
        index: usize,
        cpu: Option<usize>,
    ) -> Result<(), HarnessError> {
        let name = match kind {
            RoleKind::Producer => format!("hopper-producer-{index}"),
            RoleKind::Consumer => format!("hopper-consumer-{index}"),
        };
        let (stop, pause) = match kind {
            RoleKind::Producer => (config.producer_stop(), config.produce_pause),
            RoleKind::Consumer => (config.consumer_stop(index), config.consume_pause),
        };
        let wait = config.wait();
        let state = Arc::new(StateCell::new());

        let thread = {
            let role_name = name.clone();
            let queue = self.queue.clone();
            let cancel = self.cancel.clone();
            let state = Arc::clone(&state);
            debug!(role = %name, ?stop, "spawning role");
            thread::Builder::new()
                .name(name.clone())
                .spawn(move || {
                    let _guard = CancelOnPanic {
                        name: &role_name,
                        cancel: &cancel,
                        state: &state,
                    };
                    pin_to_cpu(&role_name, cpu);
                    let setup = RoleSetup {
                        name: &role_name,
                        stop,
                        pause,
                        wait,
                        cancel: &cancel,
                        state: &state,
                    };
                    match kind {
                        RoleKind::Producer => run_producer(&setup, index, &queue),
                        RoleKind::Consumer => run_consumer(&setup, &queue),
                    }
                })
                .map_err(|source| HarnessError::Spawn {
                    role: name.clone(),
                    source,
                })?
        };

        self.roles.push(RoleHandle {
            name,
            kind,
            state,
            thread: Some(thread),
        });
        Ok(())
    }

    /// The queue shared by every role.
    #[must_use]
    pub fn queue(&self) -> &BoundedQueue<Item> {
        &self.queue
    }

    /// Token that cancels every role when fired.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Asks every role to stop, without waiting.
    pub fn cancel(&self) {
        info!("harness cancel requested");
        self.cancel.cancel();
    }

    /// Current state of every role, in spawn order.
    #[must_use]
    pub fn states(&self) -> Vec<(&str, RoleKind, RoleState)> {
        self.roles
            .iter()
            .map(|role| (role.name.as_str(), role.kind, role.state.get()))
            .collect()
    }

    /// True once every role has terminated.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.roles
            .iter()
            .all(|role| role.state.get() == RoleState::Terminated)
    }

    /// Waits for every role to stop on its own and collects the reports.
    ///
    /// Roles configured to run until cancelled only stop once
    /// [`cancel`](Self::cancel) is called from another thread or through
    /// [`cancel_token`](Self::cancel_token).
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::RolePanicked`] if a role thread panicked.
    /// A panicking role fires the harness token as it unwinds, so the
    /// remaining roles are cancelled and joined before this returns.
    pub fn join(mut self) -> Result<HarnessReport, HarnessError> {
        let mut reports = Vec::with_capacity(self.roles.len());
        let mut panicked = None;

        for role in &mut self.roles {
            let Some(thread) = role.thread.take() else {
                continue;
            };
            debug!(role = %role.name, "waiting for role to exit");
            match thread.join() {
                Ok(report) => reports.push(report),
                Err(_) => {
                    error!(role = %role.name, "role panicked");
                    self.cancel.cancel();
                    panicked.get_or_insert_with(|| role.name.clone());
                }
            }
        }

        if let Some(name) = panicked {
            return Err(HarnessError::RolePanicked(name));
        }

        let report = HarnessReport {
            roles: reports,
            leftover: self.queue.drain(usize::MAX),
            elapsed: self.started.elapsed(),
        };
        info!(
            produced = report.produced(),
            consumed = report.consumed(),
            leftover = report.leftover.len(),
            "harness finished"
        );
        Ok(report)
    }

    /// Cancels every role, then joins them.
    ///
    /// # Errors
    ///
    /// See [`join`](Self::join).
    pub fn shutdown(self) -> Result<HarnessReport, HarnessError> {
        self.cancel();
        self.join()
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        // Roles still running are told to stop; their threads are detached.
        self.cancel.cancel();
    }
}

#[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
fn pin_to_cpu(role: &str, cpu: Option<usize>) {
    let Some(id) = cpu else {
        return;
    };
    if core_affinity::set_for_current(core_affinity::CoreId { id }) {
        debug!(role, cpu = id, "pinned role");
    } else {
        warn!(role, cpu = id, "failed to pin role");
    }
}
