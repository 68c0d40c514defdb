//! Harness configuration.

use std::time::Duration;

use thiserror::Error;

use super::role::StopCondition;
use crate::timeout::Timeout;

/// Environment variable selecting the CPU for the first producer.
pub const PRODUCER_CPU_ENV: &str = "PRODUCER_CPU";
/// Environment variable selecting the CPU for the first consumer.
pub const CONSUMER_CPU_ENV: &str = "CONSUMER_CPU";

/// Invalid harness settings.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("queue capacity must be greater than 0")]
    ZeroCapacity,
    #[error("at least one producer is required")]
    NoProducers,
    #[error("at least one consumer is required")]
    NoConsumers,
    #[error("{producers} producers x {per_producer} items overflows the item count")]
    TooManyItems { producers: usize, per_producer: u64 },
    #[error("missing value for {0}")]
    MissingValue(String),
    #[error("invalid value for {flag}: {value:?}")]
    InvalidValue { flag: String, value: String },
    #[error("unknown argument: {0}")]
    UnknownArgument(String),
}

/// Configuration for [`Harness::spawn`](super::Harness::spawn).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Queue capacity.
    pub capacity: usize,
    /// Number of producer threads.
    pub producers: usize,
    /// Number of consumer threads.
    pub consumers: usize,
    /// Items each producer puts before stopping; `None` runs until cancelled.
    pub items_per_producer: Option<u64>,
    /// Pause after each successful put.
    pub produce_pause: Duration,
    /// Pause after each successful take.
    pub consume_pause: Duration,
    /// Bound on each blocking put/take before it is logged and retried.
    pub wait_timeout: Option<Duration>,
    /// CPU to pin the first producer to.
    pub producer_cpu: Option<usize>,
    /// CPU to pin the first consumer to.
    pub consumer_cpu: Option<usize>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            capacity: 5,
            producers: 1,
            consumers: 1,
            items_per_producer: Some(10),
            produce_pause: Duration::from_millis(500),
            consume_pause: Duration::from_millis(1000),
            wait_timeout: None,
            producer_cpu: None,
            consumer_cpu: None,
        }
    }
}

impl HarnessConfig {
    /// # Errors
    ///
    /// Returns the first setting that cannot run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.producers == 0 {
            return Err(ConfigError::NoProducers);
        }
        if self.consumers == 0 {
            return Err(ConfigError::NoConsumers);
        }
        if let Some(per_producer) = self.items_per_producer
            && self.total_items(per_producer).is_none()
        {
            return Err(ConfigError::TooManyItems {
                producers: self.producers,
                per_producer,
            });
        }
        Ok(())
    }

    /// Fills unset CPU pins from `PRODUCER_CPU` / `CONSUMER_CPU`.
    ///
    /// Unparseable values are ignored.
    #[must_use]
    pub fn with_cpus_from_env(mut self) -> Self {
        let from_env = |key: &str| std::env::var(key).ok().and_then(|s| s.trim().parse().ok());
        self.producer_cpu = self.producer_cpu.or_else(|| from_env(PRODUCER_CPU_ENV));
        self.consumer_cpu = self.consumer_cpu.or_else(|| from_env(CONSUMER_CPU_ENV));
        self
    }

    pub(crate) fn wait(&self) -> Timeout {
        self.wait_timeout.into()
    }

    pub(crate) fn producer_stop(&self) -> StopCondition {
        self.items_per_producer
            .map_or(StopCondition::UntilCancelled, StopCondition::Count)
    }

    /// Splits the total item count across consumers, remainder going to the
    /// lowest indices, so every produced item has exactly one taker.
    pub(crate) fn consumer_stop(&self, index: usize) -> StopCondition {
        let Some(per_producer) = self.items_per_producer else {
            return StopCondition::UntilCancelled;
        };
        let total = self.total_items(per_producer).unwrap_or(u64::MAX);
        let consumers = self.consumers as u64;
        let extra = u64::from((index as u64) < total % consumers);
        StopCondition::Count(total / consumers + extra)
    }

    fn total_items(&self, per_producer: u64) -> Option<u64> {
        u64::try_from(self.producers)
            .ok()
            .and_then(|producers| per_producer.checked_mul(producers))
    }
}
