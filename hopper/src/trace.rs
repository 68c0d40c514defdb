//! Logging for queue operations and harness roles.
//!
//! Built on `tracing` behind the `tracing` cargo feature. Without the
//! feature every log macro expands to nothing, so the blocking paths carry
//! no formatting cost.

/// Default filter used when `RUST_LOG` is unset.
#[cfg(feature = "tracing")]
const DEFAULT_FILTER: &str = "hopper=debug";

/// Installs a global `tracing` subscriber.
///
/// Output carries thread names (roles are named `hopper-producer-N` and
/// `hopper-consumer-N`) and uptime timestamps. The filter comes from
/// `RUST_LOG`, falling back to `hopper=debug`.
///
/// Returns `false` if a global subscriber was already installed, which lets
/// tests call this from several places. Always `false` when the `tracing`
/// feature is disabled.
#[cfg(feature = "tracing")]
pub fn init_tracing() -> bool {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_thread_names(true)
                .with_thread_ids(true)
                .with_timer(fmt::time::uptime()),
        )
        .with(filter)
        .try_init()
        .is_ok()
}

#[cfg(not(feature = "tracing"))]
pub const fn init_tracing() -> bool {
    false
}

#[cfg(feature = "tracing")]
pub(crate) use tracing::{debug, error, info, trace, warn};

// Swallows the arguments without evaluating them.
#[cfg(not(feature = "tracing"))]
macro_rules! disabled {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
pub(crate) use disabled as debug;
#[cfg(not(feature = "tracing"))]
pub(crate) use disabled as error;
#[cfg(not(feature = "tracing"))]
pub(crate) use disabled as info;
#[cfg(not(feature = "tracing"))]
pub(crate) use disabled as trace;
#[cfg(not(feature = "tracing"))]
pub(crate) use disabled as warn;
