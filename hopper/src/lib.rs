//! Bounded blocking queue for coordinating producer and consumer threads.
//!
//! [`BoundedQueue`] is a fixed-capacity FIFO shared by any number of
//! producers and consumers. `put` blocks while the queue is full, `take`
//! blocks while it is empty, and both have variants bounded by a
//! [`Timeout`] and interruptible through a [`CancelToken`].
//!
//! The [`harness`] module drives a queue with producer and consumer threads
//! and is what the `hopper-demo` binary runs.

pub mod cancel;
pub mod error;
pub mod harness;
pub mod sync;
pub mod timeout;
mod trace;

pub use cancel::CancelToken;
pub use error::{Cancelled, CapacityError, PutError, TakeError};
pub use sync::channel::{Consumer, Producer, channel};
pub use sync::queue::BoundedQueue;
pub use timeout::Timeout;
pub use trace::init_tracing;
