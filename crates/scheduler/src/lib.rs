//! Time-ordered task scheduler with one-shot, fixed-rate and fixed-delay
//! tasks, a fixed worker pool, cancellation and optional backpressure.
//!
//! Callers hand a closure to [`Scheduler`] and get back a [`TaskHandle`]
//! to observe, cancel or await it. A single dispatcher thread sleeps on the
//! pending queue until the earliest task is due, then hands it to a worker.

pub mod clock;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod metrics;
mod queue;
pub mod runner;
pub mod task;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{FailurePolicy, SchedulerConfig};
pub use error::{BoxError, SchedulerError, TaskError};
pub use lifecycle::SchedulerState;
pub use metrics::SchedulerMetrics;
pub use runner::{FailureCallback, Scheduler, TaskFailure};
pub use task::{TaskHandle, TaskId, TaskMode, TaskState};
