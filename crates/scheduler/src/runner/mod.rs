//! Scheduler runner -- owns the dispatcher thread and the worker pool.
//!
//! Split into focused submodules:
//! - `core`: Scheduler struct, constructors and accessors
//! - `scheduling`: the `schedule*` / `submit` entry points
//! - `dispatch`: the dispatcher loop moving due records to the pool
//! - `execution`: running one record and re-arming periodic ones
//! - `pool`: rayon-backed worker pool with in-flight tracking
//! - `shutdown`: lifecycle transitions, termination wait and `Drop`

mod core;
mod dispatch;
mod execution;
mod pool;
mod scheduling;
mod shutdown;

pub use self::core::Scheduler;
pub use self::execution::{FailureCallback, TaskFailure};
