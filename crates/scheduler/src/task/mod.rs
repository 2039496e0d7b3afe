//! Task records and the handles callers hold on to.
//!
//! A [`TaskRecord`](record::TaskRecord) is owned by the scheduler's
//! internals (queue, dispatcher, workers). A [`TaskHandle`] only observes it
//! and can request cancellation; it never touches scheduling fields.

pub mod handle;
pub(crate) mod record;

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TaskError;

pub use handle::TaskHandle;

/// Opaque identity of a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TaskId(Uuid);

impl TaskId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// How a task is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskMode {
    /// Runs once after its initial delay.
    OneShot,
    /// Periodic, anchored to a fixed cadence from the first run.
    FixedRate,
    /// Periodic, anchored to a fixed gap after each run completes.
    FixedDelay,
}

impl TaskMode {
    pub fn is_periodic(self) -> bool {
        !matches!(self, TaskMode::OneShot)
    }
}

impl fmt::Display for TaskMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskMode::OneShot => write!(f, "one_shot"),
            TaskMode::FixedRate => write!(f, "fixed_rate"),
            TaskMode::FixedDelay => write!(f, "fixed_delay"),
        }
    }
}

/// Lifecycle state of a task.
///
/// `Pending -> Running -> {Completed, Failed}` for one-shot tasks,
/// `Pending -> Running -> Pending` for periodic ones. Anything that is not
/// `Completed` or `Failed` can move to `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum TaskState {
    Pending = 0,
    Running = 1,
    Completed = 2,
    Failed = 3,
    Cancelled = 4,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Cancelled
        )
    }

    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            0 => TaskState::Pending,
            1 => TaskState::Running,
            2 => TaskState::Completed,
            3 => TaskState::Failed,
            _ => TaskState::Cancelled,
        }
    }
}

/// Scheduling mode plus its period, as one tagged value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Schedule {
    OneShot,
    FixedRate(Duration),
    FixedDelay(Duration),
}

impl Schedule {
    pub(crate) fn mode(&self) -> TaskMode {
        match self {
            Schedule::OneShot => TaskMode::OneShot,
            Schedule::FixedRate(_) => TaskMode::FixedRate,
            Schedule::FixedDelay(_) => TaskMode::FixedDelay,
        }
    }

    pub(crate) fn period(&self) -> Option<Duration> {
        match self {
            Schedule::OneShot => None,
            Schedule::FixedRate(p) | Schedule::FixedDelay(p) => Some(*p),
        }
    }

    /// Next run time of a periodic task that was due at `scheduled_at` and
    /// finished at `completed_at`. `Ok(None)` for one-shot tasks.
    pub(crate) fn next_run(
        &self,
        scheduled_at: Instant,
        completed_at: Instant,
    ) -> Result<Option<Instant>, TaskError> {
        let (base, period) = match self {
            Schedule::OneShot => return Ok(None),
            Schedule::FixedRate(period) => (scheduled_at, *period),
            Schedule::FixedDelay(period) => (completed_at, *period),
        };
        base.checked_add(period)
            .map(Some)
            .ok_or(TaskError::OutOfRange(period))
    }
}
