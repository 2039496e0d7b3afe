use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::clock::Clock;
use crate::error::TaskError;
use crate::queue::TimedQueue;

use super::record::TaskRecord;
use super::{TaskId, TaskMode, TaskState};

/// Where a one-shot body leaves its result before the record turns terminal.
pub(crate) type ResultSlot<T> = Arc<Mutex<Option<Result<T, TaskError>>>>;

/// Caller-side view of a scheduled task.
///
/// Handles are cheap to clone; every clone observes the same task.
/// Dropping a handle does not cancel the task.
pub struct TaskHandle<T = ()> {
    record: Arc<TaskRecord>,
    slot: Option<ResultSlot<T>>,
    queue: Arc<TimedQueue>,
    clock: Arc<dyn Clock>,
}

impl<T> TaskHandle<T> {
    pub(crate) fn new(
        record: Arc<TaskRecord>,
        slot: Option<ResultSlot<T>>,
        queue: Arc<TimedQueue>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            record,
            slot,
            queue,
            clock,
        }
    }

    pub fn id(&self) -> TaskId {
        self.record.id()
    }

    pub fn mode(&self) -> TaskMode {
        self.record.mode()
    }

    pub fn is_periodic(&self) -> bool {
        self.record.mode().is_periodic()
    }

    pub fn state(&self) -> TaskState {
        self.record.state()
    }

    /// Request cancellation.
    ///
    /// A pending task is pulled out of the queue and will never start. A
    /// running one finishes its current run but is not re-armed. Returns
    /// `true` only if this call performed the cancellation; cancelling a
    /// finished or already cancelled task is a no-op returning `false`.
    pub fn cancel(&self) -> bool {
        let cancelled = self.record.cancel();
        if cancelled {
            self.queue.remove(self.record.id());
        }
        cancelled
    }

    pub fn is_cancelled(&self) -> bool {
        self.record.is_cancelled()
    }

    /// `true` once the task is completed, failed or cancelled.
    pub fn is_done(&self) -> bool {
        self.record.state().is_terminal()
    }

    /// Time remaining until the next scheduled run, zero if already due.
    pub fn delay(&self) -> Duration {
        self.record
            .next_run_at()
            .saturating_duration_since(self.clock.now())
    }

    /// Absolute time of the next (or, once done, the last) scheduled run.
    pub fn next_run_at(&self) -> Instant {
        self.record.next_run_at()
    }

    /// Number of times the body has been entered.
    pub fn run_count(&self) -> u64 {
        self.record.run_count()
    }

    pub fn failure_count(&self) -> u64 {
        self.record.failure_count()
    }

    /// Error from the most recent failed run, if any.
    pub fn last_error(&self) -> Option<TaskError> {
        self.record.last_error()
    }
}

impl<T: Clone> TaskHandle<T> {
    /// Block until the task finishes and return its outcome.
    ///
    /// Only meaningful for one-shot tasks; periodic handles return
    /// [`TaskError::NotOneShot`] immediately.
    pub fn get(&self) -> Result<T, TaskError> {
        let slot = self.slot.as_ref().ok_or(TaskError::NotOneShot)?;
        self.record.wait_done(None);
        Self::outcome(&self.record, slot)
    }

    /// Like [`get`](Self::get), giving up after `timeout`.
    pub fn get_timeout(&self, timeout: Duration) -> Result<T, TaskError> {
        let slot = self.slot.as_ref().ok_or(TaskError::NotOneShot)?;
        if !self.record.wait_done(Some(timeout)) {
            return Err(TaskError::Timeout(timeout));
        }
        Self::outcome(&self.record, slot)
    }

    fn outcome(record: &TaskRecord, slot: &ResultSlot<T>) -> Result<T, TaskError> {
        if record.is_cancelled() {
            return Err(TaskError::Cancelled);
        }
        slot.lock().clone().unwrap_or(Err(TaskError::Cancelled))
    }
}

impl<T> Clone for TaskHandle<T> {
    fn clone(&self) -> Self {
        Self {
            record: Arc::clone(&self.record),
            slot: self.slot.clone(),
            queue: Arc::clone(&self.queue),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.record.id())
            .field("mode", &self.record.mode())
            .field("state", &self.record.state())
            .field("runs", &self.record.run_count())
            .finish()
    }
}
