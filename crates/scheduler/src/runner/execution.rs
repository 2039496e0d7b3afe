use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::config::FailurePolicy;
use crate::error::TaskError;
use crate::metrics::SchedulerMetrics;
use crate::queue::TimedQueue;
use crate::task::record::TaskRecord;
use crate::task::{TaskId, TaskMode, TaskState};

/// A failed run, as reported to the failure callback.
#[derive(Debug, Clone)]
pub struct TaskFailure {
    pub task_id: TaskId,
    pub mode: TaskMode,
    /// 1-based index of the run that failed.
    pub run: u64,
    pub error: TaskError,
}

/// Out-of-band observer for failed runs. Invoked on the worker thread.
pub type FailureCallback = Arc<dyn Fn(&TaskFailure) + Send + Sync + 'static>;

/// Everything a worker needs to run a record and put it back.
pub(super) struct RunContext {
    pub(super) queue: Arc<TimedQueue>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) metrics: Arc<RwLock<SchedulerMetrics>>,
    pub(super) failure_policy: FailurePolicy,
    pub(super) on_failure: RwLock<Option<FailureCallback>>,
}

impl RunContext {
    /// Run one dispatched record to completion, then settle its next state.
    pub(super) fn execute(&self, record: Arc<TaskRecord>) {
        let scheduled_at = record.next_run_at();
        let started_at = self.clock.now();
        let outcome = record.run_body();
        let completed_at = self.clock.now();

        self.metrics.write().record_execution(
            record.mode(),
            completed_at.saturating_duration_since(started_at),
            outcome.is_ok(),
        );

        if let Err(err) = &outcome {
            warn!("Task {} ({}) failed: {}", record.id(), record.mode(), err);
            self.report_failure(&record, err);
        }

        match record.schedule().next_run(scheduled_at, completed_at) {
            Err(err) => {
                error!("Periodic task {} cannot be re-armed: {}", record.id(), err);
                record.note_failure(&err);
                self.report_failure(&record, &err);
                record.finish(TaskState::Failed);
            }
            Ok(None) => {
                let to = if outcome.is_ok() {
                    TaskState::Completed
                } else {
                    TaskState::Failed
                };
                if !record.finish(to) {
                    debug!("Task {} was cancelled while running", record.id());
                }
            }
            Ok(Some(_)) if outcome.is_err() && self.failure_policy == FailurePolicy::Cancel => {
                record.finish(TaskState::Failed);
                info!(
                    "Periodic task {} stopped after failed run {}",
                    record.id(),
                    record.run_count()
                );
            }
            Ok(Some(next)) => {
                if !record.rearm(next) {
                    debug!("Periodic task {} cancelled during run", record.id());
                    return;
                }
                if !self.queue.requeue(Arc::clone(&record)) {
                    // Cancelled between re-arm and re-insert, or shutting down.
                    record.cancel();
                }
            }
        }
    }

    fn report_failure(&self, record: &TaskRecord, err: &TaskError) {
        let Some(callback) = self.on_failure.read().clone() else {
            return;
        };
        let failure = TaskFailure {
            task_id: record.id(),
            mode: record.mode(),
            run: record.run_count(),
            error: err.clone(),
        };
        if panic::catch_unwind(AssertUnwindSafe(|| callback(&failure))).is_err() {
            error!("Failure callback panicked for task {}", record.id());
        }
    }
}
