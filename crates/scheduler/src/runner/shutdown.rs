use std::sync::atomic::Ordering;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::error::SchedulerError;
use crate::lifecycle::SchedulerState;
use crate::task::TaskId;

use super::Scheduler;

impl Scheduler {
    /// Stop accepting work and wind the scheduler down.
    ///
    /// With `drain_pending`, queued one-shot tasks still run when due and
    /// producers already blocked on a full queue are admitted; periodic
    /// tasks are cancelled. Without it, every queued task is cancelled and
    /// blocked producers fail with [`SchedulerError::Closed`]. In-flight runs
    /// are never interrupted.
    ///
    /// Returns the ids of the tasks this call cancelled. A draining shutdown
    /// can be escalated once with `shutdown(false)`; any other repeated call
    /// fails with [`SchedulerError::Closed`].
    pub fn shutdown(&self, drain_pending: bool) -> Result<Vec<TaskId>, SchedulerError> {
        match self.lifecycle.begin_shutdown() {
            SchedulerState::Running => {}
            SchedulerState::ShuttingDown if !drain_pending => {}
            _ => return Err(SchedulerError::Closed),
        }
        if !drain_pending && self.abandoned.swap(true, Ordering::AcqRel) {
            return Err(SchedulerError::Closed);
        }

        info!(
            "Scheduler shutdown requested ({})",
            if drain_pending { "draining" } else { "immediate" }
        );

        let removed = self.queue.close(drain_pending);
        let cancelled: Vec<TaskId> = removed
            .iter()
            .filter(|record| record.cancel())
            .map(|record| record.id())
            .collect();

        if !drain_pending {
            self.ctx.metrics.write().tasks_abandoned += cancelled.len() as u64;
        }
        if !cancelled.is_empty() {
            info!("Cancelled {} pending tasks on shutdown", cancelled.len());
        }
        Ok(cancelled)
    }

    /// `true` once shutdown has begun.
    pub fn is_shutdown(&self) -> bool {
        self.lifecycle.state() != SchedulerState::Running
    }

    /// `true` once shutdown has completed and no run is in flight.
    pub fn is_terminated(&self) -> bool {
        self.lifecycle.state() == SchedulerState::Stopped
    }

    /// Block until the scheduler has stopped. `false` if `timeout` elapsed first.
    pub fn await_termination(&self, timeout: Duration) -> bool {
        self.lifecycle.await_stopped(timeout)
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if self.lifecycle.state() != SchedulerState::Stopped {
            if let Err(e) = self.shutdown(false) {
                // Already shut down immediately; the dispatcher is on its way out.
                debug!("Shutdown on drop: {}", e);
            }
        }
        if let Some(handle) = self.dispatcher.lock().take() {
            if handle.join().is_err() {
                error!("Dispatcher thread panicked");
            }
        }
    }
}
