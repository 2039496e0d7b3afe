use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, info};

use crate::error::SchedulerError;
use crate::lifecycle::Lifecycle;
use crate::queue::TimedQueue;

use super::execution::RunContext;
use super::pool::WorkerPool;

/// The single thread that decides when a record is due and hands it to a worker.
pub(super) struct Dispatcher {
    pub(super) queue: Arc<TimedQueue>,
    pub(super) pool: WorkerPool,
    pub(super) ctx: Arc<RunContext>,
    pub(super) lifecycle: Arc<Lifecycle>,
}

impl Dispatcher {
    pub(super) fn spawn(self, name: String) -> Result<JoinHandle<()>, SchedulerError> {
        thread::Builder::new()
            .name(name)
            .spawn(move || self.run())
            .map_err(|e| SchedulerError::ThreadPool(format!("failed to spawn dispatcher: {e}")))
    }

    fn run(self) {
        debug!("Dispatcher started");

        while let Some(record) = self.queue.wait_for_due() {
            if !record.try_start() {
                debug!("Discarding cancelled task {}", record.id());
                self.ctx.metrics.write().tasks_discarded += 1;
                continue;
            }

            self.ctx.metrics.write().tasks_dispatched += 1;
            let ctx = Arc::clone(&self.ctx);
            self.pool.spawn(move || ctx.execute(record));
        }

        self.pool.wait_idle();
        self.lifecycle.mark_stopped();
        info!("Scheduler stopped");
    }
}
