use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tracing::error;

use crate::error::SchedulerError;

/// Count of runs handed to the pool and not yet finished.
#[derive(Default)]
pub(super) struct InFlight {
    count: Mutex<usize>,
    idle: Condvar,
}

impl InFlight {
    pub(super) fn active(&self) -> usize {
        *self.count.lock()
    }

    fn enter(self: &Arc<Self>) -> InFlightGuard {
        *self.count.lock() += 1;
        InFlightGuard(Arc::clone(self))
    }

    /// Block until every in-flight run has finished.
    pub(super) fn wait_idle(&self) {
        let mut count = self.count.lock();
        while *count > 0 {
            self.idle.wait(&mut count);
        }
    }
}

struct InFlightGuard(Arc<InFlight>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut count = self.0.count.lock();
        *count -= 1;
        if *count == 0 {
            self.0.idle.notify_all();
        }
    }
}

/// Fixed-size pool of worker threads.
pub(super) struct WorkerPool {
    pool: rayon::ThreadPool,
    in_flight: Arc<InFlight>,
}

impl WorkerPool {
    pub(super) fn new(
        size: usize,
        thread_prefix: &str,
        in_flight: Arc<InFlight>,
    ) -> Result<Self, SchedulerError> {
        let prefix = thread_prefix.to_string();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(size)
            .thread_name(move |i| format!("{prefix}-worker-{i}"))
            .panic_handler(|_| error!("Worker job panicked outside of a task body"))
            .build()
            .map_err(|e| SchedulerError::ThreadPool(e.to_string()))?;
        Ok(Self { pool, in_flight })
    }

    /// Run `job` on a worker. The in-flight count covers the job until it returns.
    pub(super) fn spawn(&self, job: impl FnOnce() + Send + 'static) {
        let guard = self.in_flight.enter();
        self.pool.spawn(move || {
            let _guard = guard;
            job();
        });
    }

    pub(super) fn wait_idle(&self) {
        self.in_flight.wait_idle();
    }
}
