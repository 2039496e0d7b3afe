use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Mutex, RwLock};
use tracing::info;

use crate::clock::{Clock, MonotonicClock};
use crate::config::SchedulerConfig;
use crate::error::SchedulerError;
use crate::lifecycle::{Lifecycle, SchedulerState};
use crate::metrics::SchedulerMetrics;
use crate::queue::TimedQueue;

use super::dispatch::Dispatcher;
use super::execution::{FailureCallback, RunContext, TaskFailure};
use super::pool::{InFlight, WorkerPool};

/// Time-ordered task scheduler backed by a fixed pool of worker threads.
///
/// A dedicated dispatcher thread waits on the pending queue until the
/// earliest task is due and hands it to a worker. Dropping the scheduler
/// shuts it down immediately and joins the dispatcher.
pub struct Scheduler {
    pub(super) config: SchedulerConfig,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) queue: Arc<TimedQueue>,
    pub(super) ctx: Arc<RunContext>,
    pub(super) in_flight: Arc<InFlight>,
    pub(super) lifecycle: Arc<Lifecycle>,
    /// Set once an immediate shutdown has been requested.
    pub(super) abandoned: AtomicBool,
    pub(super) dispatcher: Mutex<Option<JoinHandle<()>>>,
    pub(super) worker_threads: usize,
}

impl Scheduler {
    /// Create a scheduler on the system monotonic clock and start it.
    pub fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        Self::with_clock(config, Arc::new(MonotonicClock))
    }

    /// Create a scheduler on an explicit time source and start it.
    pub fn with_clock(config: SchedulerConfig, clock: Arc<dyn Clock>) -> Result<Self, SchedulerError> {
        config.validate()?;
        let worker_threads = config.resolved_worker_threads();

        let queue = TimedQueue::new(config.queue_capacity, Arc::clone(&clock));
        let ctx = Arc::new(RunContext {
            queue: Arc::clone(&queue),
            clock: Arc::clone(&clock),
            metrics: Arc::new(RwLock::new(SchedulerMetrics::default())),
            failure_policy: config.periodic_failure_policy,
            on_failure: RwLock::new(None),
        });
        let in_flight = Arc::new(InFlight::default());
        let lifecycle = Arc::new(Lifecycle::new());

        let pool = WorkerPool::new(worker_threads, &config.thread_name_prefix, Arc::clone(&in_flight))?;
        let dispatcher = Dispatcher {
            queue: Arc::clone(&queue),
            pool,
            ctx: Arc::clone(&ctx),
            lifecycle: Arc::clone(&lifecycle),
        }
        .spawn(format!("{}-dispatcher", config.thread_name_prefix))?;

        info!(
            "Scheduler starting with {} workers, queue capacity {}",
            worker_threads,
            config
                .bounded_capacity()
                .map_or_else(|| "unbounded".to_string(), |c| c.to_string())
        );

        Ok(Self {
            config,
            clock,
            queue,
            ctx,
            in_flight,
            lifecycle,
            abandoned: AtomicBool::new(false),
            dispatcher: Mutex::new(Some(dispatcher)),
            worker_threads,
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// The time source all delays are measured against.
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    pub fn state(&self) -> SchedulerState {
        self.lifecycle.state()
    }

    /// Number of tasks waiting in the queue (not counting in-flight runs).
    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    /// Register an observer for failed runs, replacing any previous one.
    ///
    /// The callback runs on the worker thread right after the failed run;
    /// a panic inside it is logged and swallowed.
    pub fn on_task_failure<F>(&self, callback: F)
    where
        F: Fn(&TaskFailure) + Send + Sync + 'static,
    {
        let callback: FailureCallback = Arc::new(callback);
        *self.ctx.on_failure.write() = Some(callback);
    }

    /// Get a snapshot of the current scheduler metrics.
    pub fn metrics(&self) -> SchedulerMetrics {
        let mut snapshot = self.ctx.metrics.read().clone();
        let active = self.in_flight.active();
        snapshot.worker_threads = self.worker_threads;
        snapshot.active_workers = active;
        snapshot.worker_utilization = active as f64 / self.worker_threads as f64;
        snapshot.queue_depth = self.queue.len();
        snapshot.queue_capacity = self.queue.capacity();
        snapshot.state = self.lifecycle.state();
        snapshot
    }
}
