use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::lifecycle::SchedulerState;
use crate::task::TaskMode;

/// Scheduler operational metrics.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerMetrics {
    /// Tasks accepted by `schedule*` / `submit`.
    pub tasks_scheduled: u64,
    /// Records handed from the queue to a worker.
    pub tasks_dispatched: u64,
    /// Runs that returned successfully.
    pub tasks_completed: u64,
    /// Runs that returned an error or panicked.
    pub tasks_failed: u64,
    /// Records popped after being cancelled; never started.
    pub tasks_discarded: u64,
    /// Pending records dropped by an immediate shutdown.
    pub tasks_abandoned: u64,
    /// Total runs by scheduling mode.
    pub executions_by_mode: HashMap<TaskMode, u64>,
    /// Average run duration by scheduling mode.
    pub avg_run_duration: HashMap<TaskMode, Duration>,
    /// Last run completion time by scheduling mode.
    pub last_run: HashMap<TaskMode, DateTime<Utc>>,
    /// Size of the worker pool.
    pub worker_threads: usize,
    /// Workers currently executing a body.
    pub active_workers: usize,
    /// Worker utilization ratio (0.0 - 1.0).
    pub worker_utilization: f64,
    /// Records currently waiting in the queue.
    pub queue_depth: usize,
    /// Queue bound, if any.
    pub queue_capacity: Option<usize>,
    /// Scheduler lifecycle state at snapshot time.
    pub state: SchedulerState,
}

impl Default for SchedulerMetrics {
    fn default() -> Self {
        Self {
            tasks_scheduled: 0,
            tasks_dispatched: 0,
            tasks_completed: 0,
            tasks_failed: 0,
            tasks_discarded: 0,
            tasks_abandoned: 0,
            executions_by_mode: HashMap::new(),
            avg_run_duration: HashMap::new(),
            last_run: HashMap::new(),
            worker_threads: 0,
            active_workers: 0,
            worker_utilization: 0.0,
            queue_depth: 0,
            queue_capacity: None,
            state: SchedulerState::Running,
        }
    }
}

impl SchedulerMetrics {
    /// Record a finished run.
    pub fn record_execution(&mut self, mode: TaskMode, duration: Duration, success: bool) {
        if success {
            self.tasks_completed += 1;
        } else {
            self.tasks_failed += 1;
        }
        *self.executions_by_mode.entry(mode).or_default() += 1;
        self.last_run.insert(mode, Utc::now());

        let count = self.executions_by_mode[&mode];
        let prev_avg = self
            .avg_run_duration
            .get(&mode)
            .copied()
            .unwrap_or_default();

        // Incremental mean: new_avg = prev_avg + (duration - prev_avg) / count
        let new_avg = if count == 1 {
            duration
        } else {
            let prev_nanos = prev_avg.as_nanos() as f64;
            let cur_nanos = duration.as_nanos() as f64;
            let avg_nanos = prev_nanos + (cur_nanos - prev_nanos) / count as f64;
            Duration::from_nanos(avg_nanos as u64)
        };

        self.avg_run_duration.insert(mode, new_avg);
    }

    /// Total runs across all modes.
    pub fn total_executions(&self) -> u64 {
        self.executions_by_mode.values().sum()
    }
}
