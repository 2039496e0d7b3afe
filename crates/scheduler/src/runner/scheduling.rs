use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{BoxError, SchedulerError};
use crate::task::handle::ResultSlot;
use crate::task::record::{run_guarded, OnceBody, TaskRecord};
use crate::task::{Schedule, TaskHandle};

use super::Scheduler;

impl Scheduler {
    /// Run `body` once, no earlier than `delay` from now.
    ///
    /// Blocks while a bounded queue is full. Errors with
    /// [`SchedulerError::Closed`] once shutdown has begun.
    pub fn schedule<F, T>(&self, body: F, delay: Duration) -> Result<TaskHandle<T>, SchedulerError>
    where
        F: FnOnce() -> Result<T, BoxError> + Send + 'static,
        T: Send + 'static,
    {
        self.lifecycle.ensure_running()?;
        let (record, slot) = self.one_shot(body, delay)?;
        self.queue.insert(Arc::clone(&record))?;
        Ok(self.accepted(record, Some(slot)))
    }

    /// Like [`schedule`](Self::schedule) but fails with
    /// [`SchedulerError::Rejected`] instead of blocking on a full queue.
    pub fn try_schedule<F, T>(&self, body: F, delay: Duration) -> Result<TaskHandle<T>, SchedulerError>
    where
        F: FnOnce() -> Result<T, BoxError> + Send + 'static,
        T: Send + 'static,
    {
        self.lifecycle.ensure_running()?;
        let (record, slot) = self.one_shot(body, delay)?;
        self.queue.try_insert(Arc::clone(&record))?;
        Ok(self.accepted(record, Some(slot)))
    }

    /// Run `body` as soon as a worker is free.
    pub fn submit<F, T>(&self, body: F) -> Result<TaskHandle<T>, SchedulerError>
    where
        F: FnOnce() -> Result<T, BoxError> + Send + 'static,
        T: Send + 'static,
    {
        self.schedule(body, Duration::ZERO)
    }

    /// Run `body` every `period`, first after `initial_delay`.
    ///
    /// Starts are anchored to `initial_delay + k * period` regardless of how
    /// long each run takes. A run that overruns its period delays the next
    /// one; runs of the same task never overlap.
    pub fn schedule_at_fixed_rate<F>(
        &self,
        body: F,
        initial_delay: Duration,
        period: Duration,
    ) -> Result<TaskHandle, SchedulerError>
    where
        F: FnMut() -> Result<(), BoxError> + Send + 'static,
    {
        self.periodic(Schedule::FixedRate(period), body, initial_delay)
    }

    /// Run `body` repeatedly with `delay` between the end of one run and the
    /// start of the next, first after `initial_delay`.
    pub fn schedule_with_fixed_delay<F>(
        &self,
        body: F,
        initial_delay: Duration,
        delay: Duration,
    ) -> Result<TaskHandle, SchedulerError>
    where
        F: FnMut() -> Result<(), BoxError> + Send + 'static,
    {
        self.periodic(Schedule::FixedDelay(delay), body, initial_delay)
    }

    fn periodic<F>(&self, schedule: Schedule, body: F, initial_delay: Duration) -> Result<TaskHandle, SchedulerError>
    where
        F: FnMut() -> Result<(), BoxError> + Send + 'static,
    {
        if schedule.period().is_some_and(|p| p.is_zero()) {
            return Err(SchedulerError::InvalidArgument(format!(
                "{} period must be positive",
                schedule.mode()
            )));
        }
        self.lifecycle.ensure_running()?;

        let first_run_at = self.due_in(initial_delay)?;
        // The second run must be representable too.
        if let Err(err) = schedule.next_run(first_run_at, first_run_at) {
            return Err(SchedulerError::InvalidArgument(err.to_string()));
        }
        let record = Arc::new(TaskRecord::repeating(schedule, first_run_at, Box::new(body)));
        self.queue.insert(Arc::clone(&record))?;
        Ok(self.accepted(record, None))
    }

    fn due_in(&self, delay: Duration) -> Result<Instant, SchedulerError> {
        self.clock.now().checked_add(delay).ok_or_else(|| {
            SchedulerError::InvalidArgument(format!("delay of {delay:?} is out of range"))
        })
    }

    fn one_shot<F, T>(
        &self,
        body: F,
        delay: Duration,
    ) -> Result<(Arc<TaskRecord>, ResultSlot<T>), SchedulerError>
    where
        F: FnOnce() -> Result<T, BoxError> + Send + 'static,
        T: Send + 'static,
    {
        let first_run_at = self.due_in(delay)?;
        let slot: ResultSlot<T> = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&slot);
        let once: OnceBody = Box::new(move || {
            let outcome = run_guarded(body);
            let report = match &outcome {
                Ok(_) => Ok(()),
                Err(err) => Err(err.clone()),
            };
            // Stored before the record turns terminal, so `get` always finds it.
            *sink.lock() = Some(outcome);
            report
        });
        let record = Arc::new(TaskRecord::once(first_run_at, once));
        Ok((record, slot))
    }

    fn accepted<T>(&self, record: Arc<TaskRecord>, slot: Option<ResultSlot<T>>) -> TaskHandle<T> {
        self.ctx.metrics.write().tasks_scheduled += 1;
        debug!(
            "Scheduled task {} ({}) due in {:?}",
            record.id(),
            record.mode(),
            record.next_run_at().saturating_duration_since(self.clock.now())
        );
        TaskHandle::new(record, slot, Arc::clone(&self.queue), Arc::clone(&self.clock))
    }
}
