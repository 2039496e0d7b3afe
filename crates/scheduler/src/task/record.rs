use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{BoxError, TaskError};

use super::{Schedule, TaskId, TaskMode, TaskState};

/// One-shot body. Stores its own typed outcome and reports only success/failure.
pub(crate) type OnceBody = Box<dyn FnOnce() -> Result<(), TaskError> + Send + 'static>;

/// Periodic body, invoked once per run.
pub(crate) type RepeatingBody = Box<dyn FnMut() -> Result<(), BoxError> + Send + 'static>;

pub(crate) enum Body {
    Once(Option<OnceBody>),
    Repeating(RepeatingBody),
}

/// Run `f`, turning both returned errors and panics into a [`TaskError`].
pub(crate) fn run_guarded<R>(f: impl FnOnce() -> Result<R, BoxError>) -> Result<R, TaskError> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(TaskError::failed(err)),
        Err(payload) => Err(TaskError::from_panic(payload)),
    }
}

/// Internal descriptor of one schedulable unit of work.
///
/// `state` is the single point of truth shared by the dispatcher, the
/// workers and cancelling callers; every transition is a compare-and-swap.
/// `next_run_at` is only written by whichever worker currently owns the
/// record, while it is out of the queue.
pub(crate) struct TaskRecord {
    id: TaskId,
    schedule: Schedule,
    state: AtomicU8,
    next_run_at: Mutex<Instant>,
    body: Mutex<Body>,
    runs: AtomicU64,
    failures: AtomicU64,
    last_error: Mutex<Option<TaskError>>,
    done_lock: Mutex<()>,
    done: Condvar,
}

impl TaskRecord {
    pub(crate) fn once(first_run_at: Instant, body: OnceBody) -> Self {
        Self::new(Schedule::OneShot, first_run_at, Body::Once(Some(body)))
    }

    pub(crate) fn repeating(schedule: Schedule, first_run_at: Instant, body: RepeatingBody) -> Self {
        Self::new(schedule, first_run_at, Body::Repeating(body))
    }

    fn new(schedule: Schedule, first_run_at: Instant, body: Body) -> Self {
        Self {
            id: TaskId::new(),
            schedule,
            state: AtomicU8::new(TaskState::Pending as u8),
            next_run_at: Mutex::new(first_run_at),
            body: Mutex::new(body),
            runs: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            last_error: Mutex::new(None),
            done_lock: Mutex::new(()),
            done: Condvar::new(),
        }
    }

    pub(crate) fn id(&self) -> TaskId {
        self.id
    }

    pub(crate) fn schedule(&self) -> Schedule {
        self.schedule
    }

    pub(crate) fn mode(&self) -> TaskMode {
        self.schedule.mode()
    }

    pub(crate) fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.state() == TaskState::Cancelled
    }

    pub(crate) fn next_run_at(&self) -> Instant {
        *self.next_run_at.lock()
    }

    pub(crate) fn run_count(&self) -> u64 {
        self.runs.load(Ordering::Acquire)
    }

    pub(crate) fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Acquire)
    }

    pub(crate) fn last_error(&self) -> Option<TaskError> {
        self.last_error.lock().clone()
    }

    fn transition(&self, from: TaskState, to: TaskState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// `Pending -> Running`. Fails if the record was cancelled in the meantime.
    pub(crate) fn try_start(&self) -> bool {
        self.transition(TaskState::Pending, TaskState::Running)
    }

    /// Move to `Cancelled` from any non-terminal state.
    ///
    /// Returns `true` only for the call that caused the transition.
    pub(crate) fn cancel(&self) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if TaskState::from_u8(current).is_terminal() {
                return false;
            }
            match self.state.compare_exchange(
                current,
                TaskState::Cancelled as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.notify_done();
                    return true;
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// `Running -> Completed` or `Running -> Failed`. A no-op if the run was
    /// cancelled while in flight.
    pub(crate) fn finish(&self, to: TaskState) -> bool {
        debug_assert!(matches!(to, TaskState::Completed | TaskState::Failed));
        let moved = self.transition(TaskState::Running, to);
        if moved {
            self.notify_done();
        }
        moved
    }

    /// Record the next run time, then `Running -> Pending`.
    pub(crate) fn rearm(&self, next_run_at: Instant) -> bool {
        *self.next_run_at.lock() = next_run_at;
        self.transition(TaskState::Running, TaskState::Pending)
    }

    /// Execute the body once. Called only by the worker that owns the run.
    pub(crate) fn run_body(&self) -> Result<(), TaskError> {
        self.runs.fetch_add(1, Ordering::AcqRel);
        let outcome = {
            let mut body = self.body.lock();
            match &mut *body {
                Body::Once(slot) => match slot.take() {
                    Some(f) => f(),
                    None => Ok(()),
                },
                Body::Repeating(f) => run_guarded(|| f()),
            }
        };
        if let Err(err) = &outcome {
            self.note_failure(err);
        }
        outcome
    }

    /// Count a failure against the record and keep it as the last error.
    pub(crate) fn note_failure(&self, err: &TaskError) {
        self.failures.fetch_add(1, Ordering::AcqRel);
        *self.last_error.lock() = Some(err.clone());
    }

    fn notify_done(&self) {
        let _guard = self.done_lock.lock();
        self.done.notify_all();
    }

    /// Block until the record reaches a terminal state.
    ///
    /// Returns `false` if `timeout` elapsed first.
    pub(crate) fn wait_done(&self, timeout: Option<Duration>) -> bool {
        // A deadline past the end of `Instant` means wait forever.
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let mut guard = self.done_lock.lock();
        while !self.state().is_terminal() {
            match deadline {
                Some(deadline) => {
                    if self.done.wait_until(&mut guard, deadline).timed_out() {
                        return self.state().is_terminal();
                    }
                }
                None => self.done.wait(&mut guard),
            }
        }
        true
    }
}
