use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::Serialize;

use crate::error::SchedulerError;

/// Scheduler-wide lifecycle. Moves forward only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum SchedulerState {
    Running = 0,
    ShuttingDown = 1,
    Stopped = 2,
}

impl SchedulerState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => SchedulerState::Running,
            1 => SchedulerState::ShuttingDown,
            _ => SchedulerState::Stopped,
        }
    }
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerState::Running => write!(f, "running"),
            SchedulerState::ShuttingDown => write!(f, "shutting_down"),
            SchedulerState::Stopped => write!(f, "stopped"),
        }
    }
}

pub(crate) struct Lifecycle {
    state: AtomicU8,
    lock: Mutex<()>,
    terminated: Condvar,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(SchedulerState::Running as u8),
            lock: Mutex::new(()),
            terminated: Condvar::new(),
        }
    }

    pub(crate) fn state(&self) -> SchedulerState {
        SchedulerState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn ensure_running(&self) -> Result<(), SchedulerError> {
        match self.state() {
            SchedulerState::Running => Ok(()),
            _ => Err(SchedulerError::Closed),
        }
    }

    /// `Running -> ShuttingDown`. Returns the state observed before the call.
    pub(crate) fn begin_shutdown(&self) -> SchedulerState {
        match self.state.compare_exchange(
            SchedulerState::Running as u8,
            SchedulerState::ShuttingDown as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(prev) | Err(prev) => SchedulerState::from_u8(prev),
        }
    }

    pub(crate) fn mark_stopped(&self) {
        let _guard = self.lock.lock();
        self.state
            .store(SchedulerState::Stopped as u8, Ordering::Release);
        self.terminated.notify_all();
    }

    /// Wait until `Stopped`. `false` if `timeout` elapsed first.
    pub(crate) fn await_stopped(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut guard = self.lock.lock();
        while self.state() != SchedulerState::Stopped {
            match deadline {
                Some(deadline) => {
                    if self.terminated.wait_until(&mut guard, deadline).timed_out() {
                        return self.state() == SchedulerState::Stopped;
                    }
                }
                None => self.terminated.wait(&mut guard),
            }
        }
        true
    }
}
