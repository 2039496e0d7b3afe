use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Error type task bodies return. Anything convertible with `?` or `.into()` works.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced synchronously by the scheduling API.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("scheduler is shut down")]
    Closed,

    #[error("task rejected: queue is at capacity ({0})")]
    Rejected(usize),

    #[error("thread pool error: {0}")]
    ThreadPool(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("config I/O error: {0}")]
    ConfigIo(#[from] std::io::Error),
}

/// Outcome errors observed through a [`TaskHandle`](crate::TaskHandle).
///
/// Execution errors stay local to the task that produced them; they never
/// reach the dispatcher or take down a worker thread.
#[derive(Debug, Clone, Error)]
pub enum TaskError {
    #[error("task failed: {0}")]
    Failed(Arc<dyn std::error::Error + Send + Sync + 'static>),

    #[error("task panicked: {0}")]
    Panicked(String),

    #[error("task was cancelled")]
    Cancelled,

    #[error("timed out after {0:?} waiting for task")]
    Timeout(Duration),

    #[error("get() is only available on one-shot tasks")]
    NotOneShot,

    #[error("next run after a period of {0:?} is out of range")]
    OutOfRange(Duration),
}

impl TaskError {
    pub(crate) fn failed(err: BoxError) -> Self {
        TaskError::Failed(Arc::from(err))
    }

    /// Convert a caught panic payload into a `Panicked` error.
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        TaskError::Panicked(message)
    }
}
