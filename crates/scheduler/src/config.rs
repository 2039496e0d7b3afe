use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SchedulerError;

/// What happens to a periodic task when one of its runs fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Log, count the failure and keep the schedule going.
    #[default]
    Continue,
    /// Stop re-arming; the task ends in `Failed`.
    Cancel,
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::Continue => write!(f, "continue"),
            FailurePolicy::Cancel => write!(f, "cancel"),
        }
    }
}

impl FromStr for FailurePolicy {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "continue" => Ok(FailurePolicy::Continue),
            "cancel" => Ok(FailurePolicy::Cancel),
            other => Err(SchedulerError::Config(format!(
                "unknown failure policy '{other}' (expected 'continue' or 'cancel')"
            ))),
        }
    }
}

/// Scheduler configuration, typically parsed from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Number of worker threads. 0 = available parallelism.
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
    /// Maximum number of pending tasks. 0 = unbounded.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Reaction to a failed run of a periodic task.
    #[serde(default)]
    pub periodic_failure_policy: FailurePolicy,
    /// Prefix for dispatcher and worker thread names.
    #[serde(default = "default_thread_name_prefix")]
    pub thread_name_prefix: String,
}

fn default_worker_threads() -> usize { 0 }
fn default_queue_capacity() -> usize { 0 }
fn default_thread_name_prefix() -> String { "cadence".into() }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_threads: default_worker_threads(),
            queue_capacity: default_queue_capacity(),
            periodic_failure_policy: FailurePolicy::default(),
            thread_name_prefix: default_thread_name_prefix(),
        }
    }
}

impl SchedulerConfig {
    /// Parse config from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, SchedulerError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SchedulerError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Resolve worker thread count (0 means use available parallelism).
    pub fn resolved_worker_threads(&self) -> usize {
        if self.worker_threads == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            self.worker_threads
        }
    }

    /// Queue bound, or `None` when unbounded.
    pub fn bounded_capacity(&self) -> Option<usize> {
        (self.queue_capacity > 0).then_some(self.queue_capacity)
    }

    // ── Environment variable overrides ──────────────────────────────

    /// Apply environment variable overrides.
    ///
    /// - `CADENCE_WORKER_THREADS` -> `worker_threads`
    /// - `CADENCE_QUEUE_CAPACITY` -> `queue_capacity`
    /// - `CADENCE_FAILURE_POLICY` -> `periodic_failure_policy`
    /// - `CADENCE_THREAD_NAME_PREFIX` -> `thread_name_prefix`
    pub fn apply_env_overrides(&mut self) -> Result<(), SchedulerError> {
        if let Ok(v) = std::env::var("CADENCE_WORKER_THREADS") {
            self.worker_threads = parse_env("CADENCE_WORKER_THREADS", &v)?;
        }
        if let Ok(v) = std::env::var("CADENCE_QUEUE_CAPACITY") {
            self.queue_capacity = parse_env("CADENCE_QUEUE_CAPACITY", &v)?;
        }
        if let Ok(v) = std::env::var("CADENCE_FAILURE_POLICY") {
            self.periodic_failure_policy = v.parse()?;
        }
        if let Ok(v) = std::env::var("CADENCE_THREAD_NAME_PREFIX") {
            self.thread_name_prefix = v;
        }
        Ok(())
    }

    /// Reject configurations the scheduler cannot run with.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.thread_name_prefix.trim().is_empty() {
            return Err(SchedulerError::Config(
                "thread_name_prefix must not be empty".into(),
            ));
        }
        if self.worker_threads > 1024 {
            return Err(SchedulerError::Config(format!(
                "worker_threads = {} exceeds the limit of 1024",
                self.worker_threads
            )));
        }
        Ok(())
    }
}

fn parse_env(name: &str, value: &str) -> Result<usize, SchedulerError> {
    value
        .trim()
        .parse()
        .map_err(|_| SchedulerError::Config(format!("{name}: expected a number, got '{value}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.worker_threads, 0);
        assert_eq!(config.queue_capacity, 0);
        assert_eq!(config.periodic_failure_policy, FailurePolicy::Continue);
        assert_eq!(config.thread_name_prefix, "cadence");
        assert!(config.bounded_capacity().is_none());
        assert!(config.resolved_worker_threads() >= 1);
    }

    #[test]
    fn parse_toml() {
        let config = SchedulerConfig::from_toml(
            r#"
            worker_threads = 3
            queue_capacity = 64
            periodic_failure_policy = "cancel"
            "#,
        )
        .unwrap();
        assert_eq!(config.resolved_worker_threads(), 3);
        assert_eq!(config.bounded_capacity(), Some(64));
        assert_eq!(config.periodic_failure_policy, FailurePolicy::Cancel);
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let config = SchedulerConfig::from_toml("").unwrap();
        assert_eq!(config.queue_capacity, 0);
        assert_eq!(config.periodic_failure_policy, FailurePolicy::Continue);
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = SchedulerConfig::from_toml("worker_threads = \"many\"").unwrap_err();
        assert!(matches!(err, SchedulerError::ConfigParse(_)));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "worker_threads = 2\nqueue_capacity = 8").unwrap();

        let config = SchedulerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.worker_threads, 2);
        assert_eq!(config.queue_capacity, 8);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = SchedulerConfig::from_file(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, SchedulerError::ConfigIo(_)));
    }

    #[test]
    fn env_overrides_thread_prefix() {
        std::env::set_var("CADENCE_THREAD_NAME_PREFIX", "jobs");
        let mut config = SchedulerConfig::default();
        config.apply_env_overrides().unwrap();
        std::env::remove_var("CADENCE_THREAD_NAME_PREFIX");
        assert_eq!(config.thread_name_prefix, "jobs");
    }

    #[test]
    fn validate_rejects_empty_prefix() {
        let config = SchedulerConfig {
            thread_name_prefix: "  ".into(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(SchedulerError::Config(_))));
    }

    #[test]
    fn failure_policy_from_str() {
        assert_eq!("Cancel".parse::<FailurePolicy>().unwrap(), FailurePolicy::Cancel);
        assert_eq!(" continue ".parse::<FailurePolicy>().unwrap(), FailurePolicy::Continue);
        assert!("retry".parse::<FailurePolicy>().is_err());
    }
}
