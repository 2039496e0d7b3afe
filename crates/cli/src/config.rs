use anyhow::{Context, Result};
use tracing::debug;

use cadence_scheduler::{FailurePolicy, SchedulerConfig};

use crate::cli::CliArgs;

/// Build the scheduler config.
///
/// Priority: command-line flag > environment > config file > defaults.
pub fn resolve(args: &CliArgs) -> Result<SchedulerConfig> {
    let mut config = match args.config.as_deref() {
        Some(path) => {
            debug!(path, "Loading scheduler config");
            SchedulerConfig::from_file(path)
                .with_context(|| format!("failed to load config: {path}"))?
        }
        None => {
            let mut config = SchedulerConfig::default();
            config
                .apply_env_overrides()
                .context("invalid CADENCE_* environment override")?;
            config
        }
    };

    if let Some(workers) = args.workers {
        config.worker_threads = workers;
    }
    if let Some(capacity) = args.capacity {
        config.queue_capacity = capacity;
    }
    if let Some(policy) = args.failure_policy.as_deref() {
        config.periodic_failure_policy = policy
            .parse::<FailurePolicy>()
            .context("invalid --failure-policy")?;
    }

    config.validate().context("invalid scheduler config")?;
    Ok(config)
}
