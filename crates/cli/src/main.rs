mod cli;
mod config;
mod demo;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use cadence_scheduler::Scheduler;

use crate::cli::CliArgs;
use crate::demo::DemoPlan;

fn main() -> Result<()> {
    // Load .env before clap reads `env = ..` fallbacks.
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();
    let config = config::resolve(&args).context("failed to resolve configuration")?;
    info!(
        workers = config.resolved_worker_threads(),
        capacity = config.queue_capacity,
        policy = %config.periodic_failure_policy,
        "starting scheduler"
    );

    let scheduler = Scheduler::new(config).context("failed to start scheduler")?;
    let plan = DemoPlan {
        run_for: Duration::from_secs(args.run_secs),
        period: Duration::from_millis(args.period_ms.max(1)),
        burst: args.burst,
        drain: !args.no_drain,
    };

    let report = demo::run(&scheduler, &plan)?;
    info!(
        heartbeats = report.heartbeats,
        polls = report.polls,
        failures = report.failures,
        burst_admitted = report.burst_admitted,
        burst_rejected = report.burst_rejected,
        abandoned = report.abandoned,
        "demo finished"
    );

    let metrics = serde_json::to_string_pretty(&scheduler.metrics())
        .context("failed to serialize metrics")?;
    println!("{metrics}");
    Ok(())
}
