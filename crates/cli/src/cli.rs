use clap::Parser;

/// Drive the cadence scheduler through a short demo workload.
///
/// Runs a one-shot task, a fixed-rate heartbeat, a fixed-delay poller and
/// a burst of short jobs against a bounded queue, then prints the
/// scheduler metrics and shuts down.
#[derive(Parser, Debug)]
#[command(name = "cadence", about = "Time-ordered task scheduler demo")]
pub struct CliArgs {
    /// Path to a scheduler config file (TOML)
    #[arg(long, env = "CADENCE_CONFIG")]
    pub config: Option<String>,

    /// Worker pool size (overrides the config file; 0 = available parallelism)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Queue capacity (overrides the config file; 0 = unbounded)
    #[arg(long)]
    pub capacity: Option<usize>,

    /// Periodic failure policy: continue or cancel
    #[arg(long)]
    pub failure_policy: Option<String>,

    /// How long to let periodic tasks run, in seconds
    #[arg(long, env = "CADENCE_RUN_SECS", default_value = "3")]
    pub run_secs: u64,

    /// Period of the demo heartbeat and poller, in milliseconds
    #[arg(long, default_value = "250")]
    pub period_ms: u64,

    /// Number of jobs submitted in the burst phase
    #[arg(long, default_value = "32")]
    pub burst: usize,

    /// Abandon pending work on shutdown instead of draining it
    #[arg(long)]
    pub no_drain: bool,
}
