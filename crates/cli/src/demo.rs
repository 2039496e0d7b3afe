use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{info, warn};

use cadence_scheduler::{BoxError, Scheduler, SchedulerError, TaskFailure};

/// Knobs for one demo run.
#[derive(Debug, Clone)]
pub struct DemoPlan {
    pub run_for: Duration,
    pub period: Duration,
    pub burst: usize,
    pub drain: bool,
}

/// What the demo observed, for the final report.
#[derive(Debug, Default)]
pub struct DemoReport {
    pub heartbeats: u64,
    pub polls: u64,
    pub failures: u64,
    pub burst_admitted: usize,
    pub burst_rejected: usize,
    pub abandoned: usize,
}

pub fn run(scheduler: &Scheduler, plan: &DemoPlan) -> Result<DemoReport> {
    let mut report = DemoReport::default();

    let failures = Arc::new(AtomicU64::new(0));
    {
        let failures = Arc::clone(&failures);
        scheduler.on_task_failure(move |failure: &TaskFailure| {
            failures.fetch_add(1, Ordering::Relaxed);
            warn!(
                "Run {} of {} task {} failed: {}",
                failure.run, failure.mode, failure.task_id, failure.error
            );
        });
    }

    // ── One-shot ──────────────────────────────────────────────────
    let started = Instant::now();
    let answer = scheduler
        .schedule(move || Ok(started.elapsed()), Duration::from_millis(200))
        .context("failed to schedule one-shot task")?;
    let waited = answer.get().context("one-shot task failed")?;
    info!("One-shot task ran after {:?}", waited);

    // ── Periodic ──────────────────────────────────────────────────
    let heartbeats = Arc::new(AtomicU64::new(0));
    let heartbeat = {
        let heartbeats = Arc::clone(&heartbeats);
        scheduler.schedule_at_fixed_rate(
            move || {
                let n = heartbeats.fetch_add(1, Ordering::Relaxed) + 1;
                info!("Heartbeat {}", n);
                Ok(())
            },
            Duration::ZERO,
            plan.period,
        )?
    };

    let polls = Arc::new(AtomicU64::new(0));
    let poller = {
        let polls = Arc::clone(&polls);
        scheduler.schedule_with_fixed_delay(
            move || -> Result<(), BoxError> {
                let n = polls.fetch_add(1, Ordering::Relaxed) + 1;
                thread::sleep(Duration::from_millis(30));
                if n % 3 == 0 {
                    return Err(format!("poll {n} timed out").into());
                }
                Ok(())
            },
            plan.period / 2,
            plan.period,
        )?
    };

    // ── Burst against the queue ───────────────────────────────────
    for i in 0..plan.burst {
        let job = move || -> Result<usize, BoxError> {
            thread::sleep(Duration::from_millis(5));
            Ok(i)
        };
        match scheduler.try_schedule(job, Duration::from_millis(50)) {
            Ok(_) => report.burst_admitted += 1,
            Err(SchedulerError::Rejected(capacity)) => {
                report.burst_rejected += 1;
                if report.burst_rejected == 1 {
                    info!("Queue full at {} pending tasks; rejecting burst jobs", capacity);
                }
            }
            Err(e) => return Err(e).context("burst submission failed"),
        }
    }
    info!(
        "Burst: {} admitted, {} rejected",
        report.burst_admitted, report.burst_rejected
    );

    thread::sleep(plan.run_for);
    heartbeat.cancel();
    info!(
        "Heartbeat cancelled after {} runs; poller next due in {:?}",
        heartbeat.run_count(),
        poller.delay()
    );

    let abandoned = scheduler.shutdown(plan.drain)?;
    if !scheduler.await_termination(Duration::from_secs(10)) {
        warn!("Scheduler did not terminate within 10s");
    }

    report.heartbeats = heartbeats.load(Ordering::Relaxed);
    report.polls = polls.load(Ordering::Relaxed);
    report.failures = failures.load(Ordering::Relaxed);
    report.abandoned = abandoned.len();
    Ok(report)
}
