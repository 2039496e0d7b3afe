//! Shutdown with and without draining, and the termination lifecycle.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use cadence_scheduler::{
    ManualClock, Scheduler, SchedulerConfig, SchedulerError, SchedulerState, TaskError,
    TaskState,
};

const TIMEOUT: Duration = Duration::from_secs(5);

fn manual(workers: usize) -> (Arc<ManualClock>, Scheduler) {
    let clock = Arc::new(ManualClock::new());
    let scheduler = Scheduler::with_clock(
        SchedulerConfig {
            worker_threads: workers,
            ..Default::default()
        },
        clock.clone(),
    )
    .unwrap();
    (clock, scheduler)
}

#[test]
fn immediate_shutdown_abandons_pending_tasks() {
    let (_clock, scheduler) = manual(2);
    let ran = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (1..=3)
        .map(|secs| {
            let ran = Arc::clone(&ran);
            scheduler
                .schedule(
                    move || {
                        ran.fetch_add(1, Ordering::SeqCst);
                        Ok(secs)
                    },
                    Duration::from_secs(secs),
                )
                .unwrap()
        })
        .collect();
    let periodic = scheduler
        .schedule_at_fixed_rate(|| Ok(()), Duration::from_secs(1), Duration::from_secs(1))
        .unwrap();

    let waiter = {
        let handle = handles[0].clone();
        thread::spawn(move || handle.get())
    };

    let mut abandoned = scheduler.shutdown(false).unwrap();
    abandoned.sort_by_key(|id| id.as_uuid());
    let mut expected: Vec<_> = handles.iter().map(|h| h.id()).collect();
    expected.push(periodic.id());
    expected.sort_by_key(|id| id.as_uuid());
    assert_eq!(abandoned, expected);

    assert!(matches!(waiter.join().unwrap(), Err(TaskError::Cancelled)));
    for handle in &handles {
        assert!(handle.is_cancelled());
        assert!(matches!(handle.get(), Err(TaskError::Cancelled)));
    }
    assert!(periodic.is_cancelled());

    assert!(scheduler.await_termination(TIMEOUT));
    assert_eq!(scheduler.state(), SchedulerState::Stopped);
    assert_eq!(ran.load(Ordering::SeqCst), 0);
    assert_eq!(scheduler.metrics().tasks_abandoned, 4);
}

#[test]
fn scheduling_after_shutdown_is_closed() {
    let (_clock, scheduler) = manual(1);
    scheduler.shutdown(true).unwrap();
    assert!(scheduler.is_shutdown());

    assert!(matches!(
        scheduler.schedule(|| Ok(()), Duration::ZERO),
        Err(SchedulerError::Closed)
    ));
    assert!(matches!(
        scheduler.try_schedule(|| Ok(()), Duration::ZERO),
        Err(SchedulerError::Closed)
    ));
    assert!(matches!(scheduler.submit(|| Ok(())), Err(SchedulerError::Closed)));
    assert!(matches!(
        scheduler.schedule_with_fixed_delay(|| Ok(()), Duration::ZERO, Duration::from_secs(1)),
        Err(SchedulerError::Closed)
    ));
}

#[test]
fn draining_shutdown_runs_one_shots_and_stops_periodic_tasks() {
    let (clock, scheduler) = manual(2);

    let one_shots: Vec<_> = (1..=3)
        .map(|secs| {
            scheduler
                .schedule(move || Ok(secs * 10), Duration::from_secs(secs))
                .unwrap()
        })
        .collect();
    let periodic = scheduler
        .schedule_with_fixed_delay(|| Ok(()), Duration::from_secs(1), Duration::from_secs(1))
        .unwrap();

    let cancelled = scheduler.shutdown(true).unwrap();
    assert_eq!(cancelled, vec![periodic.id()]);
    assert_eq!(scheduler.state(), SchedulerState::ShuttingDown);
    assert!(!scheduler.is_terminated());
    assert!(!scheduler.await_termination(Duration::from_millis(20)));

    clock.advance(Duration::from_secs(3));
    let results: Vec<u64> = one_shots.iter().map(|h| h.get().unwrap()).collect();
    assert_eq!(results, vec![10, 20, 30]);

    assert!(scheduler.await_termination(TIMEOUT));
    assert!(scheduler.is_terminated());
    assert_eq!(periodic.state(), TaskState::Cancelled);
    assert_eq!(periodic.run_count(), 0);
}

#[test]
fn draining_shutdown_stops_an_in_flight_periodic_task() {
    let (clock, scheduler) = manual(1);
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    let periodic = scheduler
        .schedule_at_fixed_rate(
            move || {
                let _ = entered_tx.send(());
                let _ = release_rx.recv();
                Ok(())
            },
            Duration::ZERO,
            Duration::from_millis(10),
        )
        .unwrap();
    entered_rx.recv_timeout(TIMEOUT).unwrap();

    // Not in the queue while running, so nothing to cancel yet.
    assert!(scheduler.shutdown(true).unwrap().is_empty());
    release_tx.send(()).unwrap();
    clock.advance(Duration::from_secs(1));

    assert!(scheduler.await_termination(TIMEOUT));
    assert_eq!(periodic.run_count(), 1);
    assert_eq!(periodic.state(), TaskState::Cancelled);
}

#[test]
fn in_flight_run_finishes_under_immediate_shutdown() {
    let (_clock, scheduler) = manual(1);
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    let handle = scheduler
        .submit(move || {
            let _ = entered_tx.send(());
            let _ = release_rx.recv();
            Ok("finished")
        })
        .unwrap();
    entered_rx.recv_timeout(TIMEOUT).unwrap();

    assert!(scheduler.shutdown(false).unwrap().is_empty());
    assert!(!scheduler.await_termination(Duration::from_millis(20)));

    release_tx.send(()).unwrap();
    assert_eq!(handle.get().unwrap(), "finished");
    assert!(scheduler.await_termination(TIMEOUT));
}

#[test]
fn drop_shuts_down_without_hanging() {
    let (done_tx, done_rx) = mpsc::channel();
    let ticks = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&ticks);
    thread::spawn(move || {
        let scheduler = Scheduler::new(SchedulerConfig {
            worker_threads: 2,
            ..Default::default()
        })
        .unwrap();
        scheduler
            .schedule_at_fixed_rate(
                move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                },
                Duration::ZERO,
                Duration::from_millis(5),
            )
            .unwrap();
        scheduler
            .schedule(|| Ok(()), Duration::from_secs(3600))
            .unwrap();

        let started = Instant::now();
        while ticks_seen(&scheduler) < 3 && started.elapsed() < TIMEOUT {
            thread::sleep(Duration::from_millis(5));
        }
        drop(scheduler);
        let _ = done_tx.send(());
    });

    done_rx.recv_timeout(TIMEOUT).expect("scheduler drop hung");
    let after_drop = ticks.load(Ordering::SeqCst);
    assert!(after_drop >= 3);
    thread::sleep(Duration::from_millis(30));
    assert_eq!(ticks.load(Ordering::SeqCst), after_drop);
}

fn ticks_seen(scheduler: &Scheduler) -> u64 {
    scheduler.metrics().tasks_completed
}
