//! Bounded-queue backpressure: producers block while the queue is full and
//! exactly one is released per dispatcher dequeue.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use cadence_scheduler::{BoxError, ManualClock, Scheduler, SchedulerConfig, SchedulerError};

const TIMEOUT: Duration = Duration::from_secs(5);
const SETTLE: Duration = Duration::from_millis(50);

fn bounded(capacity: usize) -> (Arc<ManualClock>, Scheduler) {
    let clock = Arc::new(ManualClock::new());
    let scheduler = Scheduler::with_clock(
        SchedulerConfig {
            worker_threads: 1,
            queue_capacity: capacity,
            ..Default::default()
        },
        clock.clone(),
    )
    .unwrap();
    (clock, scheduler)
}

fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    cond()
}

#[test]
fn one_producer_released_per_dequeue() {
    let (clock, scheduler) = bounded(2);
    let ran = Arc::new(AtomicUsize::new(0));
    let admitted = Arc::new(AtomicUsize::new(0));

    let job = |ran: &Arc<AtomicUsize>| {
        let ran = Arc::clone(ran);
        move || -> Result<(), BoxError> {
            ran.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    };

    scheduler.schedule(job(&ran), Duration::from_secs(10)).unwrap();
    scheduler.schedule(job(&ran), Duration::from_secs(10)).unwrap();
    assert_eq!(scheduler.pending_count(), 2);

    thread::scope(|s| {
        let producers: Vec<_> = (0..3)
            .map(|_| {
                let scheduler = &scheduler;
                let admitted = Arc::clone(&admitted);
                let body = job(&ran);
                s.spawn(move || {
                    let result = scheduler.schedule(body, Duration::from_secs(20));
                    if result.is_ok() {
                        admitted.fetch_add(1, Ordering::SeqCst);
                    }
                    result.map(|_| ())
                })
            })
            .collect();

        thread::sleep(SETTLE);
        assert_eq!(admitted.load(Ordering::SeqCst), 0, "queue is full, all producers block");

        // Two records come due: two dequeues, two producers admitted.
        clock.advance(Duration::from_secs(10));
        assert!(wait_until(|| admitted.load(Ordering::SeqCst) == 2));
        thread::sleep(SETTLE);
        assert_eq!(admitted.load(Ordering::SeqCst), 2);
        assert_eq!(ran.load(Ordering::SeqCst), 2);
        assert_eq!(scheduler.pending_count(), 2);

        // A draining shutdown keeps the last producer parked until a slot frees.
        assert!(scheduler.shutdown(true).unwrap().is_empty());
        thread::sleep(SETTLE);
        assert_eq!(admitted.load(Ordering::SeqCst), 2);

        clock.advance(Duration::from_secs(10));
        for producer in producers {
            producer.join().unwrap().unwrap();
        }
    });

    assert!(scheduler.await_termination(TIMEOUT));
    assert_eq!(admitted.load(Ordering::SeqCst), 3);
    assert_eq!(ran.load(Ordering::SeqCst), 5);
    assert_eq!(scheduler.pending_count(), 0);
}

#[test]
fn immediate_shutdown_fails_blocked_producers() {
    let (_clock, scheduler) = bounded(1);
    scheduler.schedule(|| Ok(()), Duration::from_secs(10)).unwrap();

    thread::scope(|s| {
        let producer = s.spawn(|| scheduler.schedule(|| Ok(()), Duration::ZERO).map(|_| ()));
        thread::sleep(SETTLE);
        assert!(!producer.is_finished());

        let abandoned = scheduler.shutdown(false).unwrap();
        assert_eq!(abandoned.len(), 1);
        assert!(matches!(producer.join().unwrap(), Err(SchedulerError::Closed)));
    });

    assert!(scheduler.await_termination(TIMEOUT));
}

#[test]
fn try_schedule_never_blocks() {
    let (clock, scheduler) = bounded(1);
    scheduler.try_schedule(|| Ok(()), Duration::from_secs(1)).unwrap();

    let started = Instant::now();
    let err = scheduler
        .try_schedule(|| Ok(()), Duration::from_secs(1))
        .unwrap_err();
    assert!(matches!(err, SchedulerError::Rejected(1)));
    assert!(started.elapsed() < Duration::from_secs(1));

    // Once the record is dispatched the slot is free again.
    clock.advance(Duration::from_secs(1));
    assert!(wait_until(|| scheduler.pending_count() == 0));
    scheduler.try_schedule(|| Ok(()), Duration::from_secs(1)).unwrap();
}

#[test]
fn periodic_rearm_is_not_blocked_by_capacity() {
    let (clock, scheduler) = bounded(1);
    let handle = scheduler
        .schedule_at_fixed_rate(|| Ok(()), Duration::ZERO, Duration::from_millis(100))
        .unwrap();
    assert!(wait_until(|| handle.run_count() == 1 && scheduler.pending_count() == 1));

    // The re-armed record occupies the only slot; new work is rejected,
    // yet the periodic task keeps running.
    assert!(matches!(
        scheduler.try_schedule(|| Ok(()), Duration::ZERO),
        Err(SchedulerError::Rejected(1))
    ));
    clock.advance(Duration::from_millis(100));
    assert!(wait_until(|| handle.run_count() == 2));
    handle.cancel();
}
