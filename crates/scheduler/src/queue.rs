//! Time-ordered queue of pending task records.
//!
//! Records are keyed by `(next_run_at, insertion sequence)`, so equal due
//! times dispatch in insertion order. A side index maps task ids to keys
//! for O(log n) removal on cancellation.
//!
//! Two condition variables hang off the one lock:
//! - `available` parks the dispatcher until the earliest record is due, and
//!   is signalled whenever an insert produces a new earliest record, so a
//!   later insert can never make the dispatcher oversleep.
//! - `not_full` parks producers while a bounded queue is at capacity; each
//!   dequeue or removal releases exactly one of them.

use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroUsize;
use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::debug;

use crate::clock::Clock;
use crate::error::SchedulerError;
use crate::task::record::TaskRecord;
use crate::task::TaskId;

type Key = (Instant, u64);

/// Whether the queue still accepts new records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Open,
    /// Shutting down gracefully: no new producers, queued one-shots still run.
    Draining,
    /// Shutting down immediately: everything is abandoned.
    Closed,
}

struct QueueInner {
    entries: BTreeMap<Key, Arc<TaskRecord>>,
    index: HashMap<TaskId, Key>,
    next_seq: u64,
    admission: Admission,
    blocked_producers: usize,
}

pub(crate) struct TimedQueue {
    inner: Mutex<QueueInner>,
    available: Condvar,
    not_full: Condvar,
    capacity: Option<NonZeroUsize>,
    clock: Arc<dyn Clock>,
}

impl TimedQueue {
    /// Create a queue. `capacity == 0` means unbounded.
    pub(crate) fn new(capacity: usize, clock: Arc<dyn Clock>) -> Arc<Self> {
        let queue = Arc::new(Self {
            inner: Mutex::new(QueueInner {
                entries: BTreeMap::new(),
                index: HashMap::new(),
                next_seq: 0,
                admission: Admission::Open,
                blocked_producers: 0,
            }),
            available: Condvar::new(),
            not_full: Condvar::new(),
            capacity: NonZeroUsize::new(capacity),
            clock,
        });

        let weak: Weak<TimedQueue> = Arc::downgrade(&queue);
        queue.clock.on_advance(Box::new(move || {
            if let Some(queue) = weak.upgrade() {
                queue.wake();
            }
        }));
        queue
    }

    pub(crate) fn capacity(&self) -> Option<usize> {
        self.capacity.map(NonZeroUsize::get)
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    fn is_full(&self, inner: &QueueInner) -> bool {
        self.capacity
            .is_some_and(|cap| inner.entries.len() >= cap.get())
    }

    /// Insert a new record, blocking while a bounded queue is full.
    ///
    /// Producers already parked when a graceful shutdown starts stay parked
    /// until a slot frees and are then admitted; an immediate shutdown wakes
    /// them with [`SchedulerError::Closed`].
    pub(crate) fn insert(&self, record: Arc<TaskRecord>) -> Result<(), SchedulerError> {
        let mut inner = self.inner.lock();
        if inner.admission != Admission::Open {
            return Err(SchedulerError::Closed);
        }

        if self.is_full(&inner) {
            inner.blocked_producers += 1;
            while self.is_full(&inner) && inner.admission != Admission::Closed {
                self.not_full.wait(&mut inner);
            }
            inner.blocked_producers -= 1;

            if inner.admission == Admission::Closed {
                // The dispatcher may be waiting for the last parked producer.
                self.available.notify_one();
                return Err(SchedulerError::Closed);
            }
        }

        self.push(&mut inner, record);
        Ok(())
    }

    /// Insert without blocking. A full bounded queue rejects the record.
    pub(crate) fn try_insert(&self, record: Arc<TaskRecord>) -> Result<(), SchedulerError> {
        let mut inner = self.inner.lock();
        if inner.admission != Admission::Open {
            return Err(SchedulerError::Closed);
        }
        if let Some(cap) = self.capacity {
            if inner.entries.len() >= cap.get() {
                return Err(SchedulerError::Rejected(cap.get()));
            }
        }
        self.push(&mut inner, record);
        Ok(())
    }

    /// Put a re-armed periodic record back. Never blocks on capacity.
    ///
    /// Returns `false` if the record was cancelled after re-arming or the
    /// queue no longer admits work; the caller then owns the record's fate.
    pub(crate) fn requeue(&self, record: Arc<TaskRecord>) -> bool {
        let mut inner = self.inner.lock();
        if inner.admission != Admission::Open || record.is_cancelled() {
            return false;
        }
        self.push(&mut inner, record);
        true
    }

    fn push(&self, inner: &mut MutexGuard<'_, QueueInner>, record: Arc<TaskRecord>) {
        let key = (record.next_run_at(), inner.next_seq);
        inner.next_seq += 1;

        let earliest = inner
            .entries
            .first_key_value()
            .map_or(true, |(first, _)| key < *first);

        inner.index.insert(record.id(), key);
        inner.entries.insert(key, record);

        if earliest {
            self.available.notify_one();
        }
    }

    /// Block until the earliest record is due and pop it.
    ///
    /// Returns `None` once the queue is closed, or draining with nothing
    /// left and no producer still waiting to get in.
    pub(crate) fn wait_for_due(&self) -> Option<Arc<TaskRecord>> {
        let mut inner = self.inner.lock();
        loop {
            if inner.admission == Admission::Closed {
                return None;
            }

            let first = inner.entries.first_key_value().map(|(key, _)| *key);
            match first {
                None => {
                    if inner.admission == Admission::Draining && inner.blocked_producers == 0 {
                        return None;
                    }
                    self.available.wait(&mut inner);
                }
                Some((due, _)) => {
                    let now = self.clock.now();
                    if due <= now {
                        if let Some((_, record)) = inner.entries.pop_first() {
                            inner.index.remove(&record.id());
                            self.not_full.notify_one();
                            return Some(record);
                        }
                        continue;
                    }
                    // Re-evaluated on every wake: a newly inserted earlier
                    // record or a clock jump both signal `available`.
                    self.available.wait_for(&mut inner, due - now);
                }
            }
        }
    }

    /// Remove a specific record. `false` if it is no longer queued.
    pub(crate) fn remove(&self, id: TaskId) -> bool {
        let mut inner = self.inner.lock();
        let Some(key) = inner.index.remove(&id) else {
            return false;
        };
        inner.entries.remove(&key);
        self.not_full.notify_one();
        true
    }

    /// Stop admitting work and hand back the records that will never run.
    ///
    /// With `drain`, only periodic records are pulled out; queued one-shots
    /// stay and are dispatched when due. Without it, everything goes.
    pub(crate) fn close(&self, drain: bool) -> Vec<Arc<TaskRecord>> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let removed: Vec<Arc<TaskRecord>> = if drain {
            let periodic: Vec<Key> = inner
                .entries
                .iter()
                .filter(|(_, record)| record.mode().is_periodic())
                .map(|(key, _)| *key)
                .collect();
            periodic
                .into_iter()
                .filter_map(|key| inner.entries.remove(&key))
                .collect()
        } else {
            std::mem::take(&mut inner.entries).into_values().collect()
        };
        for record in &removed {
            inner.index.remove(&record.id());
        }

        // Admission only moves forward: a late draining close must not reopen
        // a queue that was already closed outright.
        if inner.admission != Admission::Closed {
            inner.admission = if drain {
                Admission::Draining
            } else {
                Admission::Closed
            };
        }
        debug!(
            removed = removed.len(),
            remaining = inner.entries.len(),
            blocked_producers = inner.blocked_producers,
            drain,
            "queue closed"
        );

        self.available.notify_all();
        self.not_full.notify_all();
        removed
    }

    /// Force the dispatcher to re-read the clock.
    pub(crate) fn wake(&self) {
        let _guard = self.inner.lock();
        self.available.notify_all();
    }
}
