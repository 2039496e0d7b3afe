//! Monotonic time sources.
//!
//! All delay and deadline arithmetic in the scheduler goes through a
//! [`Clock`]. Production code uses [`MonotonicClock`]; tests inject a
//! [`ManualClock`] and move time forward explicitly.

use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Callback fired when a clock jumps forward outside of real time.
pub type AdvanceListener = Box<dyn Fn() + Send + Sync>;

/// A monotonic time source.
pub trait Clock: Send + Sync + 'static {
    /// Current monotonic time.
    fn now(&self) -> Instant;

    /// Register a listener for discontinuous time jumps.
    ///
    /// Real clocks never jump, so the default ignores the listener.
    fn on_advance(&self, _listener: AdvanceListener) {}
}

/// The system monotonic clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Virtual time that only moves when [`ManualClock::advance`] is called.
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
    listeners: Mutex<Vec<AdvanceListener>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// The instant this clock reports before any advance.
    pub fn origin(&self) -> Instant {
        self.origin
    }

    /// Virtual time elapsed since [`origin`](Self::origin).
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock()
    }

    /// Move time forward and wake everything waiting on it.
    pub fn advance(&self, by: Duration) {
        {
            let mut offset = self.offset.lock();
            *offset += by;
        }
        for listener in self.listeners.lock().iter() {
            listener();
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ManualClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualClock")
            .field("elapsed", &self.elapsed())
            .finish()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *self.offset.lock()
    }

    fn on_advance(&self, listener: AdvanceListener) {
        self.listeners.lock().push(listener);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn manual_clock_only_moves_on_advance() {
        let clock = ManualClock::new();
        let t0 = clock.now();
        assert_eq!(clock.now(), t0);

        clock.advance(Duration::from_millis(250));
        assert_eq!(clock.now() - t0, Duration::from_millis(250));
        assert_eq!(clock.elapsed(), Duration::from_millis(250));
    }

    #[test]
    fn advance_notifies_listeners() {
        let clock = ManualClock::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        clock.on_advance(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        clock.advance(Duration::from_secs(1));
        clock.advance(Duration::from_secs(1));
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn monotonic_clock_never_goes_backwards() {
        let clock = MonotonicClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
