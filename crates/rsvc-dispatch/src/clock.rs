//! Dispatch-thread coarse time.
//!
//! Workers measure their poll budget against time the dispatch thread last
//! observed, not wall-clock time: a worker should never decide to park
//! while the dispatch thread itself has stopped polling, and reading a
//! shared counter is far cheaper than a clock syscall in the spin loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Coarse monotonic clock, advanced only by the dispatch thread.
pub struct DispatchClock {
    origin: Instant,
    now_ns: AtomicU64,
}

impl DispatchClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            now_ns: AtomicU64::new(0),
        }
    }

    /// Advance the published time. Dispatch thread only.
    #[inline]
    pub fn tick(&self) {
        let elapsed = self.origin.elapsed().as_nanos() as u64;
        self.now_ns.store(elapsed, Ordering::Relaxed);
    }

    /// Nanoseconds since construction, as of the last `tick`.
    #[inline]
    pub fn now_ns(&self) -> u64 {
        self.now_ns.load(Ordering::Relaxed)
    }
}

impl Default for DispatchClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_starts_at_zero() {
        let clock = DispatchClock::new();
        assert_eq!(clock.now_ns(), 0);
    }

    #[test]
    fn test_tick_advances() {
        let clock = DispatchClock::new();
        thread::sleep(Duration::from_millis(1));
        clock.tick();
        let first = clock.now_ns();
        assert!(first > 0);

        thread::sleep(Duration::from_millis(1));
        clock.tick();
        assert!(clock.now_ns() > first);
    }

    #[test]
    fn test_no_tick_no_advance() {
        let clock = DispatchClock::new();
        clock.tick();
        let t = clock.now_ns();
        thread::sleep(Duration::from_millis(1));
        assert_eq!(clock.now_ns(), t);
    }
}
