//! Fallback parking using std::sync::Condvar
//!
//! Used on platforms without futex support. All waiters share one condvar,
//! so a wake notifies everyone and each waiter re-checks its own cell.
//! Less efficient but portable.

use super::{ParkOutcome, StatePark};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Condvar, Mutex};

/// Condvar-based parking (fallback)
pub struct CondvarPark {
    mutex: Mutex<()>,
    condvar: Condvar,
}

impl CondvarPark {
    pub fn new() -> Self {
        Self {
            mutex: Mutex::new(()),
            condvar: Condvar::new(),
        }
    }
}

impl Default for CondvarPark {
    fn default() -> Self {
        Self::new()
    }
}

impl StatePark for CondvarPark {
    fn park(&self, cell: &AtomicU32, expected: u32) -> ParkOutcome {
        let mut guard = self.mutex.lock().unwrap();

        // The cell is re-checked under the lock, and wake_one bounces
        // through the same lock before notifying, so a store+wake cannot
        // slip between this check and the wait below.
        if cell.load(Ordering::Acquire) != expected {
            return ParkOutcome::WouldBlock;
        }
        while cell.load(Ordering::Acquire) == expected {
            guard = self.condvar.wait(guard).unwrap();
        }
        ParkOutcome::Woken
    }

    fn wake_one(&self, cell: &AtomicU32) -> Result<(), i32> {
        let _ = cell;
        drop(self.mutex.lock().unwrap());
        // Waiters on other cells re-check and go back to sleep.
        self.condvar.notify_all();
        Ok(())
    }
}
