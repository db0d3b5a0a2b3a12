//! Worker parking
//!
//! Kernel-assisted sleep/wake for workers that have exhausted their poll
//! budget. A worker parks on its own state cell with the value it expects
//! the cell to hold (`Sleeping`); a handoff that finds the cell in
//! `Sleeping` wakes exactly one waiter.
//!
//! Platform-specific implementations use the most efficient primitive
//! available.

use std::sync::atomic::AtomicU32;
use std::sync::Arc;

/// Result of one park attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParkOutcome {
    /// Woken by a wake call (or a spurious kernel wakeup).
    Woken,
    /// The cell no longer held the expected value, so the caller never
    /// slept. Benign: re-check the cell and carry on.
    WouldBlock,
    /// The kernel primitive failed; errno attached. The caller's state
    /// is undefined beyond "not asleep".
    Failed(i32),
}

/// Platform-specific park/unpark over an aligned 32-bit cell.
///
/// One instance is shared by a dispatcher and all of its workers; the
/// cell passed to each call identifies the waiter.
pub trait StatePark: Send + Sync {
    /// Block the calling thread while `*cell == expected`.
    ///
    /// May return spuriously; callers must re-check the cell and re-park
    /// if it still holds `expected`.
    fn park(&self, cell: &AtomicU32, expected: u32) -> ParkOutcome;

    /// Wake at most one thread parked on `cell`.
    ///
    /// Returns `Err(errno)` if the kernel primitive failed.
    fn wake_one(&self, cell: &AtomicU32) -> Result<(), i32>;
}

// Platform-specific implementations
cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        mod futex_linux;
        pub use futex_linux::FutexPark as PlatformPark;
    } else {
        mod fallback;
        pub use fallback::CondvarPark as PlatformPark;
    }
}

/// Create a platform-appropriate parker.
pub fn new_park() -> Arc<dyn StatePark> {
    Arc::new(PlatformPark::new())
}
