//! Linux futex-based parking
//!
//! Parks directly on the worker's state cell: `FUTEX_WAIT` re-checks the
//! expected value inside the kernel, so a handoff that races with the
//! decision to sleep either prevents the sleep entirely (`EAGAIN`) or is
//! guaranteed to find a waiter for its `FUTEX_WAKE`.

use super::{ParkOutcome, StatePark};
use std::io;
use std::ptr;
use std::sync::atomic::AtomicU32;

/// Linux futex-based parking. Stateless: the futex is keyed by the cell
/// address.
pub struct FutexPark;

impl FutexPark {
    pub fn new() -> Self {
        FutexPark
    }
}

impl Default for FutexPark {
    fn default() -> Self {
        Self::new()
    }
}

impl StatePark for FutexPark {
    fn park(&self, cell: &AtomicU32, expected: u32) -> ParkOutcome {
        // FUTEX_WAIT: sleep iff *cell still equals `expected`.
        let rc = unsafe {
            libc::syscall(
                libc::SYS_futex,
                cell.as_ptr(),
                libc::FUTEX_WAIT | libc::FUTEX_PRIVATE_FLAG,
                expected,
                ptr::null::<libc::timespec>(), // no timeout
                ptr::null::<u32>(),            // uaddr2 (unused)
                0u32,                          // val3 (unused)
            )
        };
        if rc == 0 {
            return ParkOutcome::Woken;
        }
        let errno = io::Error::last_os_error().raw_os_error().unwrap_or(0);
        match errno {
            // The cell changed before we slept; the caller re-checks.
            libc::EAGAIN => ParkOutcome::WouldBlock,
            // Interrupted by a signal; treat like a spurious wakeup.
            libc::EINTR => ParkOutcome::Woken,
            _ => ParkOutcome::Failed(errno),
        }
    }

    fn wake_one(&self, cell: &AtomicU32) -> Result<(), i32> {
        let rc = unsafe {
            libc::syscall(
                libc::SYS_futex,
                cell.as_ptr(),
                libc::FUTEX_WAKE | libc::FUTEX_PRIVATE_FLAG,
                1i32, // wake at most one waiter
                ptr::null::<libc::timespec>(),
                ptr::null::<u32>(),
                0u32,
            )
        };
        if rc == -1 {
            Err(io::Error::last_os_error().raw_os_error().unwrap_or(0))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_wait_checks_value_in_kernel() {
        let park = FutexPark::new();
        let cell = AtomicU32::new(7);

        // Expected value mismatch comes back as EAGAIN, mapped to WouldBlock.
        assert_eq!(park.park(&cell, 3), ParkOutcome::WouldBlock);
    }

    #[test]
    fn test_wake_releases_waiter() {
        let cell = Arc::new(AtomicU32::new(3));

        let t_cell = Arc::clone(&cell);
        let handle = thread::spawn(move || {
            let park = FutexPark::new();
            while t_cell.load(Ordering::Acquire) == 3 {
                park.park(&t_cell, 3);
            }
        });

        thread::sleep(Duration::from_millis(50));
        cell.store(1, Ordering::Release);
        FutexPark::new().wake_one(&cell).unwrap();

        handle.join().unwrap();
    }
}
