//! Non-interruptible OS-level mutex.
//!
//! `FastMutex` is the cheapest blocking lock in the crate: a plain
//! [`parking_lot::RawMutex`] behind the [`Lockable`] contract. It cannot be
//! interrupted and carries no waiter bookkeeping of its own, which makes it
//! the right serializer for the biased read/write lock, where all blocking
//! happens on conditions rather than on the mutex itself.

use crate::error::SyncResult;
use crate::sync::Lockable;
use parking_lot::lock_api::RawMutex as _;
use parking_lot::RawMutex;
use std::time::Duration;

/// Plain OS mutex exposed through [`Lockable`].
pub struct FastMutex {
    raw: RawMutex,
}

impl FastMutex {
    /// Creates an unlocked mutex.
    #[must_use]
    pub fn new() -> Self {
        Self {
            raw: RawMutex::INIT,
        }
    }
}

impl Default for FastMutex {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FastMutex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastMutex").finish_non_exhaustive()
    }
}

impl Lockable for FastMutex {
    fn acquire(&self) -> SyncResult<()> {
        self.raw.lock();
        Ok(())
    }

    fn try_acquire(&self, timeout: Duration) -> SyncResult<bool> {
        if timeout.is_zero() {
            return Ok(self.raw.try_lock());
        }
        // RawMutex has no timed entry point; poll with short yields against
        // a fixed deadline. Contention on a FastMutex is expected to be
        // momentary.
        let deadline = crate::sync::lockable::Deadline::after(Some(timeout));
        loop {
            if self.raw.try_lock() {
                return Ok(true);
            }
            if deadline.expired() {
                return Ok(false);
            }
            std::thread::yield_now();
        }
    }

    fn release(&self) -> SyncResult<()> {
        // SAFETY: the Lockable contract requires release() only from the
        // thread that acquired; FastMutex adds no tracking on top of the
        // raw lock.
        unsafe { self.raw.unlock() };
        Ok(())
    }
}
