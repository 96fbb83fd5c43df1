//! Non-reentrant spin lock for short critical sections.
//!
//! `FastLock` serializes the few-instruction state updates inside the
//! primitives themselves (semaphore counters, condition waiter lists). It
//! spins on an atomic flag, yielding the processor between failed attempts.
//! Recursive acquisition is a contract violation and trips the debug-build
//! owner assertion.

use crate::error::SyncResult;
use crate::sync::Lockable;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[cfg(debug_assertions)]
use std::sync::atomic::AtomicU64;

#[cfg(debug_assertions)]
fn current_thread_token() -> u64 {
    crate::thread::ThreadHandle::current().id()
}

/// Spin lock with processor yield between attempts.
#[derive(Debug)]
pub struct FastLock {
    locked: AtomicBool,
    /// Debug-only owner tag; 0 means unowned.
    #[cfg(debug_assertions)]
    owner: AtomicU64,
}

impl FastLock {
    /// Creates an unlocked `FastLock`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
            #[cfg(debug_assertions)]
            owner: AtomicU64::new(0),
        }
    }

    fn attempt(&self) -> bool {
        let taken = !self.locked.swap(true, Ordering::Acquire);
        #[cfg(debug_assertions)]
        if taken {
            self.owner.store(current_thread_token(), Ordering::Relaxed);
        }
        taken
    }

    /// Acquires the lock, spinning until it is free.
    pub fn lock(&self) {
        #[cfg(debug_assertions)]
        debug_assert_ne!(
            self.owner.load(Ordering::Relaxed),
            current_thread_token(),
            "FastLock acquired recursively"
        );
        while !self.attempt() {
            std::thread::yield_now();
        }
    }

    /// Single non-blocking attempt.
    #[must_use]
    pub fn try_lock(&self) -> bool {
        self.attempt()
    }

    /// Releases the lock.
    pub fn unlock(&self) {
        #[cfg(debug_assertions)]
        {
            debug_assert_eq!(
                self.owner.load(Ordering::Relaxed),
                current_thread_token(),
                "FastLock released by a non-owner"
            );
            self.owner.store(0, Ordering::Relaxed);
        }
        self.locked.store(false, Ordering::Release);
    }
}

impl Default for FastLock {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for FastLock {
    fn drop(&mut self) {
        debug_assert!(
            !self.locked.load(Ordering::Relaxed),
            "FastLock destroyed while held"
        );
    }
}

impl Lockable for FastLock {
    fn acquire(&self) -> SyncResult<()> {
        self.lock();
        Ok(())
    }

    /// A single attempt; the timeout is accepted for interface parity but
    /// not enforced beyond "try once".
    fn try_acquire(&self, _timeout: Duration) -> SyncResult<bool> {
        Ok(self.try_lock())
    }

    fn release(&self) -> SyncResult<()> {
        self.unlock();
        Ok(())
    }
}
