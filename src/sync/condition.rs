//! Condition variable over thread monitors and an external lock.
//!
//! A [`Condition`] follows the classical mutex+condvar contract: the caller
//! holds some external [`Lockable`] protecting the predicate, and
//! [`Condition::wait`] releases that lock across the park and re-acquires
//! it before returning on every path, including interrupts, so caller
//! guards stay balanced.
//!
//! Waiters queue FIFO. [`Condition::signal`] runs the same notify-donor
//! walk as the semaphore release; [`Condition::broadcast`] makes a single
//! pass waking every waiter whose monitor is idle; a busy or sticky
//! monitor belongs to a waiter that is already waking for its own reasons
//! and will re-test the predicate anyway.

#![allow(unsafe_code)]

use crate::config::BackoffPolicy;
use crate::error::{SyncError, SyncResult};
use crate::sync::guard::UnlockedScope;
use crate::sync::waiters::{FifoList, WaiterList};
use crate::sync::{FastLock, Guard, Lockable};
use crate::thread::{ThreadHandle, WaitState};
use smallvec::SmallVec;
use std::cell::UnsafeCell;
use std::time::Duration;

/// FIFO condition variable usable with any [`Lockable`].
#[derive(Debug)]
pub struct Condition {
    lock: FastLock,
    backoff: BackoffPolicy,
    waiters: UnsafeCell<FifoList>,
}

// SAFETY: `waiters` is only touched while `lock` is held.
unsafe impl Send for Condition {}
// SAFETY: as above; all shared access is serialized through `lock`.
unsafe impl Sync for Condition {}

impl Condition {
    /// Creates a condition with no waiters.
    #[must_use]
    pub fn new() -> Self {
        Self::with_backoff(BackoffPolicy::default())
    }

    /// Like [`Condition::new`] with an explicit donor backoff policy.
    #[must_use]
    pub fn with_backoff(backoff: BackoffPolicy) -> Self {
        Self {
            lock: FastLock::new(),
            backoff,
            waiters: UnsafeCell::new(FifoList::default()),
        }
    }

    /// Blocks until signaled.
    ///
    /// Precondition: the calling thread holds `external`. The lock is
    /// released while parked and re-held when this returns, error paths
    /// included.
    pub fn wait<L: Lockable + ?Sized>(&self, external: &L) -> SyncResult<()> {
        match self.wait_inner(external, None)? {
            WaitState::Signaled => Ok(()),
            WaitState::Interrupted => Err(SyncError::interrupted()),
            _ => Err(SyncError::synchronization(
                "condition wait ended in an unexpected state",
            )),
        }
    }

    /// Timed [`Condition::wait`]; `Ok(false)` when the deadline elapses
    /// without a signal.
    pub fn wait_timeout<L: Lockable + ?Sized>(
        &self,
        external: &L,
        timeout: Duration,
    ) -> SyncResult<bool> {
        match self.wait_inner(external, Some(timeout))? {
            WaitState::Signaled => Ok(true),
            WaitState::TimedOut => Ok(false),
            WaitState::Interrupted => Err(SyncError::interrupted()),
            _ => Err(SyncError::synchronization(
                "condition wait ended in an unexpected state",
            )),
        }
    }

    fn wait_inner<L: Lockable + ?Sized>(
        &self,
        external: &L,
        timeout: Option<Duration>,
    ) -> SyncResult<WaitState> {
        let current = ThreadHandle::current();
        let mut release_failure = None;

        let state = {
            let _queue_guard = Guard::new(&self.lock)?;
            {
                // SAFETY: the condition's lock is held; the borrow ends
                // before it is inverted below.
                let waiters = unsafe { &mut *self.waiters.get() };
                waiters.push(current.clone());
            }

            let mut monitor = current.monitor().lock();
            let state = {
                let _outside = Guard::<_, UnlockedScope>::inverted(&self.lock);
                // The external lock is dropped only after we are queued and
                // hold our monitor, so a signaler that takes the external
                // lock next can always find us.
                match external.release() {
                    Ok(()) => match timeout {
                        None => monitor.wait(),
                        Some(t) => monitor.wait_for(t),
                    },
                    Err(err) => {
                        // Contract violation by the caller; report it, but
                        // only after taking ourselves back out of the list.
                        release_failure = Some(err);
                        WaitState::Idle
                    }
                }
            };
            drop(monitor);

            // SAFETY: the inverted guard re-acquired the condition's lock.
            let waiters = unsafe { &mut *self.waiters.get() };
            // Sticky hygiene: non-signal exits leave us queued.
            waiters.remove(&current);
            state
        };

        if let Some(err) = release_failure {
            // The external lock was never released; hand it back held.
            return Err(err);
        }
        // Re-acquire the external lock outside the condition's lock, before
        // any result (or error) reaches the caller.
        external.acquire()?;
        Ok(state)
    }

    /// Wakes one waiter via the notify-donor protocol.
    pub fn signal(&self) {
        let Ok(_guard) = Guard::new(&self.lock) else {
            return;
        };
        let mut round: u32 = 0;
        loop {
            let mut index = 0;
            loop {
                let candidate = {
                    // SAFETY: the condition's lock is held.
                    let waiters = unsafe { &*self.waiters.get() };
                    match waiters.get(index) {
                        Some(waiter) => waiter.clone(),
                        None => break,
                    }
                };
                let try_lock = candidate.monitor().try_lock();
                if let Some(mut monitor) = try_lock {
                    {
                        // SAFETY: the condition's lock is held.
                        let waiters = unsafe { &mut *self.waiters.get() };
                        waiters.remove_at(index);
                    }
                    let woke = monitor.notify();
                    drop(monitor);
                    if woke {
                        tracing::trace!(
                            thread_id = candidate.id(),
                            "condition signal donated"
                        );
                        return;
                    }
                } else {
                    index += 1;
                }
            }

            {
                // SAFETY: the condition's lock is held.
                let waiters = unsafe { &*self.waiters.get() };
                if waiters.is_empty() {
                    return;
                }
            }
            {
                let _outside = Guard::<_, UnlockedScope>::inverted(&self.lock);
                self.backoff.pause(round);
            }
            round = round.wrapping_add(1);
        }
    }

    /// Wakes every waiter whose monitor is idle.
    ///
    /// Busy and sticky monitors are skipped: their owners are already
    /// waking and will re-test the caller's predicate themselves.
    pub fn broadcast(&self) {
        let Ok(_guard) = Guard::new(&self.lock) else {
            return;
        };
        // Snapshot so removal does not fight the walk.
        let snapshot: SmallVec<[ThreadHandle; 8]> = {
            // SAFETY: the condition's lock is held.
            let waiters = unsafe { &*self.waiters.get() };
            (0..waiters.len())
                .filter_map(|i| waiters.get(i).cloned())
                .collect()
        };
        let mut woken = 0usize;
        for candidate in snapshot {
            if let Some(mut monitor) = candidate.monitor().try_lock() {
                {
                    // SAFETY: the condition's lock is held.
                    let waiters = unsafe { &mut *self.waiters.get() };
                    waiters.remove(&candidate);
                }
                if monitor.notify() {
                    woken += 1;
                }
            }
        }
        tracing::trace!(woken, "condition broadcast");
    }

    /// Number of queued waiters; for diagnostics and tests.
    #[must_use]
    pub fn waiter_count(&self) -> usize {
        let _guard = Guard::new(&self.lock).expect("spin lock acquire is infallible");
        // SAFETY: the condition's lock is held.
        unsafe { &*self.waiters.get() }.len()
    }
}

impl Default for Condition {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Condition {
    fn drop(&mut self) {
        let waiters = self.waiters.get_mut();
        debug_assert!(
            waiters.is_empty(),
            "condition destroyed while blocking {} thread(s)",
            waiters.len()
        );
    }
}
