//! Counting semaphores over pluggable waiter ordering.
//!
//! The engine, [`SemaphoreCore`], keeps `{count, max_count, checked,
//! entry_count, waiters}` behind one [`FastLock`] and parks contenders on
//! their own thread [`Monitor`](crate::thread::Monitor)s. The waiter list
//! type decides who a release wakes first: [`FifoList`] gives arrival
//! order, [`PriorityList`] gives highest-priority-first.
//!
//! # The notify-donor protocol
//!
//! `release` increments the count and then walks the waiter list head to
//! tail, try-locking each candidate's monitor:
//!
//! - busy monitor: skip it and keep walking; never block inside a release
//! - lockable monitor: remove the candidate from the list *first*, then
//!   notify; a `true` notify means a real waiter will consume the count, so
//!   the release is done
//! - sticky monitor (`notify` returned `false`): that waiter is already
//!   leaving for its own reasons; keep walking
//! - a full pass with no donation and a non-empty list: drop the semaphore
//!   lock, back off, and retry
//!
//! Together with each waiter's unconditional self-removal after its wait,
//! this guarantees a raised count is eventually consumed by exactly one
//! pending acquire, no matter how wakeups race with interrupts and
//! timeouts.

#![allow(unsafe_code)]

use crate::config::BackoffPolicy;
use crate::error::{SyncError, SyncResult};
use crate::sync::guard::UnlockedScope;
use crate::sync::waiters::{FifoList, PriorityList, WaiterList};
use crate::sync::{FastLock, Guard, Lockable};
use crate::thread::{ThreadHandle, WaitState};
use std::cell::UnsafeCell;
use std::time::Duration;

#[derive(Debug)]
struct Inner<L: WaiterList> {
    /// Current count; never negative.
    count: usize,
    /// Saturation bound, enforced only when `checked`.
    max_count: usize,
    /// Whether `release` fails at `max_count`.
    checked: bool,
    /// Waiters queued plus waiters mid-removal after their wait.
    entry_count: usize,
    /// Parked contenders in wake order.
    waiters: L,
}

/// Counting semaphore engine, parameterized over waiter ordering.
#[derive(Debug)]
pub(crate) struct SemaphoreCore<L: WaiterList> {
    lock: FastLock,
    backoff: BackoffPolicy,
    inner: UnsafeCell<Inner<L>>,
}

// SAFETY: `inner` is only touched while `lock` is held; ThreadHandle and
// the list types are Send.
unsafe impl<L: WaiterList + Send> Send for SemaphoreCore<L> {}
// SAFETY: as above; all shared access is serialized through `lock`.
unsafe impl<L: WaiterList + Send> Sync for SemaphoreCore<L> {}

impl<L: WaiterList> SemaphoreCore<L> {
    pub(crate) fn new(
        count: usize,
        max_count: usize,
        checked: bool,
        backoff: BackoffPolicy,
    ) -> Self {
        Self {
            lock: FastLock::new(),
            backoff,
            inner: UnsafeCell::new(Inner {
                count,
                max_count,
                checked,
                entry_count: 0,
                waiters: L::default(),
            }),
        }
    }

    /// Snapshot of the current count.
    pub(crate) fn count(&self) -> usize {
        let _guard = Guard::new(&self.lock).expect("spin lock acquire is infallible");
        // SAFETY: the semaphore lock is held.
        unsafe { &*self.inner.get() }.count
    }

    /// Decrements the count, parking until a release donates one.
    pub(crate) fn acquire(&self) -> SyncResult<()> {
        let current = ThreadHandle::current();
        let guard = Guard::new(&self.lock)?;

        {
            // SAFETY: the semaphore lock is held; the borrow ends before it
            // is inverted below.
            let inner = unsafe { &mut *self.inner.get() };
            // Fast path: a count is free and nobody queued before us.
            if inner.count > 0 && inner.entry_count == 0 {
                inner.count -= 1;
                return Ok(());
            }
            inner.entry_count += 1;
            inner.waiters.push(current.clone());
        }

        let mut monitor = current.monitor().lock();
        let state = {
            let _outside = Guard::<_, UnlockedScope>::inverted(&self.lock);
            monitor.wait()
        };
        drop(monitor);

        // SAFETY: the inverted guard re-acquired the semaphore lock.
        let inner = unsafe { &mut *self.inner.get() };
        // Remove ourselves whether or not a release picked us: a sticky
        // monitor state means we may still be queued after a non-notify
        // exit.
        inner.waiters.remove(&current);
        inner.entry_count -= 1;

        let result = match state {
            WaitState::Signaled => {
                inner.count -= 1;
                Ok(())
            }
            WaitState::Interrupted => Err(SyncError::interrupted()),
            _ => Err(SyncError::synchronization(
                "semaphore wait ended in an unexpected state",
            )),
        };
        drop(guard);
        result
    }

    /// Timed [`SemaphoreCore::acquire`]; `Ok(false)` when the deadline
    /// elapses first. A zero timeout performs no wait at all.
    pub(crate) fn try_acquire(&self, timeout: Duration) -> SyncResult<bool> {
        let current = ThreadHandle::current();
        let guard = Guard::new(&self.lock)?;

        {
            // SAFETY: the semaphore lock is held; the borrow ends before it
            // is inverted below.
            let inner = unsafe { &mut *self.inner.get() };
            if inner.count > 0 && inner.entry_count == 0 {
                inner.count -= 1;
                return Ok(true);
            }
            if timeout.is_zero() {
                return Ok(false);
            }
            inner.entry_count += 1;
            inner.waiters.push(current.clone());
        }

        let mut monitor = current.monitor().lock();
        let state = {
            let _outside = Guard::<_, UnlockedScope>::inverted(&self.lock);
            monitor.wait_for(timeout)
        };
        drop(monitor);

        // SAFETY: the inverted guard re-acquired the semaphore lock.
        let inner = unsafe { &mut *self.inner.get() };
        inner.waiters.remove(&current);
        inner.entry_count -= 1;

        let result = match state {
            WaitState::Signaled => {
                inner.count -= 1;
                Ok(true)
            }
            WaitState::TimedOut => Ok(false),
            WaitState::Interrupted => Err(SyncError::interrupted()),
            _ => Err(SyncError::synchronization(
                "semaphore wait ended in an unexpected state",
            )),
        };
        drop(guard);
        result
    }

    /// Increments the count and donates the wakeup to one eligible waiter.
    pub(crate) fn release(&self) -> SyncResult<()> {
        let _guard = Guard::new(&self.lock)?;

        {
            // SAFETY: the semaphore lock is held.
            let inner = unsafe { &mut *self.inner.get() };
            if inner.checked && inner.count == inner.max_count {
                return Err(SyncError::invalid_op(
                    "semaphore released past its maximum count",
                ));
            }
            inner.count += 1;
        }

        let mut round: u32 = 0;
        loop {
            let mut index = 0;
            loop {
                let candidate = {
                    // SAFETY: the semaphore lock is held.
                    let inner = unsafe { &*self.inner.get() };
                    match inner.waiters.get(index) {
                        Some(waiter) => waiter.clone(),
                        None => break,
                    }
                };
                let try_lock = candidate.monitor().try_lock();
                if let Some(mut monitor) = try_lock {
                    {
                        // SAFETY: the semaphore lock is held.
                        let inner = unsafe { &mut *self.inner.get() };
                        inner.waiters.remove_at(index);
                    }
                    let woke = monitor.notify();
                    drop(monitor);
                    if woke {
                        tracing::trace!(
                            thread_id = candidate.id(),
                            "semaphore wakeup donated"
                        );
                        return Ok(());
                    }
                    // Sticky monitor: that waiter is already leaving on its
                    // own; the next candidate slid into this index.
                } else {
                    // Busy monitor: its owner or another notifier holds it.
                    index += 1;
                }
            }

            {
                // SAFETY: the semaphore lock is held.
                let inner = unsafe { &*self.inner.get() };
                if inner.waiters.is_empty() {
                    return Ok(());
                }
            }
            tracing::trace!(round, "semaphore donor pass found no idle waiter");
            {
                let _outside = Guard::<_, UnlockedScope>::inverted(&self.lock);
                self.backoff.pause(round);
            }
            round = round.wrapping_add(1);
        }
    }

    #[cfg(test)]
    pub(crate) fn queued_waiters(&self) -> usize {
        let _guard = Guard::new(&self.lock).expect("spin lock acquire is infallible");
        // SAFETY: the semaphore lock is held.
        unsafe { &*self.inner.get() }.waiters.len()
    }
}

impl<L: WaiterList> Drop for SemaphoreCore<L> {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        debug_assert!(
            inner.waiters.is_empty(),
            "semaphore destroyed while blocking {} thread(s)",
            inner.waiters.len()
        );
    }
}

// ============================================================================
// Public semaphores
// ============================================================================

/// Checked counting semaphore with FIFO wake order.
///
/// `release` fails with an invalid-operation error once the count sits at
/// `max_count`. Also usable as a [`Lockable`] of capacity `max_count`.
///
/// # Example
///
/// ```ignore
/// let sem = Semaphore::new(0, 1);
/// // consumer: sem.wait()?;
/// // producer: sem.post()?;
/// ```
#[derive(Debug)]
pub struct Semaphore {
    core: SemaphoreCore<FifoList>,
}

impl Semaphore {
    /// Creates a semaphore with an initial `count` and saturation bound
    /// `max_count`.
    #[must_use]
    pub fn new(count: usize, max_count: usize) -> Self {
        Self::with_backoff(count, max_count, BackoffPolicy::default())
    }

    /// Like [`Semaphore::new`] with an explicit donor backoff policy.
    #[must_use]
    pub fn with_backoff(count: usize, max_count: usize, backoff: BackoffPolicy) -> Self {
        Self {
            core: SemaphoreCore::new(count, max_count, true, backoff),
        }
    }

    /// Decrements the count, blocking while it is zero.
    pub fn wait(&self) -> SyncResult<()> {
        self.core.acquire()
    }

    /// Timed [`Semaphore::wait`]; `Ok(false)` on deadline expiry.
    pub fn try_wait(&self, timeout: Duration) -> SyncResult<bool> {
        self.core.try_acquire(timeout)
    }

    /// Increments the count, waking one waiter if any are queued.
    pub fn post(&self) -> SyncResult<()> {
        self.core.release()
    }

    /// Snapshot of the current count.
    #[must_use]
    pub fn count(&self) -> usize {
        self.core.count()
    }

    #[cfg(test)]
    pub(crate) fn queued_waiters(&self) -> usize {
        self.core.queued_waiters()
    }
}

impl Lockable for Semaphore {
    fn acquire(&self) -> SyncResult<()> {
        self.core.acquire()
    }

    fn try_acquire(&self, timeout: Duration) -> SyncResult<bool> {
        self.core.try_acquire(timeout)
    }

    fn release(&self) -> SyncResult<()> {
        self.core.release()
    }
}

/// Unchecked counting semaphore with FIFO wake order.
///
/// The count may grow without bound; `release` never fails.
#[derive(Debug)]
pub struct CountingSemaphore {
    core: SemaphoreCore<FifoList>,
}

impl CountingSemaphore {
    /// Creates a semaphore with an initial `count` and no upper bound.
    #[must_use]
    pub fn new(count: usize) -> Self {
        Self::with_backoff(count, BackoffPolicy::default())
    }

    /// Like [`CountingSemaphore::new`] with an explicit donor backoff
    /// policy.
    #[must_use]
    pub fn with_backoff(count: usize, backoff: BackoffPolicy) -> Self {
        Self {
            core: SemaphoreCore::new(count, usize::MAX, false, backoff),
        }
    }

    /// Decrements the count, blocking while it is zero.
    pub fn wait(&self) -> SyncResult<()> {
        self.core.acquire()
    }

    /// Timed [`CountingSemaphore::wait`]; `Ok(false)` on deadline expiry.
    pub fn try_wait(&self, timeout: Duration) -> SyncResult<bool> {
        self.core.try_acquire(timeout)
    }

    /// Increments the count, waking one waiter if any are queued.
    pub fn post(&self) -> SyncResult<()> {
        self.core.release()
    }

    /// Snapshot of the current count.
    #[must_use]
    pub fn count(&self) -> usize {
        self.core.count()
    }
}

impl Lockable for CountingSemaphore {
    fn acquire(&self) -> SyncResult<()> {
        self.core.acquire()
    }

    fn try_acquire(&self, timeout: Duration) -> SyncResult<bool> {
        self.core.try_acquire(timeout)
    }

    fn release(&self) -> SyncResult<()> {
        self.core.release()
    }
}

/// Counting semaphore that wakes the highest-priority waiter first.
///
/// Waiters of equal priority are served in arrival order. Priority is the
/// [`ThreadHandle::priority`] of the waiter at the moment it queued.
#[derive(Debug)]
pub struct PrioritySemaphore {
    core: SemaphoreCore<PriorityList>,
}

impl PrioritySemaphore {
    /// Creates a checked priority semaphore.
    #[must_use]
    pub fn new(count: usize, max_count: usize) -> Self {
        Self {
            core: SemaphoreCore::new(count, max_count, true, BackoffPolicy::default()),
        }
    }

    /// Creates an unchecked priority semaphore with no upper bound.
    #[must_use]
    pub fn unbounded(count: usize) -> Self {
        Self {
            core: SemaphoreCore::new(count, usize::MAX, false, BackoffPolicy::default()),
        }
    }

    /// Decrements the count, blocking while it is zero.
    pub fn wait(&self) -> SyncResult<()> {
        self.core.acquire()
    }

    /// Timed [`PrioritySemaphore::wait`]; `Ok(false)` on deadline expiry.
    pub fn try_wait(&self, timeout: Duration) -> SyncResult<bool> {
        self.core.try_acquire(timeout)
    }

    /// Increments the count, waking the most urgent waiter if any are
    /// queued.
    pub fn post(&self) -> SyncResult<()> {
        self.core.release()
    }

    /// Snapshot of the current count.
    #[must_use]
    pub fn count(&self) -> usize {
        self.core.count()
    }
}

impl Lockable for PrioritySemaphore {
    fn acquire(&self) -> SyncResult<()> {
        self.core.acquire()
    }

    fn try_acquire(&self, timeout: Duration) -> SyncResult<bool> {
        self.core.try_acquire(timeout)
    }

    fn release(&self) -> SyncResult<()> {
        self.core.release()
    }
}
