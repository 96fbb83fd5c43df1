//! Interruptible, FIFO-fair mutual exclusion.
//!
//! Unlike [`FastMutex`](crate::sync::FastMutex), a [`Mutex`] parks its
//! contenders on their thread monitors, which makes a blocked `acquire`
//! interruptible and hands the lock over in arrival order. It is the
//! default serializing lock of the queue family and the writer lock of the
//! fair read/write lock.
//!
//! Ownership handoff happens on the release side: the releaser assigns the
//! lock to the waiter it is about to notify before waking it, so a
//! late-arriving thread can never slip in between the release and the
//! wakeup. Recursive acquisition is self-detected and reported as a
//! deadlock error rather than hanging.

#![allow(unsafe_code)]

use crate::config::BackoffPolicy;
use crate::error::{SyncError, SyncResult};
use crate::sync::guard::UnlockedScope;
use crate::sync::waiters::{FifoList, WaiterList};
use crate::sync::{FastLock, Guard, Lockable};
use crate::thread::{ThreadHandle, WaitState};
use std::cell::UnsafeCell;
use std::time::Duration;

#[derive(Debug)]
struct Inner {
    /// Current owner; release-side handoff writes the next owner here
    /// before notifying it.
    owner: Option<ThreadHandle>,
    /// Parked contenders in arrival order.
    waiters: FifoList,
}

/// Monitor-based interruptible mutex with FIFO handoff.
#[derive(Debug)]
pub struct Mutex {
    lock: FastLock,
    backoff: BackoffPolicy,
    inner: UnsafeCell<Inner>,
}

// SAFETY: `inner` is only touched while `lock` is held.
unsafe impl Send for Mutex {}
// SAFETY: as above; all shared access is serialized through `lock`.
unsafe impl Sync for Mutex {}

impl Mutex {
    /// Creates an unlocked mutex.
    #[must_use]
    pub fn new() -> Self {
        Self::with_backoff(BackoffPolicy::default())
    }

    /// Like [`Mutex::new`] with an explicit donor backoff policy.
    #[must_use]
    pub fn with_backoff(backoff: BackoffPolicy) -> Self {
        Self {
            lock: FastLock::new(),
            backoff,
            inner: UnsafeCell::new(Inner {
                owner: None,
                waiters: FifoList::default(),
            }),
        }
    }

    /// True if some thread currently owns the mutex.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        let _guard = Guard::new(&self.lock).expect("spin lock acquire is infallible");
        // SAFETY: the serializing lock is held.
        unsafe { &*self.inner.get() }.owner.is_some()
    }

    fn acquire_inner(&self, timeout: Option<Duration>) -> SyncResult<bool> {
        let current = ThreadHandle::current();
        let guard = Guard::new(&self.lock)?;

        {
            // SAFETY: the serializing lock is held; the borrow ends before
            // it is inverted below.
            let inner = unsafe { &mut *self.inner.get() };
            if inner.owner.is_none() && inner.waiters.is_empty() {
                inner.owner = Some(current);
                return Ok(true);
            }
            if inner.owner.as_ref() == Some(&current) {
                return Err(SyncError::deadlock(
                    "mutex acquired recursively by its owner",
                ));
            }
            if timeout == Some(Duration::ZERO) {
                return Ok(false);
            }
            inner.waiters.push(current.clone());
        }

        let mut monitor = current.monitor().lock();
        let state = {
            let _outside = Guard::<_, UnlockedScope>::inverted(&self.lock);
            match timeout {
                None => monitor.wait(),
                Some(t) => monitor.wait_for(t),
            }
        };
        drop(monitor);

        // SAFETY: the inverted guard re-acquired the serializing lock.
        let inner = unsafe { &mut *self.inner.get() };
        inner.waiters.remove(&current);

        let result = match state {
            WaitState::Signaled => {
                // The releaser already assigned ownership to us.
                debug_assert_eq!(inner.owner.as_ref(), Some(&current));
                Ok(true)
            }
            WaitState::TimedOut => Ok(false),
            WaitState::Interrupted => Err(SyncError::interrupted()),
            _ => Err(SyncError::synchronization(
                "mutex wait ended in an unexpected state",
            )),
        };
        drop(guard);
        result
    }

    fn release_inner(&self) -> SyncResult<()> {
        let current = ThreadHandle::current();
        let _guard = Guard::new(&self.lock)?;

        {
            // SAFETY: the serializing lock is held.
            let inner = unsafe { &mut *self.inner.get() };
            if inner.owner.as_ref() != Some(&current) {
                return Err(SyncError::invalid_op(
                    "mutex released by a thread that does not own it",
                ));
            }
            inner.owner = None;
        }

        let mut round: u32 = 0;
        loop {
            let mut index = 0;
            loop {
                let candidate = {
                    // SAFETY: the serializing lock is held.
                    let inner = unsafe { &*self.inner.get() };
                    match inner.waiters.get(index) {
                        Some(waiter) => waiter.clone(),
                        None => break,
                    }
                };
                let try_lock = candidate.monitor().try_lock();
                if let Some(mut monitor) = try_lock {
                    {
                        // SAFETY: the serializing lock is held.
                        let inner = unsafe { &mut *self.inner.get() };
                        inner.waiters.remove_at(index);
                        // Hand over before waking: nobody can take the fast
                        // path while ownership is assigned.
                        inner.owner = Some(candidate.clone());
                    }
                    let woke = monitor.notify();
                    drop(monitor);
                    if woke {
                        tracing::trace!(thread_id = candidate.id(), "mutex handed off");
                        return Ok(());
                    }
                    // Sticky monitor: take the handoff back and try the
                    // next candidate.
                    // SAFETY: the serializing lock is held.
                    let inner = unsafe { &mut *self.inner.get() };
                    inner.owner = None;
                } else {
                    index += 1;
                }
            }

            {
                // SAFETY: the serializing lock is held.
                let inner = unsafe { &*self.inner.get() };
                if inner.waiters.is_empty() {
                    return Ok(());
                }
            }
            {
                let _outside = Guard::<_, UnlockedScope>::inverted(&self.lock);
                self.backoff.pause(round);
            }
            round = round.wrapping_add(1);
        }
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Mutex {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        debug_assert!(
            inner.waiters.is_empty(),
            "mutex destroyed while blocking {} thread(s)",
            inner.waiters.len()
        );
    }
}

impl Lockable for Mutex {
    fn acquire(&self) -> SyncResult<()> {
        self.acquire_inner(None).map(|_| ())
    }

    fn try_acquire(&self, timeout: Duration) -> SyncResult<bool> {
        self.acquire_inner(Some(timeout))
    }

    fn release(&self) -> SyncResult<()> {
        self.release_inner()
    }
}
