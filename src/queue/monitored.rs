//! Unbounded queue with an empty-awareness condition.
//!
//! A [`MonitoredQueue`] behaves like
//! [`BlockingQueue`](crate::queue::BlockingQueue), in that producers never
//! block on capacity, but additionally tracks the moment it drains, so callers
//! can park in [`MonitoredQueue::wait_empty`] until every queued value has
//! been consumed. The classic use is an executor draining its run queue on
//! shutdown.

#![allow(unsafe_code)]

use crate::error::{SyncError, SyncResult};
use crate::sync::lockable::Deadline;
use crate::sync::{Cancelable, Condition, Guard, Lockable, Mutex, Waitable};
use std::cell::UnsafeCell;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Unbounded FIFO queue that also signals when it drains.
#[derive(Debug)]
pub struct MonitoredQueue<T, L: Lockable = Mutex> {
    lock: L,
    not_empty: Condition,
    is_empty: Condition,
    canceled: AtomicBool,
    items: UnsafeCell<VecDeque<T>>,
}

// SAFETY: `items` is only touched while `lock` is held.
unsafe impl<T: Send, L: Lockable + Send> Send for MonitoredQueue<T, L> {}
// SAFETY: as above; all shared access is serialized through `lock`.
unsafe impl<T: Send, L: Lockable + Send + Sync> Sync for MonitoredQueue<T, L> {}

impl<T> MonitoredQueue<T, Mutex> {
    /// Creates an empty queue over the default interruptible lock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_lock(Mutex::new())
    }
}

impl<T> Default for MonitoredQueue<T, Mutex> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, L: Lockable> MonitoredQueue<T, L> {
    /// Creates an empty queue serialized by `lock`.
    #[must_use]
    pub fn with_lock(lock: L) -> Self {
        Self {
            lock,
            not_empty: Condition::new(),
            is_empty: Condition::new(),
            canceled: AtomicBool::new(false),
            items: UnsafeCell::new(VecDeque::new()),
        }
    }

    /// Appends `item`, waking one blocked consumer.
    pub fn add(&self, item: T) -> SyncResult<()> {
        let _guard = Guard::new(&self.lock)?;
        if self.canceled.load(Ordering::Acquire) {
            return Err(SyncError::canceled());
        }
        // SAFETY: the serializing lock is held.
        unsafe { &mut *self.items.get() }.push_back(item);
        self.not_empty.signal();
        Ok(())
    }

    /// Timed [`MonitoredQueue::add`]; `Ok(false)` when the serializing lock
    /// cannot be taken before the deadline.
    pub fn try_add(&self, item: T, timeout: Duration) -> SyncResult<bool> {
        let guard = match Guard::timed(&self.lock, timeout) {
            Ok(guard) => guard,
            Err(err) if err.is_timeout() => return Ok(false),
            Err(err) => return Err(err),
        };
        if self.canceled.load(Ordering::Acquire) {
            return Err(SyncError::canceled());
        }
        // SAFETY: the serializing lock is held.
        unsafe { &mut *self.items.get() }.push_back(item);
        self.not_empty.signal();
        drop(guard);
        Ok(true)
    }

    /// Removes and returns the oldest value, parking while the queue is
    /// empty.
    pub fn next(&self) -> SyncResult<T> {
        let _guard = Guard::new(&self.lock)?;
        loop {
            // SAFETY: the serializing lock is held at every check.
            if !unsafe { &*self.items.get() }.is_empty() {
                break;
            }
            if self.canceled.load(Ordering::Acquire) {
                return Err(SyncError::canceled());
            }
            self.not_empty.wait(&self.lock)?;
        }
        self.pop_and_wake()
    }

    /// Timed [`MonitoredQueue::next`]; a timeout error when no value
    /// arrives before the deadline.
    pub fn try_next(&self, timeout: Duration) -> SyncResult<T> {
        let deadline = Deadline::after(Some(timeout));
        let _guard = Guard::timed(&self.lock, timeout)?;
        loop {
            // SAFETY: the serializing lock is held at every check.
            if !unsafe { &*self.items.get() }.is_empty() {
                break;
            }
            if self.canceled.load(Ordering::Acquire) {
                return Err(SyncError::canceled());
            }
            let remaining = deadline.remaining().unwrap_or(Duration::ZERO);
            if !self.not_empty.wait_timeout(&self.lock, remaining)? {
                return Err(SyncError::timeout());
            }
        }
        self.pop_and_wake()
    }

    fn pop_and_wake(&self) -> SyncResult<T> {
        // SAFETY: the serializing lock is held.
        let items = unsafe { &mut *self.items.get() };
        let item = match items.pop_front() {
            Some(item) => item,
            None => return Err(SyncError::canceled()),
        };
        if items.is_empty() {
            self.is_empty.broadcast();
        }
        Ok(item)
    }

    /// Number of queued values.
    pub fn size(&self) -> SyncResult<usize> {
        let _guard = Guard::new(&self.lock)?;
        // SAFETY: the serializing lock is held.
        Ok(unsafe { &*self.items.get() }.len())
    }

    /// Blocks until the queue is empty.
    pub fn wait_empty(&self) -> SyncResult<()> {
        let _guard = Guard::new(&self.lock)?;
        // SAFETY: the serializing lock is held at every check.
        while !unsafe { &*self.items.get() }.is_empty() {
            self.is_empty.wait(&self.lock)?;
        }
        Ok(())
    }

    /// Timed [`MonitoredQueue::wait_empty`]; `Ok(false)` when values remain
    /// at the deadline.
    pub fn wait_empty_timeout(&self, timeout: Duration) -> SyncResult<bool> {
        let deadline = Deadline::after(Some(timeout));
        let _guard = Guard::timed(&self.lock, timeout)?;
        loop {
            // SAFETY: the serializing lock is held at every check.
            if unsafe { &*self.items.get() }.is_empty() {
                return Ok(true);
            }
            let remaining = deadline.remaining().unwrap_or(Duration::ZERO);
            if !self.is_empty.wait_timeout(&self.lock, remaining)? && deadline.expired() {
                return Ok(false);
            }
        }
    }
}

impl<T, L: Lockable> Cancelable for MonitoredQueue<T, L> {
    fn cancel(&self) -> SyncResult<()> {
        let _guard = Guard::new(&self.lock)?;
        self.canceled.store(true, Ordering::Release);
        tracing::debug!("monitored queue canceled");
        self.not_empty.broadcast();
        self.is_empty.broadcast();
        Ok(())
    }

    fn is_canceled(&self) -> bool {
        if self.canceled.load(Ordering::Acquire) {
            return true;
        }
        let Ok(_guard) = Guard::new(&self.lock) else {
            return false;
        };
        self.canceled.load(Ordering::Acquire)
    }
}

impl<T, L: Lockable> Waitable for MonitoredQueue<T, L> {
    fn wait(&self) -> SyncResult<()> {
        self.wait_empty()
    }

    fn wait_timeout(&self, timeout: Duration) -> SyncResult<bool> {
        self.wait_empty_timeout(timeout)
    }
}

impl<T, L: Lockable> Lockable for MonitoredQueue<T, L> {
    fn acquire(&self) -> SyncResult<()> {
        self.lock.acquire()
    }

    fn try_acquire(&self, timeout: Duration) -> SyncResult<bool> {
        self.lock.try_acquire(timeout)
    }

    fn release(&self) -> SyncResult<()> {
        self.lock.release()
    }
}
