//! Capacity-limited producer/consumer queue.
//!
//! On top of the blocking-queue contract, a [`BoundedQueue`] parks
//! producers while it is full and exposes a blocking [`wait_empty`]
//! (`BoundedQueue::wait_empty`) that holds callers until the queue drains.
//!
//! A capacity of zero turns the queue into a rendezvous point: every `add`
//! blocks until a consumer is committed inside `next`, and the value is
//! handed straight through.

#![allow(unsafe_code)]

use crate::error::{SyncError, SyncResult};
use crate::sync::lockable::Deadline;
use crate::sync::{Cancelable, Condition, Guard, Lockable, Mutex, Waitable};
use std::cell::UnsafeCell;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[derive(Debug)]
struct Inner<T> {
    items: VecDeque<T>,
    /// Consumers committed inside `next`; only meaningful at capacity zero,
    /// where each one entitles exactly one producer to hand a value over.
    waiting_consumers: usize,
}

/// FIFO queue with a maximum capacity.
#[derive(Debug)]
pub struct BoundedQueue<T, L: Lockable = Mutex> {
    capacity: usize,
    lock: L,
    not_full: Condition,
    not_empty: Condition,
    is_empty: Condition,
    canceled: AtomicBool,
    inner: UnsafeCell<Inner<T>>,
}

// SAFETY: `inner` is only touched while `lock` is held.
unsafe impl<T: Send, L: Lockable + Send> Send for BoundedQueue<T, L> {}
// SAFETY: as above; all shared access is serialized through `lock`.
unsafe impl<T: Send, L: Lockable + Send + Sync> Sync for BoundedQueue<T, L> {}

impl<T> BoundedQueue<T, Mutex> {
    /// Creates an empty queue holding at most `capacity` values.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self::with_lock(capacity, Mutex::new())
    }
}

impl<T, L: Lockable> BoundedQueue<T, L> {
    /// Creates an empty queue serialized by `lock`.
    #[must_use]
    pub fn with_lock(capacity: usize, lock: L) -> Self {
        Self {
            capacity,
            lock,
            not_full: Condition::new(),
            not_empty: Condition::new(),
            is_empty: Condition::new(),
            canceled: AtomicBool::new(false),
            inner: UnsafeCell::new(Inner {
                items: VecDeque::new(),
                waiting_consumers: 0,
            }),
        }
    }

    /// Maximum number of values the queue holds.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn can_add(&self, inner: &Inner<T>) -> bool {
        inner.items.len() < self.capacity
            || (self.capacity == 0 && inner.items.len() < inner.waiting_consumers)
    }

    /// Appends `item`, parking while the queue is full.
    pub fn add(&self, item: T) -> SyncResult<()> {
        let _guard = Guard::new(&self.lock)?;
        loop {
            if self.canceled.load(Ordering::Acquire) {
                return Err(SyncError::canceled());
            }
            // SAFETY: the serializing lock is held at every check.
            if self.can_add(unsafe { &*self.inner.get() }) {
                break;
            }
            self.not_full.wait(&self.lock)?;
        }
        // SAFETY: the serializing lock is held.
        unsafe { &mut *self.inner.get() }.items.push_back(item);
        self.not_empty.signal();
        Ok(())
    }

    /// Timed [`BoundedQueue::add`]; `Ok(false)` when no slot frees up
    /// before the deadline.
    pub fn try_add(&self, item: T, timeout: Duration) -> SyncResult<bool> {
        let deadline = Deadline::after(Some(timeout));
        let guard = match Guard::timed(&self.lock, timeout) {
            Ok(guard) => guard,
            Err(err) if err.is_timeout() => return Ok(false),
            Err(err) => return Err(err),
        };
        loop {
            if self.canceled.load(Ordering::Acquire) {
                return Err(SyncError::canceled());
            }
            // SAFETY: the serializing lock is held at every check.
            if self.can_add(unsafe { &*self.inner.get() }) {
                break;
            }
            let remaining = deadline.remaining().unwrap_or(Duration::ZERO);
            if !self.not_full.wait_timeout(&self.lock, remaining)? {
                return Ok(false);
            }
        }
        // SAFETY: the serializing lock is held.
        unsafe { &mut *self.inner.get() }.items.push_back(item);
        self.not_empty.signal();
        drop(guard);
        Ok(true)
    }

    /// Removes and returns the oldest value, parking while the queue is
    /// empty.
    pub fn next(&self) -> SyncResult<T> {
        let _guard = Guard::new(&self.lock)?;
        self.commit_consumer();
        let result = loop {
            // SAFETY: the serializing lock is held at every check.
            if !unsafe { &*self.inner.get() }.items.is_empty() {
                break Ok(());
            }
            if self.canceled.load(Ordering::Acquire) {
                break Err(SyncError::canceled());
            }
            if let Err(err) = self.not_empty.wait(&self.lock) {
                break Err(err);
            }
        };
        self.retire_consumer();
        result?;
        self.pop_and_wake()
    }

    /// Timed [`BoundedQueue::next`]; a timeout error when no value arrives
    /// before the deadline.
    pub fn try_next(&self, timeout: Duration) -> SyncResult<T> {
        let deadline = Deadline::after(Some(timeout));
        let _guard = Guard::timed(&self.lock, timeout)?;
        self.commit_consumer();
        let result = loop {
            // SAFETY: the serializing lock is held at every check.
            if !unsafe { &*self.inner.get() }.items.is_empty() {
                break Ok(());
            }
            if self.canceled.load(Ordering::Acquire) {
                break Err(SyncError::canceled());
            }
            let remaining = deadline.remaining().unwrap_or(Duration::ZERO);
            match self.not_empty.wait_timeout(&self.lock, remaining) {
                Ok(true) => {}
                Ok(false) => break Err(SyncError::timeout()),
                Err(err) => break Err(err),
            }
        };
        self.retire_consumer();
        result?;
        self.pop_and_wake()
    }

    /// At capacity zero a committed consumer entitles one producer to hand
    /// a value through; announce ourselves before waiting.
    fn commit_consumer(&self) {
        if self.capacity == 0 {
            // SAFETY: the serializing lock is held.
            unsafe { &mut *self.inner.get() }.waiting_consumers += 1;
            self.not_full.signal();
        }
    }

    fn retire_consumer(&self) {
        if self.capacity == 0 {
            // SAFETY: the serializing lock is held.
            unsafe { &mut *self.inner.get() }.waiting_consumers -= 1;
        }
    }

    fn pop_and_wake(&self) -> SyncResult<T> {
        // SAFETY: the serializing lock is held.
        let inner = unsafe { &mut *self.inner.get() };
        let item = match inner.items.pop_front() {
            Some(item) => item,
            None => return Err(SyncError::canceled()),
        };
        let drained = inner.items.is_empty();
        self.not_full.signal();
        if drained {
            self.is_empty.broadcast();
        }
        Ok(item)
    }

    /// Number of queued values.
    pub fn size(&self) -> SyncResult<usize> {
        let _guard = Guard::new(&self.lock)?;
        // SAFETY: the serializing lock is held.
        Ok(unsafe { &*self.inner.get() }.items.len())
    }

    /// Blocks until the queue is empty.
    pub fn wait_empty(&self) -> SyncResult<()> {
        let _guard = Guard::new(&self.lock)?;
        // SAFETY: the serializing lock is held at every check.
        while !unsafe { &*self.inner.get() }.items.is_empty() {
            self.is_empty.wait(&self.lock)?;
        }
        Ok(())
    }

    /// Timed [`BoundedQueue::wait_empty`]; `Ok(false)` when the queue still
    /// holds values at the deadline.
    pub fn wait_empty_timeout(&self, timeout: Duration) -> SyncResult<bool> {
        let deadline = Deadline::after(Some(timeout));
        let _guard = Guard::timed(&self.lock, timeout)?;
        loop {
            // SAFETY: the serializing lock is held at every check.
            if unsafe { &*self.inner.get() }.items.is_empty() {
                return Ok(true);
            }
            let remaining = deadline.remaining().unwrap_or(Duration::ZERO);
            if !self.is_empty.wait_timeout(&self.lock, remaining)? && deadline.expired() {
                return Ok(false);
            }
        }
    }
}

impl<T, L: Lockable> Cancelable for BoundedQueue<T, L> {
    fn cancel(&self) -> SyncResult<()> {
        let _guard = Guard::new(&self.lock)?;
        self.canceled.store(true, Ordering::Release);
        tracing::debug!("bounded queue canceled");
        // Every blocked party wakes: consumers, producers, empty-waiters.
        self.not_empty.broadcast();
        self.not_full.broadcast();
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

impl<T, L: Lockable> Waitable for BoundedQueue<T, L> {
    fn wait(&self) -> SyncResult<()> {
        self.wait_empty()
    }

    fn wait_timeout(&self, timeout: Duration) -> SyncResult<bool> {
        self.wait_empty_timeout(timeout)
    }
}

impl<T, L: Lockable> Lockable for BoundedQueue<T, L> {
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
