//! Unbounded producer/consumer queue with blocking consumers.
//!
//! `add` never blocks on capacity; `next` parks until a value arrives or
//! the queue is canceled. Values are delivered in insertion order.

#![allow(unsafe_code)]

use crate::error::{SyncError, SyncResult};
use crate::sync::lockable::Deadline;
use crate::sync::{Cancelable, Condition, Guard, Lockable, Mutex};
use std::cell::UnsafeCell;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Unbounded FIFO queue whose consumers block while it is empty.
///
/// `L` is the serializing lock; the default [`Mutex`] makes every blocking
/// entry point interruptible.
#[derive(Debug)]
pub struct BlockingQueue<T, L: Lockable = Mutex> {
    lock: L,
    not_empty: Condition,
    canceled: AtomicBool,
    items: UnsafeCell<VecDeque<T>>,
}

// SAFETY: `items` is only touched while `lock` is held.
unsafe impl<T: Send, L: Lockable + Send> Send for BlockingQueue<T, L> {}
// SAFETY: as above; all shared access is serialized through `lock`.
unsafe impl<T: Send, L: Lockable + Send + Sync> Sync for BlockingQueue<T, L> {}

impl<T> BlockingQueue<T, Mutex> {
    /// Creates an empty queue over the default interruptible lock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_lock(Mutex::new())
    }
}

impl<T> Default for BlockingQueue<T, Mutex> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, L: Lockable> BlockingQueue<T, L> {
    /// Creates an empty queue serialized by `lock`.
    #[must_use]
    pub fn with_lock(lock: L) -> Self {
        Self {
            lock,
            not_empty: Condition::new(),
            canceled: AtomicBool::new(false),
            items: UnsafeCell::new(VecDeque::new()),
        }
    }

    /// Appends `item`, waking one blocked consumer.
    ///
    /// Fails with a canceled error once the queue is canceled.
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

    /// Timed [`BlockingQueue::add`]; `Ok(false)` when the serializing lock
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
    ///
    /// Fails with a canceled error when the queue is canceled and drained.
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
        // SAFETY: the serializing lock is held.
        match unsafe { &mut *self.items.get() }.pop_front() {
            Some(item) => Ok(item),
            None => Err(SyncError::canceled()),
        }
    }

    /// Timed [`BlockingQueue::next`]; a timeout error when no value arrives
    /// before the deadline.
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
        // SAFETY: the serializing lock is held.
        match unsafe { &mut *self.items.get() }.pop_front() {
            Some(item) => Ok(item),
            None => Err(SyncError::canceled()),
        }
    }

    /// Number of queued values.
    pub fn size(&self) -> SyncResult<usize> {
        let _guard = Guard::new(&self.lock)?;
        // SAFETY: the serializing lock is held.
        Ok(unsafe { &*self.items.get() }.len())
    }
}

impl<T, L: Lockable> Cancelable for BlockingQueue<T, L> {
    fn cancel(&self) -> SyncResult<()> {
        let _guard = Guard::new(&self.lock)?;
        self.canceled.store(true, Ordering::Release);
        tracing::debug!("blocking queue canceled");
        self.not_empty.broadcast();
        Ok(())
    }

    fn is_canceled(&self) -> bool {
        // The flag never reverts, so a set flag needs no lock to confirm.
        if self.canceled.load(Ordering::Acquire) {
            return true;
        }
        let Ok(_guard) = Guard::new(&self.lock) else {
            return false;
        };
        self.canceled.load(Ordering::Acquire)
    }
}

impl<T, L: Lockable> Lockable for BlockingQueue<T, L> {
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn init_test(name: &str) {
        crate::test_logging::test_utils::init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn delivers_in_insertion_order() {
        init_test("delivers_in_insertion_order");
        let queue = BlockingQueue::new();
        for value in 1..=3 {
            queue.add(value).expect("add");
        }
        for expected in 1..=3 {
            let got = queue.next().expect("next");
            crate::assert_with_log!(got == expected, "fifo order", expected, got);
        }
        crate::test_complete!("delivers_in_insertion_order");
    }

    #[test]
    fn next_blocks_until_a_value_arrives() {
        init_test("next_blocks_until_a_value_arrives");
        let queue = Arc::new(BlockingQueue::new());
        let remote = Arc::clone(&queue);
        let consumer = std::thread::spawn(move || remote.next());

        std::thread::sleep(Duration::from_millis(30));
        queue.add(7).expect("add");
        let got = consumer
            .join()
            .expect("consumer thread panicked")
            .expect("next");
        crate::assert_with_log!(got == 7, "delivered value", 7, got);
        crate::test_complete!("next_blocks_until_a_value_arrives");
    }

    #[test]
    fn timed_next_expires_on_an_empty_queue() {
        init_test("timed_next_expires_on_an_empty_queue");
        let queue: BlockingQueue<u32> = BlockingQueue::new();
        let err = queue
            .try_next(Duration::from_millis(20))
            .expect_err("empty queue must time out");
        crate::assert_with_log!(err.is_timeout(), "timeout kind", true, err.is_timeout());
        crate::test_complete!("timed_next_expires_on_an_empty_queue");
    }

    #[test]
    fn cancel_rejects_producers_and_drains_consumers() {
        init_test("cancel_rejects_producers_and_drains_consumers");
        let queue: BlockingQueue<u32> = BlockingQueue::new();
        queue.add(1).expect("add before cancel");
        queue.cancel().expect("cancel");

        let err = queue.add(2).expect_err("add after cancel");
        crate::assert_with_log!(err.is_canceled(), "producer rejected", true, err.is_canceled());

        // Values already queued still drain, then consumers see canceled.
        let got = queue.next().expect("drain");
        crate::assert_with_log!(got == 1, "drained value", 1, got);
        let err = queue.next().expect_err("drained queue is canceled");
        crate::assert_with_log!(err.is_canceled(), "consumer rejected", true, err.is_canceled());
        crate::test_complete!("cancel_rejects_producers_and_drains_consumers");
    }

    #[test]
    fn cancel_is_idempotent() {
        init_test("cancel_is_idempotent");
        let queue: BlockingQueue<u32> = BlockingQueue::new();
        queue.cancel().expect("first cancel");
        queue.cancel().expect("second cancel");
        crate::assert_with_log!(
            queue.is_canceled(),
            "still canceled",
            true,
            queue.is_canceled()
        );
        crate::test_complete!("cancel_is_idempotent");
    }
}
