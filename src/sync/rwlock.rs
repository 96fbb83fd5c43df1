//! Read/write locks with two fairness policies.
//!
//! Both locks expose a pair of [`Lockable`] halves via `read_lock()` /
//! `write_lock()`; a thread holding the read half must not acquire the
//! write half (no upgrade path).
//!
//! - [`BiasedRwLock`] prefers writers: a releasing thread wakes a waiting
//!   writer before any waiting reader, so writers may starve readers by
//!   design.
//! - [`FairRwLock`] grants both kinds of access in arrival order. Fairness
//!   falls out of the serializing [`Mutex`]: writers hold it for the whole
//!   critical section, readers only long enough to bump a count, and the
//!   FIFO handoff of the mutex orders everyone.
//!
//! Timed attempts track a real deadline and report `Ok(false)` once it
//! elapses.

#![allow(unsafe_code)]

use crate::error::SyncResult;
use crate::sync::lockable::Deadline;
use crate::sync::{Condition, FastMutex, Guard, Lockable, Mutex};
use std::cell::UnsafeCell;
use std::time::Duration;

// ============================================================================
// BiasedRwLock
// ============================================================================

#[derive(Debug, Default)]
struct BiasedCounts {
    active_readers: usize,
    active_writers: usize,
    waiting_readers: usize,
    waiting_writers: usize,
}

/// Writer-biased read/write lock.
///
/// Readers enter while no writer is active; writers wait for exclusive
/// access and are preferred at every release.
#[derive(Debug)]
pub struct BiasedRwLock {
    lock: FastMutex,
    read_cond: Condition,
    write_cond: Condition,
    counts: UnsafeCell<BiasedCounts>,
}

// SAFETY: `counts` is only touched while `lock` is held.
unsafe impl Send for BiasedRwLock {}
// SAFETY: as above; all shared access is serialized through `lock`.
unsafe impl Sync for BiasedRwLock {}

impl BiasedRwLock {
    /// Creates an uncontended lock.
    #[must_use]
    pub fn new() -> Self {
        Self {
            lock: FastMutex::new(),
            read_cond: Condition::new(),
            write_cond: Condition::new(),
            counts: UnsafeCell::new(BiasedCounts::default()),
        }
    }

    /// The shared-access half.
    #[must_use]
    pub fn read_lock(&self) -> BiasedReadLock<'_> {
        BiasedReadLock { rwlock: self }
    }

    /// The exclusive-access half.
    #[must_use]
    pub fn write_lock(&self) -> BiasedWriteLock<'_> {
        BiasedWriteLock { rwlock: self }
    }

    /// SAFETY: callers must hold `self.lock`.
    #[allow(clippy::mut_from_ref)]
    unsafe fn counts(&self) -> &mut BiasedCounts {
        &mut *self.counts.get()
    }

    fn allow_reader(counts: &BiasedCounts) -> bool {
        counts.active_writers == 0
    }

    fn allow_writer(counts: &BiasedCounts) -> bool {
        counts.active_writers == 0 && counts.active_readers == 0
    }

    fn before_read(&self) -> SyncResult<()> {
        let _guard = Guard::new(&self.lock)?;
        // Each counts borrow is transient: the condition wait below drops
        // `lock`, and other threads mutate the counters while we sleep.
        // SAFETY: `lock` is held.
        unsafe { self.counts() }.waiting_readers += 1;
        // SAFETY: `lock` is held at every check.
        while !Self::allow_reader(unsafe { self.counts() }) {
            if let Err(err) = self.read_cond.wait(&self.lock) {
                // SAFETY: the condition wait re-acquired `lock`.
                unsafe { self.counts() }.waiting_readers -= 1;
                return Err(err);
            }
        }
        // SAFETY: `lock` is held.
        let counts = unsafe { self.counts() };
        counts.waiting_readers -= 1;
        counts.active_readers += 1;
        Ok(())
    }

    fn before_read_attempt(&self, timeout: Duration) -> SyncResult<bool> {
        let deadline = Deadline::after(Some(timeout));
        let _guard = Guard::new(&self.lock)?;
        // SAFETY: `lock` is held.
        unsafe { self.counts() }.waiting_readers += 1;
        // SAFETY: `lock` is held at every check.
        while !Self::allow_reader(unsafe { self.counts() }) {
            let remaining = deadline.remaining().unwrap_or(Duration::ZERO);
            match self.read_cond.wait_timeout(&self.lock, remaining) {
                Ok(_) if !deadline.expired() => {}
                Ok(_) => {
                    // SAFETY: the condition wait re-acquired `lock`.
                    unsafe { self.counts() }.waiting_readers -= 1;
                    return Ok(false);
                }
                Err(err) => {
                    // SAFETY: the condition wait re-acquired `lock`.
                    unsafe { self.counts() }.waiting_readers -= 1;
                    return Err(err);
                }
            }
        }
        // SAFETY: `lock` is held.
        let counts = unsafe { self.counts() };
        counts.waiting_readers -= 1;
        counts.active_readers += 1;
        Ok(true)
    }

    fn after_read(&self) -> SyncResult<()> {
        let (wake_reader, wake_writer) = {
            let _guard = Guard::new(&self.lock)?;
            // SAFETY: `lock` is held.
            let counts = unsafe { self.counts() };
            counts.active_readers -= 1;
            (counts.waiting_readers > 0, counts.waiting_writers > 0)
        };
        // Bias: a waiting writer is always preferred over waiting readers.
        if wake_writer {
            self.write_cond.signal();
        } else if wake_reader {
            self.read_cond.signal();
        }
        Ok(())
    }

    fn before_write(&self) -> SyncResult<()> {
        let _guard = Guard::new(&self.lock)?;
        // SAFETY: `lock` is held.
        unsafe { self.counts() }.waiting_writers += 1;
        // SAFETY: `lock` is held at every check.
        while !Self::allow_writer(unsafe { self.counts() }) {
            if let Err(err) = self.write_cond.wait(&self.lock) {
                // SAFETY: the condition wait re-acquired `lock`.
                unsafe { self.counts() }.waiting_writers -= 1;
                return Err(err);
            }
        }
        // SAFETY: `lock` is held.
        let counts = unsafe { self.counts() };
        counts.waiting_writers -= 1;
        counts.active_writers += 1;
        Ok(())
    }

    fn before_write_attempt(&self, timeout: Duration) -> SyncResult<bool> {
        let deadline = Deadline::after(Some(timeout));
        let _guard = Guard::new(&self.lock)?;
        // SAFETY: `lock` is held.
        unsafe { self.counts() }.waiting_writers += 1;
        // SAFETY: `lock` is held at every check.
        while !Self::allow_writer(unsafe { self.counts() }) {
            let remaining = deadline.remaining().unwrap_or(Duration::ZERO);
            match self.write_cond.wait_timeout(&self.lock, remaining) {
                Ok(_) if !deadline.expired() => {}
                Ok(_) => {
                    // SAFETY: the condition wait re-acquired `lock`.
                    unsafe { self.counts() }.waiting_writers -= 1;
                    return Ok(false);
                }
                Err(err) => {
                    // SAFETY: the condition wait re-acquired `lock`.
                    unsafe { self.counts() }.waiting_writers -= 1;
                    return Err(err);
                }
            }
        }
        // SAFETY: `lock` is held.
        let counts = unsafe { self.counts() };
        counts.waiting_writers -= 1;
        counts.active_writers += 1;
        Ok(true)
    }

    fn after_write(&self) -> SyncResult<()> {
        let (wake_reader, wake_writer) = {
            let _guard = Guard::new(&self.lock)?;
            // SAFETY: `lock` is held.
            let counts = unsafe { self.counts() };
            counts.active_writers -= 1;
            (counts.waiting_readers > 0, counts.waiting_writers > 0)
        };
        if wake_writer {
            self.write_cond.signal();
        } else if wake_reader {
            self.read_cond.signal();
        }
        Ok(())
    }
}

impl Default for BiasedRwLock {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared half of a [`BiasedRwLock`].
#[derive(Debug, Clone, Copy)]
pub struct BiasedReadLock<'a> {
    rwlock: &'a BiasedRwLock,
}

impl Lockable for BiasedReadLock<'_> {
    fn acquire(&self) -> SyncResult<()> {
        self.rwlock.before_read()
    }

    fn try_acquire(&self, timeout: Duration) -> SyncResult<bool> {
        self.rwlock.before_read_attempt(timeout)
    }

    fn release(&self) -> SyncResult<()> {
        self.rwlock.after_read()
    }
}

/// Exclusive half of a [`BiasedRwLock`].
#[derive(Debug, Clone, Copy)]
pub struct BiasedWriteLock<'a> {
    rwlock: &'a BiasedRwLock,
}

impl Lockable for BiasedWriteLock<'_> {
    fn acquire(&self) -> SyncResult<()> {
        self.rwlock.before_write()
    }

    fn try_acquire(&self, timeout: Duration) -> SyncResult<bool> {
        self.rwlock.before_write_attempt(timeout)
    }

    fn release(&self) -> SyncResult<()> {
        self.rwlock.after_write()
    }
}

// ============================================================================
// FairRwLock
// ============================================================================

/// FIFO-fair read/write lock.
///
/// All entry goes through one interruptible [`Mutex`]: writers keep it for
/// their whole critical section, readers take it just long enough to bump
/// the reader count. Arrival order among readers and writers is whatever
/// order the mutex hands out, which is FIFO.
#[derive(Debug)]
pub struct FairRwLock {
    lock: Mutex,
    cond: Condition,
    readers: UnsafeCell<usize>,
}

// SAFETY: `readers` is only touched while `lock` is held.
unsafe impl Send for FairRwLock {}
// SAFETY: as above; all shared access is serialized through `lock`.
unsafe impl Sync for FairRwLock {}

impl FairRwLock {
    /// Creates an uncontended lock.
    #[must_use]
    pub fn new() -> Self {
        Self {
            lock: Mutex::new(),
            cond: Condition::new(),
            readers: UnsafeCell::new(0),
        }
    }

    /// The shared-access half.
    #[must_use]
    pub fn read_lock(&self) -> FairReadLock<'_> {
        FairReadLock { rwlock: self }
    }

    /// The exclusive-access half.
    #[must_use]
    pub fn write_lock(&self) -> FairWriteLock<'_> {
        FairWriteLock { rwlock: self }
    }

    /// SAFETY: callers must hold `self.lock`.
    #[allow(clippy::mut_from_ref)]
    unsafe fn readers(&self) -> &mut usize {
        &mut *self.readers.get()
    }
}

impl Default for FairRwLock {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared half of a [`FairRwLock`].
#[derive(Debug, Clone, Copy)]
pub struct FairReadLock<'a> {
    rwlock: &'a FairRwLock,
}

impl Lockable for FairReadLock<'_> {
    fn acquire(&self) -> SyncResult<()> {
        let _guard = Guard::new(&self.rwlock.lock)?;
        // SAFETY: the serializing mutex is held.
        unsafe {
            *self.rwlock.readers() += 1;
        }
        Ok(())
    }

    fn try_acquire(&self, timeout: Duration) -> SyncResult<bool> {
        if !self.rwlock.lock.try_acquire(timeout)? {
            return Ok(false);
        }
        // SAFETY: the serializing mutex is held.
        unsafe {
            *self.rwlock.readers() += 1;
        }
        self.rwlock.lock.release()?;
        Ok(true)
    }

    fn release(&self) -> SyncResult<()> {
        let _guard = Guard::new(&self.rwlock.lock)?;
        // SAFETY: the serializing mutex is held.
        let remaining = unsafe {
            let readers = self.rwlock.readers();
            *readers -= 1;
            *readers
        };
        if remaining == 0 {
            // The last reader lets the next queued writer through.
            self.rwlock.cond.signal();
        }
        Ok(())
    }
}

/// Exclusive half of a [`FairRwLock`].
#[derive(Debug, Clone, Copy)]
pub struct FairWriteLock<'a> {
    rwlock: &'a FairRwLock,
}

impl Lockable for FairWriteLock<'_> {
    fn acquire(&self) -> SyncResult<()> {
        self.rwlock.lock.acquire()?;
        // SAFETY: the serializing mutex is held.
        while unsafe { *self.rwlock.readers() } > 0 {
            if let Err(err) = self.rwlock.cond.wait(&self.rwlock.lock) {
                let _ = self.rwlock.lock.release();
                return Err(err);
            }
        }
        // The mutex stays held for the whole write critical section.
        Ok(())
    }

    fn try_acquire(&self, timeout: Duration) -> SyncResult<bool> {
        let deadline = Deadline::after(Some(timeout));
        if !self.rwlock.lock.try_acquire(timeout)? {
            return Ok(false);
        }
        // SAFETY: the serializing mutex is held.
        while unsafe { *self.rwlock.readers() } > 0 {
            let remaining = deadline.remaining().unwrap_or(Duration::ZERO);
            match self.rwlock.cond.wait_timeout(&self.rwlock.lock, remaining) {
                Ok(_) if !deadline.expired() => {}
                Ok(_) => {
                    let _ = self.rwlock.lock.release();
                    return Ok(false);
                }
                Err(err) => {
                    let _ = self.rwlock.lock.release();
                    return Err(err);
                }
            }
        }
        Ok(true)
    }

    fn release(&self) -> SyncResult<()> {
        self.rwlock.lock.release()
    }
}
