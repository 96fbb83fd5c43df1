//! Participating-thread identity and the ambient registry.
//!
//! Any OS thread becomes a participant the first time it touches a blocking
//! primitive: [`ThreadHandle::current`] lazily registers the calling thread
//! and hands back a cheaply clonable handle carrying its [`Monitor`] and
//! scheduling priority. Handles are what waiter lists store, and what
//! release-side donor loops walk.

use crate::thread::Monitor;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::Arc;

/// Process-wide id source for participant threads.
static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
struct ThreadCore {
    id: u64,
    priority: AtomicI32,
    monitor: Monitor,
}

/// Opaque identity for a participating thread.
///
/// Cloning is cheap (shared inner). Two handles compare equal iff they name
/// the same thread. The handle stays valid after its thread exits, but its
/// monitor will never be waited on again.
#[derive(Debug, Clone)]
pub struct ThreadHandle {
    core: Arc<ThreadCore>,
}

thread_local! {
    static CURRENT: ThreadHandle = ThreadHandle::register();
}

impl ThreadHandle {
    fn register() -> Self {
        let id = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(thread_id = id, "thread registered");
        Self {
            core: Arc::new(ThreadCore {
                id,
                priority: AtomicI32::new(0),
                monitor: Monitor::new(),
            }),
        }
    }

    /// Returns the handle for the calling thread, registering it on first
    /// use.
    #[must_use]
    pub fn current() -> Self {
        CURRENT.with(Clone::clone)
    }

    /// Stable id of this thread within the process.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.core.id
    }

    /// The thread's monitor.
    #[must_use]
    pub fn monitor(&self) -> &Monitor {
        &self.core.monitor
    }

    /// Scheduling priority; higher is more urgent. Defaults to 0.
    #[must_use]
    pub fn priority(&self) -> i32 {
        self.core.priority.load(Ordering::Relaxed)
    }

    /// Sets the scheduling priority used by priority-ordered waiter lists.
    ///
    /// The priority is sampled when the thread enters a waiter list; raising
    /// it does not reorder waits already in progress.
    pub fn set_priority(&self, priority: i32) {
        self.core.priority.store(priority, Ordering::Relaxed);
    }

    /// Raises this thread's interrupt flag.
    ///
    /// A wait in progress on the thread's monitor is woken and reports
    /// `Interrupted`; otherwise the next wait does. Returns `true` when a
    /// parked wait was woken.
    pub fn interrupt(&self) -> bool {
        let mut guard = self.core.monitor.lock();
        guard.interrupt()
    }

    /// Marks the thread canceled; every later monitor wait reports
    /// `Canceled`.
    pub fn cancel(&self) -> bool {
        let mut guard = self.core.monitor.lock();
        guard.cancel()
    }
}

impl PartialEq for ThreadHandle {
    fn eq(&self, other: &Self) -> bool {
        self.core.id == other.core.id
    }
}

impl Eq for ThreadHandle {}

impl std::hash::Hash for ThreadHandle {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.core.id.hash(state);
    }
}

/// Yields the processor to another runnable thread.
///
/// Used by spin paths and the notify-donor backoff.
pub fn yield_now() {
    std::thread::yield_now();
}
