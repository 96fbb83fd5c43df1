//! Synchronization primitives built on the per-thread monitor.
//!
//! The dependency order inside this module, leaves first:
//!
//! - [`FastLock`]: spin lock serializing primitive-internal state
//! - [`FastMutex`]: plain OS mutex behind the [`Lockable`] contract
//! - [`Guard`] and the scope policies: scoped acquisition, including the
//!   inverted (release-around-wait) scope
//! - waiter lists ([`FifoList`], [`PriorityList`]): who wakes first
//! - the semaphore engine and its public faces ([`Semaphore`],
//!   [`CountingSemaphore`], [`PrioritySemaphore`])
//! - [`Condition`]: monitor-backed condition variable over an external lock
//! - [`Mutex`]: interruptible FIFO mutex
//! - read/write locks ([`BiasedRwLock`], [`FairRwLock`])
//! - [`AtomicCount`], [`CountedPtr`], [`ClassLockable`]: shared-ownership
//!   substrate

mod condition;
mod fast_lock;
mod fast_mutex;
pub mod guard;
pub(crate) mod lockable;
mod mutex;
mod rwlock;
mod semaphore;
mod shared;
pub mod waiters;

pub use condition::Condition;
pub use fast_lock::FastLock;
pub use fast_mutex::FastMutex;
pub use guard::{
    CompoundScope, Guard, LockedScope, OverlappedScope, ScopePolicy, TimedLockedScope,
    UnlockedScope,
};
pub use lockable::{Cancelable, Lockable, Waitable};
pub use mutex::Mutex;
pub use rwlock::{
    BiasedReadLock, BiasedRwLock, BiasedWriteLock, FairReadLock, FairRwLock, FairWriteLock,
};
pub use semaphore::{CountingSemaphore, PrioritySemaphore, Semaphore};
pub use shared::{AtomicCount, ClassLockable, CountedPtr};
pub use waiters::{FifoList, PriorityList, WaiterList};
