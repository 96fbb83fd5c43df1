//! Scoped protection with composable entry/exit policies.
//!
//! A [`Guard`] binds a [`Lockable`] to a [`ScopePolicy`] deciding what
//! happens at scope entry and exit:
//!
//! - [`LockedScope`] (default): acquire on entry, release on exit
//! - [`UnlockedScope`]: the inverse, release on entry and re-acquire on exit;
//!   this is how every blocking primitive drops its serializing lock across
//!   a monitor wait
//! - [`TimedLockedScope`]: timed acquire on entry, `Timeout` error on
//!   contention
//! - [`CompoundScope`]: two policies applied in sequence on entry, reverse
//!   order on exit; a timed entry that fails halfway undoes the first half
//! - [`OverlappedScope`]: built by [`Guard::transfer_from`], taking over a
//!   protection scope from an older guard and disabling the older guard's
//!   exit action
//!
//! Guards are non-copyable and swallow secondary failures on drop.
//!
//! # Example
//!
//! ```ignore
//! let _guard = Guard::new(&semaphore_lock)?;
//! // state mutations...
//! {
//!     let _outside = Guard::<_, UnlockedScope>::inverted(&semaphore_lock);
//!     // lock released here while the thread parks
//! }
//! // lock re-held
//! ```

use crate::error::{SyncError, SyncResult};
use crate::sync::Lockable;
use std::marker::PhantomData;
use std::time::Duration;

/// Behavior invoked when a protection scope is created and destroyed.
pub trait ScopePolicy<L: Lockable + ?Sized> {
    /// Creates the scope.
    fn enter(lock: &L) -> SyncResult<()>;

    /// Creates the scope with a deadline; `Timeout` error when it cannot be
    /// created in time.
    fn enter_timed(lock: &L, timeout: Duration) -> SyncResult<()>;

    /// Destroys the scope.
    fn exit(lock: &L) -> SyncResult<()>;
}

/// Acquire on entry, release on exit.
#[derive(Debug)]
pub struct LockedScope;

impl<L: Lockable + ?Sized> ScopePolicy<L> for LockedScope {
    fn enter(lock: &L) -> SyncResult<()> {
        lock.acquire()
    }

    fn enter_timed(lock: &L, timeout: Duration) -> SyncResult<()> {
        if lock.try_acquire(timeout)? {
            Ok(())
        } else {
            Err(SyncError::timeout())
        }
    }

    fn exit(lock: &L) -> SyncResult<()> {
        lock.release()
    }
}

/// Release on entry, re-acquire on exit.
///
/// The inversion used to relinquish a serializing lock across a wait.
#[derive(Debug)]
pub struct UnlockedScope;

impl<L: Lockable + ?Sized> ScopePolicy<L> for UnlockedScope {
    fn enter(lock: &L) -> SyncResult<()> {
        lock.release()
    }

    fn enter_timed(lock: &L, _timeout: Duration) -> SyncResult<()> {
        lock.release()
    }

    fn exit(lock: &L) -> SyncResult<()> {
        lock.acquire()
    }
}

/// Timed acquire on entry with a compile-time millisecond budget.
#[derive(Debug)]
pub struct TimedLockedScope<const TIMEOUT_MS: u64>;

impl<L: Lockable + ?Sized, const TIMEOUT_MS: u64> ScopePolicy<L>
    for TimedLockedScope<TIMEOUT_MS>
{
    fn enter(lock: &L) -> SyncResult<()> {
        if lock.try_acquire(Duration::from_millis(TIMEOUT_MS))? {
            Ok(())
        } else {
            Err(SyncError::timeout())
        }
    }

    fn enter_timed(lock: &L, timeout: Duration) -> SyncResult<()> {
        if lock.try_acquire(timeout)? {
            Ok(())
        } else {
            Err(SyncError::timeout())
        }
    }

    fn exit(lock: &L) -> SyncResult<()> {
        lock.release()
    }
}

/// Two policies applied in sequence on entry, reverse order on exit.
#[derive(Debug)]
pub struct CompoundScope<A, B> {
    _policies: PhantomData<(A, B)>,
}

impl<L, A, B> ScopePolicy<L> for CompoundScope<A, B>
where
    L: Lockable + ?Sized,
    A: ScopePolicy<L>,
    B: ScopePolicy<L>,
{
    fn enter(lock: &L) -> SyncResult<()> {
        A::enter(lock)?;
        B::enter(lock)
    }

    fn enter_timed(lock: &L, timeout: Duration) -> SyncResult<()> {
        A::enter_timed(lock, timeout)?;
        if let Err(err) = B::enter_timed(lock, timeout) {
            // Partial failure: the first half must be undone before the
            // error surfaces.
            let _ = A::exit(lock);
            return Err(err);
        }
        Ok(())
    }

    fn exit(lock: &L) -> SyncResult<()> {
        let second = B::exit(lock);
        let first = A::exit(lock);
        second.and(first)
    }
}

/// Exit-only policy installed by [`Guard::transfer_from`].
#[derive(Debug)]
pub struct OverlappedScope;

impl<L: Lockable + ?Sized> ScopePolicy<L> for OverlappedScope {
    fn enter(lock: &L) -> SyncResult<()> {
        lock.acquire()
    }

    fn enter_timed(lock: &L, timeout: Duration) -> SyncResult<()> {
        if lock.try_acquire(timeout)? {
            Ok(())
        } else {
            Err(SyncError::timeout())
        }
    }

    fn exit(lock: &L) -> SyncResult<()> {
        lock.release()
    }
}

/// Scoped protection over a [`Lockable`].
///
/// The policy's exit action runs on drop unless the guard has been
/// [disabled](Guard::disable); failures in the exit action are discarded
/// (drop must not propagate).
#[derive(Debug)]
pub struct Guard<'a, L: Lockable + ?Sized, P: ScopePolicy<L> = LockedScope> {
    lock: &'a L,
    enabled: bool,
    _policy: PhantomData<P>,
}

impl<'a, L: Lockable + ?Sized, P: ScopePolicy<L>> Guard<'a, L, P> {
    /// Creates a guard by running the policy's entry action.
    pub fn with_policy(lock: &'a L) -> SyncResult<Self> {
        P::enter(lock)?;
        Ok(Self {
            lock,
            enabled: true,
            _policy: PhantomData,
        })
    }

    /// Creates a guard with a deadline on the entry action.
    ///
    /// Fails with a `Timeout` error when the scope cannot be created in
    /// time.
    pub fn with_policy_timed(lock: &'a L, timeout: Duration) -> SyncResult<Self> {
        P::enter_timed(lock, timeout)?;
        Ok(Self {
            lock,
            enabled: true,
            _policy: PhantomData,
        })
    }

    /// Disables the exit action; the protection scope outlives this guard.
    pub fn disable(&mut self) {
        self.enabled = false;
    }

    /// True if the exit action has been disabled.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        !self.enabled
    }

    /// The lock this guard protects.
    #[must_use]
    pub fn lock_ref(&self) -> &'a L {
        self.lock
    }
}

impl<'a, L: Lockable + ?Sized> Guard<'a, L, LockedScope> {
    /// Acquires `lock` for the lifetime of the guard.
    pub fn new(lock: &'a L) -> SyncResult<Self> {
        Self::with_policy(lock)
    }

    /// Acquires `lock` within `timeout`; `Timeout` error on contention.
    pub fn timed(lock: &'a L, timeout: Duration) -> SyncResult<Self> {
        Self::with_policy_timed(lock, timeout)
    }
}

impl<'a, L: Lockable + ?Sized> Guard<'a, L, UnlockedScope> {
    /// Inverts an already-held protection scope: releases `lock` now and
    /// re-acquires it when the guard drops.
    ///
    /// Precondition: the calling thread holds `lock`.
    #[must_use]
    pub fn inverted(lock: &'a L) -> Self {
        // Releasing a held lock cannot fail in any implementation here;
        // a failure would leave nothing sensible to do this early anyway.
        let _ = lock.release();
        Self {
            lock,
            enabled: true,
            _policy: PhantomData,
        }
    }
}

impl<'a, L: Lockable + ?Sized> Guard<'a, L, OverlappedScope> {
    /// Transfers a protection scope from `older` to a new guard on `lock`:
    /// acquires `lock`, then releases and disables `older`.
    pub fn transfer_from<L2, P2>(
        older: &mut Guard<'_, L2, P2>,
        lock: &'a L,
    ) -> SyncResult<Self>
    where
        L2: Lockable + ?Sized,
        P2: ScopePolicy<L2>,
    {
        lock.acquire()?;
        let released = older.lock_ref().release();
        older.disable();
        released?;
        Ok(Self {
            lock,
            enabled: true,
            _policy: PhantomData,
        })
    }
}

impl<L: Lockable + ?Sized, P: ScopePolicy<L>> Drop for Guard<'_, L, P> {
    fn drop(&mut self) {
        if self.enabled {
            // Exit failures must not propagate out of drop.
            let _ = P::exit(self.lock);
        }
    }
}
