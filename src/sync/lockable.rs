//! Capability traits shared by every blocking primitive.
//!
//! [`Lockable`] is the acquire/release contract all locks (and lock-shaped
//! objects such as semaphores and queue serializers) expose; [`Waitable`]
//! and [`Cancelable`] cover the event-wait and cancellation surfaces of the
//! queue family.

use crate::error::SyncResult;
use std::time::{Duration, Instant};

/// Exclusive (or counted) acquisition protocol.
///
/// Errors: `Timeout` from timed entry points that promote expiry to an
/// error, `Interrupted` from interruptible implementations. Spin locks and
/// plain OS mutexes never fail.
pub trait Lockable {
    /// Acquires the protection, blocking as needed.
    fn acquire(&self) -> SyncResult<()>;

    /// Attempts to acquire within `timeout`.
    ///
    /// Returns `Ok(false)` when the deadline elapsed without acquisition.
    /// A zero timeout never blocks.
    fn try_acquire(&self, timeout: Duration) -> SyncResult<bool>;

    /// Releases the protection.
    fn release(&self) -> SyncResult<()>;
}

/// An event that can be waited for.
pub trait Waitable {
    /// Blocks until the event holds.
    fn wait(&self) -> SyncResult<()>;

    /// Blocks until the event holds or `timeout` elapses; `Ok(false)` on
    /// expiry.
    fn wait_timeout(&self, timeout: Duration) -> SyncResult<bool>;
}

/// An object that can be moved, permanently, into a canceled state.
pub trait Cancelable {
    /// Cancels the object. Idempotent; the transition is never reverted.
    ///
    /// Fails only when taking the object's serializing lock fails (e.g. an
    /// interrupt while the canceling thread was blocked on it).
    fn cancel(&self) -> SyncResult<()>;

    /// True once [`Cancelable::cancel`] has succeeded.
    fn is_canceled(&self) -> bool;
}

/// A fixed deadline for a (possibly multi-sleep) timed wait.
///
/// Every timed loop in the crate computes its deadline once up front and
/// re-arms each sleep with the remainder, so spurious wakeups cannot
/// stretch the total wait.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    /// A deadline `timeout` from now. `None` waits indefinitely.
    pub(crate) fn after(timeout: Option<Duration>) -> Self {
        Self {
            at: timeout.map(|t| Instant::now() + t),
        }
    }

    /// Time left until the deadline.
    ///
    /// `None` for an indefinite deadline; `Some(ZERO)` once expired.
    pub(crate) fn remaining(&self) -> Option<Duration> {
        self.at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// True once the deadline has passed (never for indefinite).
    pub(crate) fn expired(&self) -> bool {
        self.remaining() == Some(Duration::ZERO)
    }
}
