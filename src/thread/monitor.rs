//! Per-thread wait/notify kernel with a sticky state word.
//!
//! A [`Monitor`] is the single mechanism by which a thread parks itself and
//! is later awoken: by another thread's notify, by an interrupt request, or
//! by a deadline. Each participating thread owns exactly one Monitor (see
//! [`crate::thread::ThreadHandle`]); other threads touch it only through
//! [`Monitor::try_lock`], in the notifier role.
//!
//! # Stickiness
//!
//! A wait may end for reasons the notifier never observes: interrupt,
//! timeout, cancellation. The result of a wait therefore stays recorded in
//! the state word until the owning thread consumes it (by entering its next
//! wait). While the record is unconsumed, [`MonitorGuard::notify`] returns
//! `false`, and release-side donor loops must move on to another waiter
//! instead of wasting a wakeup that nobody will observe.
//!
//! # Example
//!
//! ```ignore
//! // Owner side: park until signaled.
//! let mut guard = monitor.lock();
//! match guard.wait() {
//!     WaitState::Signaled => { /* resource was handed to us */ }
//!     WaitState::Interrupted => { /* abort */ }
//!     _ => unreachable!(),
//! }
//!
//! // Notifier side: never block on a busy monitor.
//! if let Some(mut guard) = monitor.try_lock() {
//!     if guard.notify() { /* wakeup donated */ }
//! }
//! ```

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// The reason a wait ended, and the sticky record it leaves behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitState {
    /// No wait result is pending; the monitor can accept a notify.
    Idle,
    /// A notify was observed and consumed.
    Signaled,
    /// The thread's interrupt flag was observed and consumed.
    Interrupted,
    /// The deadline elapsed before any other wake reason.
    TimedOut,
    /// The thread was canceled; delivered on every subsequent wait.
    Canceled,
}

impl WaitState {
    /// Returns a short name for trace events.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Signaled => "signaled",
            Self::Interrupted => "interrupted",
            Self::TimedOut => "timed-out",
            Self::Canceled => "canceled",
        }
    }
}

#[derive(Debug)]
struct MonitorCore {
    /// Sticky result word; non-`Idle` means the last wake is unconsumed.
    state: WaitState,
    /// A notify was posted and not yet consumed by a wait.
    pending_signal: bool,
    /// An interrupt was requested and not yet consumed by a wait.
    interrupted: bool,
    /// Permanent cancellation mark.
    canceled: bool,
    /// The owner is currently parked on the condvar.
    waiting: bool,
}

/// Per-thread wait/notify primitive.
///
/// Owns one OS-level mutex plus one condition variable. The owning thread
/// calls [`Monitor::lock`] and parks through [`MonitorGuard::wait`];
/// notifiers use [`Monitor::try_lock`] so that a busy monitor is skipped
/// rather than waited on.
#[derive(Debug)]
pub struct Monitor {
    core: Mutex<MonitorCore>,
    cond: Condvar,
}

impl Monitor {
    /// Creates a monitor in the `Idle` state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            core: Mutex::new(MonitorCore {
                state: WaitState::Idle,
                pending_signal: false,
                interrupted: false,
                canceled: false,
                waiting: false,
            }),
            cond: Condvar::new(),
        }
    }

    /// Acquires the monitor, blocking until it is free.
    ///
    /// Used by the owning thread before a wait, and by interrupt delivery
    /// (which never holds any other lock while calling this).
    pub fn lock(&self) -> MonitorGuard<'_> {
        MonitorGuard {
            cond: &self.cond,
            core: self.core.lock(),
        }
    }

    /// Non-blocking acquire; the notifier entry point.
    ///
    /// `None` means the monitor is busy (its owner or another notifier holds
    /// it); callers must skip to another waiter rather than block here.
    pub fn try_lock(&self) -> Option<MonitorGuard<'_>> {
        self.core.try_lock().map(|core| MonitorGuard {
            cond: &self.cond,
            core,
        })
    }
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive access to a [`Monitor`]; released on drop.
#[derive(Debug)]
pub struct MonitorGuard<'a> {
    cond: &'a Condvar,
    core: MutexGuard<'a, MonitorCore>,
}

impl MonitorGuard<'_> {
    /// Parks the owning thread until a notify, interrupt, or cancel.
    ///
    /// Precondition: the caller is the monitor's owning thread. The monitor
    /// is atomically released while parked and re-held on return.
    pub fn wait(&mut self) -> WaitState {
        self.wait_inner(None)
    }

    /// Like [`MonitorGuard::wait`] with a deadline.
    ///
    /// A zero timeout performs no wait at all and reports `TimedOut`
    /// (unless a signal, interrupt, or cancel is already pending).
    pub fn wait_for(&mut self, timeout: Duration) -> WaitState {
        self.wait_inner(Some(timeout))
    }

    fn wait_inner(&mut self, timeout: Option<Duration>) -> WaitState {
        // Entering a wait consumes the record left by the previous one.
        // A pending signal is not stale: it is the donation this wait is
        // about to observe.
        if !self.core.pending_signal {
            self.core.state = WaitState::Idle;
        }

        // Wake reasons already posted; dispatch order is signal, interrupt,
        // cancel. Signal-first keeps the donor invariant: once notify() has
        // returned true, exactly one wait reports Signaled.
        if self.core.pending_signal {
            self.core.pending_signal = false;
            self.core.state = WaitState::Idle;
            return WaitState::Signaled;
        }
        if self.core.interrupted {
            self.core.interrupted = false;
            self.core.state = WaitState::Interrupted;
            return WaitState::Interrupted;
        }
        if self.core.canceled {
            self.core.state = WaitState::Canceled;
            return WaitState::Canceled;
        }
        if timeout == Some(Duration::ZERO) {
            self.core.state = WaitState::TimedOut;
            return WaitState::TimedOut;
        }

        // Single deadline for the whole wait; spurious wakeups re-arm with
        // the remainder rather than restarting the timeout.
        let deadline = timeout.map(|t| Instant::now() + t);
        self.core.waiting = true;
        let result = loop {
            let timed_out = match deadline {
                None => {
                    self.cond.wait(&mut self.core);
                    false
                }
                Some(at) => self.cond.wait_until(&mut self.core, at).timed_out(),
            };

            if self.core.pending_signal {
                self.core.pending_signal = false;
                break WaitState::Signaled;
            }
            if self.core.interrupted {
                self.core.interrupted = false;
                break WaitState::Interrupted;
            }
            if self.core.canceled {
                break WaitState::Canceled;
            }
            if timed_out {
                break WaitState::TimedOut;
            }
            // Spurious wakeup: park again.
        };
        self.core.waiting = false;

        // Signaled is consumed here; every other reason stays sticky so a
        // racing notifier sees the waiter is already leaving.
        self.core.state = if result == WaitState::Signaled {
            WaitState::Idle
        } else {
            result
        };
        tracing::trace!(state = result.name(), "monitor wait complete");
        result
    }

    /// Posts a wakeup to the owning thread.
    ///
    /// Returns `true` iff the signal is consumable: the monitor was `Idle`
    /// with no interrupt or cancel pending, so exactly one future (or
    /// in-progress) wait will report `Signaled`. Returns `false` when the
    /// previous wake is unconsumed or the waiter is already leaving for
    /// another reason; the caller must then pick a different waiter.
    pub fn notify(&mut self) -> bool {
        if self.core.state != WaitState::Idle
            || self.core.interrupted
            || self.core.canceled
        {
            tracing::trace!(
                state = self.core.state.name(),
                "notify refused by sticky monitor"
            );
            return false;
        }
        self.core.pending_signal = true;
        self.core.state = WaitState::Signaled;
        if self.core.waiting {
            self.cond.notify_one();
        }
        true
    }

    /// Raises the interrupt flag. Idempotent.
    ///
    /// Returns `true` if a wait was in progress and has been woken; the
    /// flag otherwise stays set for the next wait to consume.
    pub fn interrupt(&mut self) -> bool {
        self.core.interrupted = true;
        if self.core.waiting {
            self.cond.notify_one();
            tracing::trace!("interrupt delivered to parked thread");
            return true;
        }
        false
    }

    /// Marks the thread canceled. Permanent; every later wait reports
    /// `Canceled`.
    pub fn cancel(&mut self) -> bool {
        self.core.canceled = true;
        if self.core.waiting {
            self.cond.notify_one();
            return true;
        }
        false
    }

    /// Current sticky state word.
    #[must_use]
    pub fn state(&self) -> WaitState {
        self.core.state
    }

    /// True if the interrupt flag is raised and unconsumed.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.core.interrupted
    }

    /// True if the monitor's thread has been canceled.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.core.canceled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    fn init_test(name: &str) {
        crate::test_logging::test_utils::init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn fresh_monitor_is_idle() {
        init_test("fresh_monitor_is_idle");
        let monitor = Monitor::new();
        let guard = monitor.lock();
        crate::assert_with_log!(
            guard.state() == WaitState::Idle,
            "initial state",
            WaitState::Idle,
            guard.state()
        );
        drop(guard);
        crate::test_complete!("fresh_monitor_is_idle");
    }

    #[test]
    fn notify_before_wait_is_consumed_immediately() {
        init_test("notify_before_wait_is_consumed_immediately");
        let monitor = Monitor::new();
        {
            let mut guard = monitor.lock();
            let posted = guard.notify();
            crate::assert_with_log!(posted, "notify accepted", true, posted);
        }
        let mut guard = monitor.lock();
        let state = guard.wait();
        crate::assert_with_log!(
            state == WaitState::Signaled,
            "pending signal consumed",
            WaitState::Signaled,
            state
        );
        let after = guard.state();
        crate::assert_with_log!(
            after == WaitState::Idle,
            "signal consumption resets to idle",
            WaitState::Idle,
            after
        );
        crate::test_complete!("notify_before_wait_is_consumed_immediately");
    }

    #[test]
    fn notify_is_consumable_at_most_once() {
        init_test("notify_is_consumable_at_most_once");
        let monitor = Monitor::new();
        let mut guard = monitor.lock();
        let first = guard.notify();
        let second = guard.notify();
        crate::assert_with_log!(first, "first notify", true, first);
        crate::assert_with_log!(!second, "second notify refused", false, second);
        crate::test_complete!("notify_is_consumable_at_most_once");
    }

    #[test]
    fn interrupt_without_wait_flags_next_wait() {
        init_test("interrupt_without_wait_flags_next_wait");
        let monitor = Monitor::new();
        {
            let mut guard = monitor.lock();
            let woke = guard.interrupt();
            crate::assert_with_log!(!woke, "no wait in progress", false, woke);
        }
        let mut guard = monitor.lock();
        let state = guard.wait();
        crate::assert_with_log!(
            state == WaitState::Interrupted,
            "next wait interrupted",
            WaitState::Interrupted,
            state
        );
        // The flag was consumed: a timed wait now simply times out.
        let state = guard.wait_for(Duration::from_millis(5));
        crate::assert_with_log!(
            state == WaitState::TimedOut,
            "interrupt consumed exactly once",
            WaitState::TimedOut,
            state
        );
        crate::test_complete!("interrupt_without_wait_flags_next_wait");
    }

    #[test]
    fn notify_refused_while_interrupt_pending() {
        init_test("notify_refused_while_interrupt_pending");
        let monitor = Monitor::new();
        let mut guard = monitor.lock();
        guard.interrupt();
        let posted = guard.notify();
        crate::assert_with_log!(!posted, "interrupting waiter skipped", false, posted);
        crate::test_complete!("notify_refused_while_interrupt_pending");
    }

    #[test]
    fn zero_timeout_never_sleeps() {
        init_test("zero_timeout_never_sleeps");
        let monitor = Monitor::new();
        let mut guard = monitor.lock();
        let start = Instant::now();
        let state = guard.wait_for(Duration::ZERO);
        crate::assert_with_log!(
            state == WaitState::TimedOut,
            "zero timeout",
            WaitState::TimedOut,
            state
        );
        let fast = start.elapsed() < Duration::from_millis(50);
        crate::assert_with_log!(fast, "returned immediately", true, fast);
        crate::test_complete!("zero_timeout_never_sleeps");
    }

    #[test]
    fn timed_wait_expires_and_stays_sticky() {
        init_test("timed_wait_expires_and_stays_sticky");
        let monitor = Monitor::new();
        let mut guard = monitor.lock();
        let state = guard.wait_for(Duration::from_millis(10));
        crate::assert_with_log!(
            state == WaitState::TimedOut,
            "deadline elapsed",
            WaitState::TimedOut,
            state
        );
        // The record is sticky: a notifier must be refused until the next
        // wait consumes it.
        let posted = guard.notify();
        crate::assert_with_log!(!posted, "sticky timeout blocks notify", false, posted);
        crate::test_complete!("timed_wait_expires_and_stays_sticky");
    }

    #[test]
    fn cross_thread_notify_wakes_parked_waiter() {
        init_test("cross_thread_notify_wakes_parked_waiter");
        let monitor = Arc::new(Monitor::new());
        let remote = Arc::clone(&monitor);

        let waiter = std::thread::spawn(move || {
            let mut guard = remote.lock();
            guard.wait()
        });

        // Keep trying until the notify lands on an idle, parked monitor.
        loop {
            if let Some(mut guard) = monitor.try_lock() {
                if guard.notify() {
                    break;
                }
            }
            std::thread::yield_now();
        }

        let state = waiter.join().expect("waiter thread panicked");
        crate::assert_with_log!(
            state == WaitState::Signaled,
            "parked waiter signaled",
            WaitState::Signaled,
            state
        );
        crate::test_complete!("cross_thread_notify_wakes_parked_waiter");
    }

    #[test]
    fn cross_thread_interrupt_wakes_parked_waiter() {
        init_test("cross_thread_interrupt_wakes_parked_waiter");
        let monitor = Arc::new(Monitor::new());
        let remote = Arc::clone(&monitor);

        let waiter = std::thread::spawn(move || {
            let mut guard = remote.lock();
            guard.wait()
        });

        std::thread::sleep(Duration::from_millis(20));
        {
            let mut guard = monitor.lock();
            guard.interrupt();
        }

        let state = waiter.join().expect("waiter thread panicked");
        crate::assert_with_log!(
            state == WaitState::Interrupted,
            "parked waiter interrupted",
            WaitState::Interrupted,
            state
        );
        crate::test_complete!("cross_thread_interrupt_wakes_parked_waiter");
    }

    #[test]
    fn canceled_monitor_reports_on_every_wait() {
        init_test("canceled_monitor_reports_on_every_wait");
        let monitor = Monitor::new();
        let mut guard = monitor.lock();
        guard.cancel();
        let first = guard.wait();
        let second = guard.wait_for(Duration::from_millis(1));
        crate::assert_with_log!(
            first == WaitState::Canceled,
            "first wait canceled",
            WaitState::Canceled,
            first
        );
        crate::assert_with_log!(
            second == WaitState::Canceled,
            "cancel is permanent",
            WaitState::Canceled,
            second
        );
        crate::test_complete!("canceled_monitor_reports_on_every_wait");
    }

    #[test]
    fn try_lock_fails_while_owner_holds() {
        init_test("try_lock_fails_while_owner_holds");
        let monitor = Monitor::new();
        let guard = monitor.lock();
        let busy = monitor.try_lock().is_none();
        crate::assert_with_log!(busy, "busy monitor skipped", true, busy);
        drop(guard);
        let free = monitor.try_lock().is_some();
        crate::assert_with_log!(free, "released monitor lockable", true, free);
        crate::test_complete!("try_lock_fails_while_owner_holds");
    }
}
