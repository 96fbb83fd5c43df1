//! Thread-level coordination primitives on a portable wait/notify kernel.
//!
//! parkway builds its blocking primitives on one mechanism: every
//! participating thread owns a [`Monitor`](thread::Monitor), a sticky
//! wait/notify state machine, and every semaphore, condition, queue, and
//! read/write lock schedules threads by parking them on their own monitors
//! and donating wakeups through the release-side notify-donor protocol.
//!
//! # Layers
//!
//! - [`thread`]: thread identity and the monitor kernel
//! - [`sync`]: locks, guards with scope policies, semaphores, conditions,
//!   read/write locks, and the shared-ownership substrate
//! - [`queue`]: blocking, bounded, and monitored producer/consumer queues
//! - [`error`]: the crate-wide error kinds
//! - [`config`]: donor-loop backoff tuning
//! - [`test_logging`]: event capture for the test suites
//!
//! # Example
//!
//! ```ignore
//! use parkway::sync::Semaphore;
//!
//! let sem = Semaphore::new(0, 1);
//! std::thread::scope(|scope| {
//!     scope.spawn(|| sem.wait().expect("acquire"));
//!     sem.post().expect("release");
//! });
//! ```
//!
//! # Interrupts and cancellation
//!
//! Raising a thread's interrupt flag
//! ([`ThreadHandle::interrupt`](thread::ThreadHandle::interrupt)) aborts
//! its current or next blocking operation with an `Interrupted` error; the
//! flag is consumed by the wait that observes it. Canceling a queue is
//! permanent and wakes everything blocked on it.

pub mod config;
pub mod error;
pub mod queue;
pub mod sync;
pub mod test_logging;
pub mod thread;

pub use error::{ErrorCategory, ErrorKind, SyncError, SyncResult};
pub use queue::{BlockingQueue, BoundedQueue, MonitoredQueue};
pub use sync::{
    BiasedRwLock, Cancelable, Condition, CountingSemaphore, FairRwLock, FastLock, FastMutex,
    Guard, Lockable, Mutex, PrioritySemaphore, Semaphore, Waitable,
};
pub use thread::{Monitor, ThreadHandle, WaitState};
