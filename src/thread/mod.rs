//! Thread identity and the per-thread wait/notify kernel.
//!
//! - [`Monitor`]: the sticky wait/notify state machine every blocking
//!   primitive in this crate parks on
//! - [`ThreadHandle`]: ambient identity for a participating thread,
//!   carrying its monitor and priority
//!
//! Thread spawning, pooling, and lifecycle management are deliberately not
//! part of this crate; any `std::thread` becomes a participant the first
//! time it blocks on a parkway primitive.

mod handle;
mod monitor;

pub use handle::{yield_now, ThreadHandle};
pub use monitor::{Monitor, MonitorGuard, WaitState};
