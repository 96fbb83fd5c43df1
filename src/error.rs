//! Error types and error handling strategy for parkway.
//!
//! Every fallible operation in the crate reports a [`SyncError`] carrying a
//! flat [`ErrorKind`]. The principles:
//!
//! - Errors are explicit and typed (no stringly-typed errors)
//! - Errors surface to the caller verbatim; nothing is swallowed except in
//!   drop paths, which must not propagate
//! - `Interrupted` always wins over `Timeout` when both conditions occur in
//!   the same wait

use core::fmt;

/// The kind of synchronization error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Generic failure in an underlying primitive.
    Synchronization,
    /// An interruptible wait was aborted by an interrupt request.
    Interrupted,
    /// A timed operation exceeded its deadline without success.
    Timeout,
    /// The target object has been canceled; further operations are rejected.
    Canceled,
    /// Misuse, e.g. posting to a checked semaphore at its maximum.
    InvalidOp,
    /// Underlying OS resources could not be allocated.
    Initialization,
    /// Self-detected deadlock (recursive acquisition of a non-reentrant lock).
    Deadlock,
}

/// Coarse grouping of error kinds, for retry and reporting logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// A wait ended without the resource (timeout, spurious failure).
    Wait,
    /// The operation was aborted by interrupt or cancellation.
    Cancellation,
    /// The caller violated the primitive's contract.
    Misuse,
    /// A resource-level failure outside the caller's control.
    Resource,
}

impl ErrorKind {
    /// Returns the error category for this kind.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Synchronization | Self::Timeout => ErrorCategory::Wait,
            Self::Interrupted | Self::Canceled => ErrorCategory::Cancellation,
            Self::InvalidOp | Self::Deadlock => ErrorCategory::Misuse,
            Self::Initialization => ErrorCategory::Resource,
        }
    }

    /// Returns a human-readable name for the kind.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Synchronization => "synchronization",
            Self::Interrupted => "interrupted",
            Self::Timeout => "timeout",
            Self::Canceled => "canceled",
            Self::InvalidOp => "invalid operation",
            Self::Initialization => "initialization",
            Self::Deadlock => "deadlock",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error reported by parkway primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncError {
    kind: ErrorKind,
    detail: &'static str,
}

impl SyncError {
    /// Creates an error of the given kind with a static detail message.
    #[must_use]
    pub const fn new(kind: ErrorKind, detail: &'static str) -> Self {
        Self { kind, detail }
    }

    /// A wait was aborted by an interrupt request.
    #[must_use]
    pub const fn interrupted() -> Self {
        Self::new(ErrorKind::Interrupted, "wait interrupted")
    }

    /// A timed operation ran out its deadline.
    #[must_use]
    pub const fn timeout() -> Self {
        Self::new(ErrorKind::Timeout, "operation timed out")
    }

    /// The target object is canceled.
    #[must_use]
    pub const fn canceled() -> Self {
        Self::new(ErrorKind::Canceled, "object canceled")
    }

    /// Contract violation with a specific detail.
    #[must_use]
    pub const fn invalid_op(detail: &'static str) -> Self {
        Self::new(ErrorKind::InvalidOp, detail)
    }

    /// Generic failure in an underlying primitive.
    #[must_use]
    pub const fn synchronization(detail: &'static str) -> Self {
        Self::new(ErrorKind::Synchronization, detail)
    }

    /// Self-detected deadlock.
    #[must_use]
    pub const fn deadlock(detail: &'static str) -> Self {
        Self::new(ErrorKind::Deadlock, detail)
    }

    /// Resource allocation failure.
    #[must_use]
    pub const fn initialization(detail: &'static str) -> Self {
        Self::new(ErrorKind::Initialization, detail)
    }

    /// Returns the kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the detail message.
    #[must_use]
    pub const fn detail(&self) -> &'static str {
        self.detail
    }

    /// True if this error is an interrupt abort.
    #[must_use]
    pub const fn is_interrupted(&self) -> bool {
        matches!(self.kind, ErrorKind::Interrupted)
    }

    /// True if this error is a deadline expiry.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self.kind, ErrorKind::Timeout)
    }

    /// True if this error is a cancellation rejection.
    #[must_use]
    pub const fn is_canceled(&self) -> bool {
        matches!(self.kind, ErrorKind::Canceled)
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}

impl std::error::Error for SyncError {}

/// Result alias used across the crate.
pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_categories() {
        assert_eq!(ErrorKind::Timeout.category(), ErrorCategory::Wait);
        assert_eq!(ErrorKind::Synchronization.category(), ErrorCategory::Wait);
        assert_eq!(
            ErrorKind::Interrupted.category(),
            ErrorCategory::Cancellation
        );
        assert_eq!(ErrorKind::Canceled.category(), ErrorCategory::Cancellation);
        assert_eq!(ErrorKind::InvalidOp.category(), ErrorCategory::Misuse);
        assert_eq!(ErrorKind::Deadlock.category(), ErrorCategory::Misuse);
        assert_eq!(
            ErrorKind::Initialization.category(),
            ErrorCategory::Resource
        );
    }

    #[test]
    fn constructors_match_kinds() {
        assert!(SyncError::interrupted().is_interrupted());
        assert!(SyncError::timeout().is_timeout());
        assert!(SyncError::canceled().is_canceled());
        assert_eq!(
            SyncError::invalid_op("release at max").kind(),
            ErrorKind::InvalidOp
        );
        assert_eq!(
            SyncError::deadlock("recursive acquire").kind(),
            ErrorKind::Deadlock
        );
    }

    #[test]
    fn display_includes_kind_and_detail() {
        let err = SyncError::invalid_op("release past maximum count");
        let text = err.to_string();
        assert!(text.contains("invalid operation"));
        assert!(text.contains("release past maximum count"));
    }

    #[test]
    fn error_is_std_error() {
        fn assert_error<E: std::error::Error>(_: &E) {}
        assert_error(&SyncError::timeout());
    }
}
