//! Test logging infrastructure for parkway.
//!
//! Captures typed events with timestamps while a test drives the
//! primitives, so a failing interleaving can be reconstructed from the
//! report instead of re-run under a debugger.
//!
//! The pieces:
//!
//! - [`TestLogLevel`]: verbosity, controlled by the `TEST_LOG_LEVEL`
//!   environment variable
//! - [`TestEvent`]: typed events for monitor, semaphore, and queue traffic
//! - [`TestLogger`]: captures and reports events with timestamps
//! - the unit-test macro trio [`test_phase!`](crate::test_phase),
//!   [`assert_with_log!`](crate::assert_with_log), and
//!   [`test_complete!`](crate::test_complete), plus
//!   [`test_utils::init_test_logging`]
//!
//! # Example
//!
//! ```ignore
//! let logger = TestLogger::new(TestLogLevel::Debug);
//! logger.log(TestEvent::MonitorWait { thread_id: 1, state: "signaled" });
//! println!("{}", logger.report());
//! ```

use std::fmt::Write as _;
use std::sync::Mutex;
use std::time::{Duration, Instant};

// ============================================================================
// TestLogLevel
// ============================================================================

/// Logging verbosity level for tests.
///
/// Levels are ordered from least to most verbose:
/// `Error < Warn < Info < Debug < Trace`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum TestLogLevel {
    /// Only errors and failures.
    Error,
    /// Warnings and above.
    Warn,
    /// General test progress.
    #[default]
    Info,
    /// Detailed primitive operations.
    Debug,
    /// All events including every wait and wake.
    Trace,
}

impl TestLogLevel {
    /// Returns a human-readable name for the level.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Warn => "WARN",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
            Self::Trace => "TRACE",
        }
    }

    /// Returns the level from the `TEST_LOG_LEVEL` environment variable.
    #[must_use]
    pub fn from_env() -> Self {
        std::env::var("TEST_LOG_LEVEL")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    }
}

impl std::fmt::Display for TestLogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for TestLogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            _ => Err(()),
        }
    }
}

// ============================================================================
// TestEvent
// ============================================================================

/// A typed event captured by the test logger.
#[derive(Debug, Clone)]
pub enum TestEvent {
    /// A monitor wait ended.
    MonitorWait {
        /// Thread whose monitor was waited on.
        thread_id: u64,
        /// Name of the resulting wait state.
        state: &'static str,
    },

    /// A notify was attempted on some monitor.
    MonitorNotify {
        /// Thread whose monitor was notified.
        thread_id: u64,
        /// Whether the signal was consumable.
        consumed: bool,
    },

    /// A semaphore operation completed.
    SemaphoreOp {
        /// "acquire", "release", "try_acquire".
        op: &'static str,
        /// Count observed after the operation.
        count: usize,
    },

    /// A queue operation completed.
    QueueOp {
        /// "add", "next", "cancel", "wait_empty".
        op: &'static str,
        /// Size observed after the operation.
        size: usize,
    },

    /// Free-form event.
    Custom {
        /// Category tag for the report.
        category: &'static str,
        /// Event text.
        message: String,
    },

    /// A warning; does not fail `assert_no_errors`.
    Warn {
        /// Category tag for the report.
        category: &'static str,
        /// Warning text.
        message: String,
    },

    /// An error; fails `assert_no_errors`.
    Error {
        /// Category tag for the report.
        category: &'static str,
        /// Error text.
        message: String,
    },
}

impl TestEvent {
    /// The verbosity level this event is recorded at.
    #[must_use]
    pub const fn level(&self) -> TestLogLevel {
        match self {
            Self::Error { .. } => TestLogLevel::Error,
            Self::Warn { .. } => TestLogLevel::Warn,
            Self::Custom { .. } => TestLogLevel::Info,
            Self::SemaphoreOp { .. } | Self::QueueOp { .. } => TestLogLevel::Debug,
            Self::MonitorWait { .. } | Self::MonitorNotify { .. } => TestLogLevel::Trace,
        }
    }

    /// Category tag used in the report.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::MonitorWait { .. } | Self::MonitorNotify { .. } => "monitor",
            Self::SemaphoreOp { .. } => "semaphore",
            Self::QueueOp { .. } => "queue",
            Self::Custom { category, .. }
            | Self::Warn { category, .. }
            | Self::Error { category, .. } => category,
        }
    }
}

impl std::fmt::Display for TestEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MonitorWait { thread_id, state } => {
                write!(f, "wait thread={thread_id} state={state}")
            }
            Self::MonitorNotify {
                thread_id,
                consumed,
            } => write!(f, "notify thread={thread_id} consumed={consumed}"),
            Self::SemaphoreOp { op, count } => write!(f, "{op} count={count}"),
            Self::QueueOp { op, size } => write!(f, "{op} size={size}"),
            Self::Custom { message, .. }
            | Self::Warn { message, .. }
            | Self::Error { message, .. } => f.write_str(message),
        }
    }
}

// ============================================================================
// TestLogger
// ============================================================================

/// A timestamped event record.
#[derive(Debug, Clone)]
pub struct LogRecord {
    /// Time since logger creation.
    pub elapsed: Duration,
    /// The event that occurred.
    pub event: TestEvent,
}

/// Test logger that captures typed events with timestamps.
#[derive(Debug)]
pub struct TestLogger {
    level: TestLogLevel,
    events: Mutex<Vec<LogRecord>>,
    start_time: Instant,
    verbose: bool,
}

impl TestLogger {
    /// Creates a new logger with the specified level.
    #[must_use]
    pub fn new(level: TestLogLevel) -> Self {
        Self {
            level,
            events: Mutex::new(Vec::new()),
            start_time: Instant::now(),
            verbose: level >= TestLogLevel::Trace,
        }
    }

    /// Creates a logger using the `TEST_LOG_LEVEL` environment variable.
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(TestLogLevel::from_env())
    }

    /// Sets whether to print events immediately.
    #[must_use]
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Returns the configured log level.
    #[must_use]
    pub fn level(&self) -> TestLogLevel {
        self.level
    }

    /// Returns whether the logger captures events at the given level.
    #[must_use]
    pub fn should_log(&self, level: TestLogLevel) -> bool {
        level <= self.level
    }

    /// Logs an event if it meets the configured level.
    pub fn log(&self, event: TestEvent) {
        let event_level = event.level();
        if !self.should_log(event_level) {
            return;
        }

        let elapsed = self.start_time.elapsed();
        if self.verbose {
            eprintln!(
                "[{:>10.3}ms] [{:>5}] {}",
                elapsed.as_secs_f64() * 1000.0,
                event_level.name(),
                &event
            );
        }

        let record = LogRecord { elapsed, event };
        self.events.lock().expect("lock poisoned").push(record);
    }

    /// Logs a custom event.
    pub fn custom(&self, category: &'static str, message: impl Into<String>) {
        self.log(TestEvent::Custom {
            category,
            message: message.into(),
        });
    }

    /// Logs an error event.
    pub fn error(&self, category: &'static str, message: impl Into<String>) {
        self.log(TestEvent::Error {
            category,
            message: message.into(),
        });
    }

    /// Logs a warning event.
    pub fn warn(&self, category: &'static str, message: impl Into<String>) {
        self.log(TestEvent::Warn {
            category,
            message: message.into(),
        });
    }

    /// Returns the number of captured events.
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.events.lock().expect("lock poisoned").len()
    }

    /// Returns a snapshot of all captured events.
    #[must_use]
    pub fn events(&self) -> Vec<LogRecord> {
        self.events.lock().expect("lock poisoned").clone()
    }

    /// Generates a detailed report of all captured events.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn report(&self) -> String {
        let events = self.events.lock().expect("lock poisoned");
        let mut report = String::new();

        let _ = writeln!(report, "=== Test Event Log ({} events) ===", events.len());
        let _ = writeln!(report);
        for record in events.iter() {
            let _ = writeln!(
                report,
                "[{:>10.3}ms] [{:>5}] {:>9} | {}",
                record.elapsed.as_secs_f64() * 1000.0,
                record.event.level().name(),
                record.event.category(),
                record.event
            );
        }

        let _ = writeln!(report);
        let _ = writeln!(report, "=== Statistics ===");
        let waits = events
            .iter()
            .filter(|r| matches!(r.event, TestEvent::MonitorWait { .. }))
            .count();
        let notifies = events
            .iter()
            .filter(|r| matches!(r.event, TestEvent::MonitorNotify { .. }))
            .count();
        let refused = events
            .iter()
            .filter(|r| {
                matches!(
                    r.event,
                    TestEvent::MonitorNotify {
                        consumed: false,
                        ..
                    }
                )
            })
            .count();
        let errors = events
            .iter()
            .filter(|r| matches!(r.event, TestEvent::Error { .. }))
            .count();
        let warnings = events
            .iter()
            .filter(|r| matches!(r.event, TestEvent::Warn { .. }))
            .count();

        let _ = writeln!(report, "Monitor waits: {waits}");
        let _ = writeln!(report, "Notify attempts: {notifies}");
        if notifies > 0 {
            let _ = writeln!(
                report,
                "Refused notifies: {refused} ({:.1}%)",
                (refused as f64 / notifies as f64) * 100.0
            );
        }
        let _ = writeln!(report, "Errors: {errors}");
        let _ = writeln!(report, "Warnings: {warnings}");
        if let Some(last) = events.last() {
            let _ = writeln!(report, "Total duration: {:?}", last.elapsed);
        }
        report
    }

    /// Asserts that no errors were logged.
    ///
    /// # Panics
    ///
    /// Panics if any error events were logged.
    pub fn assert_no_errors(&self) {
        let error_messages: Vec<String> = {
            let events = self.events.lock().expect("lock poisoned");
            events
                .iter()
                .filter(|r| matches!(r.event, TestEvent::Error { .. }))
                .map(|r| format!("  - {}", r.event))
                .collect()
        };

        assert!(
            error_messages.is_empty(),
            "Test logged {} errors:\n{}\n\nFull log:\n{}",
            error_messages.len(),
            error_messages.join("\n"),
            self.report()
        );
    }

    /// Clears all captured events.
    pub fn clear(&self) {
        self.events.lock().expect("lock poisoned").clear();
    }
}

impl Default for TestLogger {
    fn default() -> Self {
        Self::new(TestLogLevel::Info)
    }
}

// ============================================================================
// Unit-test plumbing
// ============================================================================

/// Helpers shared by every unit and conformance test.
pub mod test_utils {
    use std::sync::Once;

    static INIT: Once = Once::new();

    /// One-time, idempotent test-log setup.
    ///
    /// Reads `TEST_LOG_LEVEL` and announces the effective level once per
    /// process; every test calls this first so a failing run can be re-run
    /// with `TEST_LOG_LEVEL=trace` without touching the test.
    pub fn init_test_logging() {
        INIT.call_once(|| {
            let level = super::TestLogLevel::from_env();
            if level >= super::TestLogLevel::Debug {
                eprintln!("[test-log] level={level}");
            }
        });
    }
}

/// Announces the start of a named test phase when debug logging is on.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        if $crate::test_logging::TestLogLevel::from_env()
            >= $crate::test_logging::TestLogLevel::Debug
        {
            eprintln!("[test-log] phase {}", $name);
        }
    };
}

/// Asserts a condition, reporting the labeled expected/actual pair on
/// failure.
#[macro_export]
macro_rules! assert_with_log {
    ($cond:expr, $label:expr, $expected:expr, $actual:expr) => {
        assert!(
            $cond,
            "{}: expected {:?}, got {:?}",
            $label, $expected, $actual
        );
    };
}

/// Announces the completion of a named test when debug logging is on.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        if $crate::test_logging::TestLogLevel::from_env()
            >= $crate::test_logging::TestLogLevel::Debug
        {
            eprintln!("[test-log] complete {}", $name);
        }
    };
}

/// Logs a custom event to a test logger.
#[macro_export]
macro_rules! test_log {
    ($logger:expr, $cat:literal, $($arg:tt)*) => {
        $logger.log($crate::test_logging::TestEvent::Custom {
            category: $cat,
            message: format!($($arg)*),
        });
    };
}

/// Asserts a condition, printing the full log on failure.
#[macro_export]
macro_rules! assert_log {
    ($logger:expr, $cond:expr) => {
        if !$cond {
            eprintln!("{}", $logger.report());
            panic!("assertion failed: {}", stringify!($cond));
        }
    };
    ($logger:expr, $cond:expr, $($arg:tt)*) => {
        if !$cond {
            eprintln!("{}", $logger.report());
            panic!($($arg)*);
        }
    };
}

// ============================================================================
// Tests
// ============================================================================
