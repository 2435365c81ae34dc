//! Operational logger port (driven/secondary port)
//!
//! The sync engine reports lifecycle transitions, every applied change and
//! every recoverable error through a [`SyncLogger`]. The logger is injected at
//! construction; there is no process-wide registry.
//!
//! ## Design Notes
//!
//! - Methods are synchronous and infallible: a sink that cannot write must
//!   swallow its own errors.
//! - Implementations are composed rather than specialised: [`FanoutLogger`]
//!   forwards to several sinks, [`SeverityFilter`] mutes severities on one.
//! - The engine must behave identically with a [`NullLogger`].

use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

// ============================================================================
// Severity
// ============================================================================

/// Severity of an operational log message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Lifecycle transitions and applied changes
    Information,
    /// Recoverable anomalies
    Warning,
    /// Failed operations
    Error,
}

impl Severity {
    /// Single-letter tag used by line-oriented sinks
    pub fn tag(self) -> &'static str {
        match self {
            Severity::Information => "I",
            Severity::Warning => "W",
            Severity::Error => "E",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Information => "information",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "{}", s)
    }
}

// ============================================================================
// SyncLogger trait
// ============================================================================

/// Port trait for the engine's operational log
///
/// Called from the worker thread, the watcher callback thread and the control
/// thread, so implementations must be thread-safe.
pub trait SyncLogger: Send + Sync {
    /// Writes an informational message
    fn log_information(&self, message: &str);

    /// Writes a warning
    fn log_warning(&self, message: &str);

    /// Writes an error
    fn log_error(&self, message: &str);

    /// Writes a message at the given severity
    fn log(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Information => self.log_information(message),
            Severity::Warning => self.log_warning(message),
            Severity::Error => self.log_error(message),
        }
    }
}

impl<T: SyncLogger + ?Sized> SyncLogger for Arc<T> {
    fn log_information(&self, message: &str) {
        (**self).log_information(message)
    }

    fn log_warning(&self, message: &str) {
        (**self).log_warning(message)
    }

    fn log_error(&self, message: &str) {
        (**self).log_error(message)
    }
}

// ============================================================================
// NullLogger
// ============================================================================

/// Discards every message
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLogger;

impl SyncLogger for NullLogger {
    fn log_information(&self, _message: &str) {}
    fn log_warning(&self, _message: &str) {}
    fn log_error(&self, _message: &str) {}
}

// ============================================================================
// FanoutLogger
// ============================================================================

/// Forwards every message to each of its sinks, in order
#[derive(Clone, Default)]
pub struct FanoutLogger {
    sinks: Vec<Arc<dyn SyncLogger>>,
}

impl FanoutLogger {
    /// Creates an empty fan-out (equivalent to a [`NullLogger`])
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    /// Adds a sink
    pub fn with_sink(mut self, sink: Arc<dyn SyncLogger>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Number of sinks
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Returns true when there are no sinks
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl fmt::Debug for FanoutLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FanoutLogger")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl SyncLogger for FanoutLogger {
    fn log_information(&self, message: &str) {
        self.sinks.iter().for_each(|s| s.log_information(message));
    }

    fn log_warning(&self, message: &str) {
        self.sinks.iter().for_each(|s| s.log_warning(message));
    }

    fn log_error(&self, message: &str) {
        self.sinks.iter().for_each(|s| s.log_error(message));
    }
}

// ============================================================================
// SeverityFilter
// ============================================================================

/// Wraps a sink and mutes severities independently
#[derive(Clone)]
pub struct SeverityFilter<L> {
    inner: L,
    information: bool,
    warning: bool,
    error: bool,
}

impl<L: SyncLogger> SeverityFilter<L> {
    /// Wraps `inner` with every severity enabled
    pub fn new(inner: L) -> Self {
        Self {
            inner,
            information: true,
            warning: true,
            error: true,
        }
    }

    /// Enables or disables informational messages
    pub fn information(mut self, enabled: bool) -> Self {
        self.information = enabled;
        self
    }

    /// Enables or disables warnings
    pub fn warning(mut self, enabled: bool) -> Self {
        self.warning = enabled;
        self
    }

    /// Enables or disables errors
    pub fn error(mut self, enabled: bool) -> Self {
        self.error = enabled;
        self
    }

    /// Returns whether `severity` is currently forwarded
    pub fn is_enabled(&self, severity: Severity) -> bool {
        match severity {
            Severity::Information => self.information,
            Severity::Warning => self.warning,
            Severity::Error => self.error,
        }
    }
}

impl<L: SyncLogger> SyncLogger for SeverityFilter<L> {
    fn log_information(&self, message: &str) {
        if self.information {
            self.inner.log_information(message);
        }
    }

    fn log_warning(&self, message: &str) {
        if self.warning {
            self.inner.log_warning(message);
        }
    }

    fn log_error(&self, message: &str) {
        if self.error {
            self.inner.log_error(message);
        }
    }
}
