//! foldsync Sync - Folder synchronization engine
//!
//! Provides:
//! - Filesystem watching with rename pairing
//! - A coalescing change queue
//! - Echo suppression for the engine's own writes
//! - Busy-file-aware recursive copy/move/delete
//! - A single-worker sync service with Start/Pause/Continue/Stop
//!
//! ## Modules
//!
//! - [`engine`] - Sync service orchestrating watchers, queue and worker
//! - [`fileops`] - Directory operation engine (busy-wait, tree copy/move/delete)
//! - [`ignore`] - Echo-suppression ignore lists
//! - [`logging`] - `SyncLogger` implementations backed by `tracing` and files
//! - [`queue`] - Pending change queue and coalescing rules
//! - [`reconcile`] - One-shot reconciliation of the two roots
//! - [`watcher`] - `notify` adapter bound to one root

pub mod engine;
pub mod fileops;
pub mod ignore;
pub mod logging;
pub mod queue;
pub mod reconcile;
pub mod watcher;

use std::{path::PathBuf, time::Duration};

use foldsync_core::domain::{DomainError, SyncMode};
use thiserror::Error;

pub use engine::{DeadLetter, SyncOptions, SyncService};
pub use reconcile::{reconcile, ReconcileReport};

/// Errors that can occur during synchronization operations
#[derive(Debug, Error)]
pub enum SyncError {
    /// Roots or mode are unusable; raised at construction
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Root creation or initial reconciliation failed; the service stays stopped
    #[error("Startup failed: {context}")]
    StartupFailure {
        /// What was being done when startup failed
        context: String,
        /// The underlying failure
        #[source]
        source: Box<SyncError>,
    },

    /// A file stayed locked by another process for the whole busy budget
    #[error("File busy: {} (waited {waited:?})", path.display())]
    BusyTimeout {
        /// The file that could not be locked
        path: PathBuf,
        /// How long the engine waited
        waited: Duration,
    },

    /// A filesystem operation failed
    #[error("{operation} failed for {}: {source}", path.display())]
    OperationFailure {
        /// Short name of the operation (`copy`, `remove`, `create_dir`, ...)
        operation: &'static str,
        /// Path the operation was applied to
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The notification backend reported an error or dropped events
    #[error("Notification source error: {0}")]
    NotificationSource(String),

    /// A busy-file wait observed a pause or stop request
    #[error("Interrupted by pause or stop")]
    Interrupted,

    /// A domain-level error propagated from foldsync-core
    #[error("Domain error: {0}")]
    DomainError(#[from] foldsync_core::domain::DomainError),
}

impl SyncError {
    /// Builds an [`SyncError::OperationFailure`]
    pub fn operation(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        SyncError::OperationFailure {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Wraps `self` as a [`SyncError::StartupFailure`]
    pub fn during_startup(self, context: impl Into<String>) -> Self {
        SyncError::StartupFailure {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Parses a sync mode name
///
/// Unknown names are reported as [`SyncError::InvalidConfiguration`].
pub fn parse_mode(text: &str) -> Result<SyncMode, SyncError> {
    text.parse()
        .map_err(|e: DomainError| SyncError::InvalidConfiguration(e.to_string()))
}
