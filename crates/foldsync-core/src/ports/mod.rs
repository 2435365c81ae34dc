//! Port definitions (hexagonal architecture interfaces)
//!
//! Ports are interfaces that the sync engine depends on, but whose
//! implementations are chosen by the process hosts.
//!
//! ## Ports Overview
//!
//! - [`SyncLogger`] - Operational log for lifecycle transitions, applied changes and errors

pub mod logger;

pub use logger::{FanoutLogger, NullLogger, SeverityFilter, Severity, SyncLogger};
