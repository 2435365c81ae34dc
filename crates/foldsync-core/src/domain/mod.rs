//! Domain entities
//!
//! This module contains the core domain types for foldsync:
//! - Change records and their kinds
//! - Sync modes, file actions and service states
//! - The input/output root pair with path translation
//! - Domain-specific error types

pub mod change;
pub mod errors;
pub mod mode;
pub mod roots;

// Re-export commonly used types
pub use change::{Change, ChangeKind};
pub use errors::DomainError;
pub use mode::{FileAction, ServiceState, SyncMode};
pub use roots::{RootPair, Side};
