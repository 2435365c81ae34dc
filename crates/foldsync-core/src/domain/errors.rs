//! Domain error types
//!
//! Errors raised while building domain values: unknown sync modes, unusable
//! root paths, and invalid lifecycle transitions.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// The sync mode selector is not one of the known modes
    #[error("Unknown sync mode: {0}")]
    UnknownSyncMode(String),

    /// A root path is blank or otherwise unusable
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// The two roots overlap (identical, or one nested inside the other)
    #[error("Overlapping roots: {first} and {second}")]
    OverlappingRoots {
        /// The first configured root
        first: String,
        /// The second configured root
        second: String,
    },

    /// Path is not inside either synchronized root
    #[error("Path not within a sync root: {0}")]
    PathNotInRoot(String),

    /// Invalid state transition attempt
    #[error("Invalid state transition from {from} to {to}")]
    InvalidState {
        /// The current state
        from: String,
        /// The attempted target state
        to: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DomainError::UnknownSyncMode("Sideways".to_string());
        assert_eq!(err.to_string(), "Unknown sync mode: Sideways");

        let err = DomainError::InvalidPath("".to_string());
        assert_eq!(err.to_string(), "Invalid path: ");

        let err = DomainError::InvalidState {
            from: "Stopped".to_string(),
            to: "Paused".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid state transition from Stopped to Paused"
        );
    }

    #[test]
    fn test_overlapping_roots_display() {
        let err = DomainError::OverlappingRoots {
            first: "/data".to_string(),
            second: "/data/mirror".to_string(),
        };
        assert_eq!(err.to_string(), "Overlapping roots: /data and /data/mirror");
    }

    #[test]
    fn test_error_equality() {
        let err1 = DomainError::InvalidPath("/path".to_string());
        let err2 = DomainError::InvalidPath("/path".to_string());
        let err3 = DomainError::InvalidPath("/other".to_string());

        assert_eq!(err1, err2);
        assert_ne!(err1, err3);
    }
}
