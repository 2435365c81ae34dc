//! Sync modes, file actions and service lifecycle states

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

// ============================================================================
// SyncMode
// ============================================================================

/// How the two configured folders relate to each other
///
/// The mode decides which folder is the *input* (priority) root and which is
/// the *output* (mirror) root, whether the output root is watched, and what
/// happens to output-only entries during reconciliation.
///
/// | mode | input root | watches output | orphans |
/// |---|---|---|---|
/// | `OneWay` | first | no | deleted |
/// | `TwoWaySourceFirst` | first | yes | copied back |
/// | `TwoWayDestFirst` | second | yes | copied back |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncMode {
    /// Mirror the first folder into the second; the second is never watched
    #[serde(alias = "one_way")]
    OneWay,
    /// Both folders are watched; the first folder wins
    #[serde(alias = "two_way_source_first")]
    TwoWaySourceFirst,
    /// Both folders are watched; the second folder wins
    #[serde(alias = "two_way_dest_first")]
    TwoWayDestFirst,
}

impl SyncMode {
    /// All known modes, in declaration order
    pub const ALL: [SyncMode; 3] = [
        SyncMode::OneWay,
        SyncMode::TwoWaySourceFirst,
        SyncMode::TwoWayDestFirst,
    ];

    /// Returns true for both two-way variants
    pub fn is_two_way(self) -> bool {
        !matches!(self, SyncMode::OneWay)
    }

    /// Returns true when the second configured folder is the input root
    pub fn second_is_input(self) -> bool {
        matches!(self, SyncMode::TwoWayDestFirst)
    }

    /// Returns true when output-only entries are removed during reconciliation
    pub fn removes_orphans(self) -> bool {
        matches!(self, SyncMode::OneWay)
    }

    /// Canonical name, as accepted by [`FromStr`]
    pub fn as_str(self) -> &'static str {
        match self {
            SyncMode::OneWay => "OneWay",
            SyncMode::TwoWaySourceFirst => "TwoWaySourceFirst",
            SyncMode::TwoWayDestFirst => "TwoWayDestFirst",
        }
    }
}

impl Default for SyncMode {
    fn default() -> Self {
        SyncMode::OneWay
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncMode {
    type Err = DomainError;

    /// Parses `OneWay`, `TwoWaySourceFirst`, `TwoWayDestFirst`, or their
    /// snake_case / kebab-case spellings
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "oneway" => Ok(SyncMode::OneWay),
            "twowaysourcefirst" => Ok(SyncMode::TwoWaySourceFirst),
            "twowaydestfirst" => Ok(SyncMode::TwoWayDestFirst),
            _ => Err(DomainError::UnknownSyncMode(s.to_string())),
        }
    }
}

// ============================================================================
// FileAction
// ============================================================================

/// Primitive applied by the directory operation engine to a single file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileAction {
    /// Copy source over destination (skipped when identical)
    Copy,
    /// Delete the source; no destination
    Delete,
    /// Move source to destination
    Move,
}

impl fmt::Display for FileAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FileAction::Copy => "copy",
            FileAction::Delete => "delete",
            FileAction::Move => "move",
        };
        f.write_str(s)
    }
}

// ============================================================================
// ServiceState
// ============================================================================

/// Lifecycle state of the synchronization service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    /// No worker, no watchers
    Stopped,
    /// Watchers armed, worker draining the queue
    Running,
    /// Worker idle and watchers disabled; subscriptions kept
    Paused,
}

impl ServiceState {
    /// Checks whether moving from `self` to `target` is a legal transition
    pub fn can_transition_to(self, target: ServiceState) -> bool {
        matches!(
            (self, target),
            (ServiceState::Stopped, ServiceState::Running)
                | (ServiceState::Running, ServiceState::Paused)
                | (ServiceState::Paused, ServiceState::Running)
                | (ServiceState::Running, ServiceState::Stopped)
                | (ServiceState::Paused, ServiceState::Stopped)
        )
    }

    /// Returns an error describing the transition unless it is legal
    pub fn transition(self, target: ServiceState) -> Result<ServiceState, DomainError> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(DomainError::InvalidState {
                from: self.to_string(),
                to: target.to_string(),
            })
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceState::Stopped => "Stopped",
            ServiceState::Running => "Running",
            ServiceState::Paused => "Paused",
        };
        f.write_str(s)
    }
}
