//! Change records flowing from the watchers to the sync worker
//!
//! A [`Change`] is created by a watcher callback (or by the worker when it
//! requeues a failed change) and consumed by the worker once it has been
//! applied or parked as a dead letter.

use std::{
    fmt,
    path::{Path, PathBuf},
};

/// Kind of filesystem change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChangeKind {
    /// A file or directory appeared
    Created,
    /// File content or metadata changed
    Modified,
    /// A file or directory disappeared
    Deleted,
    /// A file or directory was renamed inside the same root
    Renamed,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChangeKind::Created => "created",
            ChangeKind::Modified => "modified",
            ChangeKind::Deleted => "deleted",
            ChangeKind::Renamed => "renamed",
        };
        f.write_str(s)
    }
}

/// A pending filesystem change observed under one of the two roots
///
/// `name` is the path relative to the root the change was observed in.
/// `old_path` / `old_name` are only set for [`ChangeKind::Renamed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    /// What happened
    pub kind: ChangeKind,
    /// Absolute path of the affected entry (new path for renames)
    pub path: PathBuf,
    /// Path relative to the watched root
    pub name: PathBuf,
    /// Absolute path before a rename
    pub old_path: Option<PathBuf>,
    /// Root-relative path before a rename
    pub old_name: Option<PathBuf>,
    /// Number of failed processing attempts so far
    pub retry_count: u32,
}

impl Change {
    fn new(kind: ChangeKind, path: PathBuf, name: PathBuf) -> Self {
        Self {
            kind,
            path,
            name,
            old_path: None,
            old_name: None,
            retry_count: 0,
        }
    }

    /// Creates a `Created` change
    pub fn created(path: impl Into<PathBuf>, name: impl Into<PathBuf>) -> Self {
        Self::new(ChangeKind::Created, path.into(), name.into())
    }

    /// Creates a `Modified` change
    pub fn modified(path: impl Into<PathBuf>, name: impl Into<PathBuf>) -> Self {
        Self::new(ChangeKind::Modified, path.into(), name.into())
    }

    /// Creates a `Deleted` change
    pub fn deleted(path: impl Into<PathBuf>, name: impl Into<PathBuf>) -> Self {
        Self::new(ChangeKind::Deleted, path.into(), name.into())
    }

    /// Creates a `Renamed` change from `old_*` to the new location
    pub fn renamed(
        old_path: impl Into<PathBuf>,
        old_name: impl Into<PathBuf>,
        path: impl Into<PathBuf>,
        name: impl Into<PathBuf>,
    ) -> Self {
        let mut change = Self::new(ChangeKind::Renamed, path.into(), name.into());
        change.old_path = Some(old_path.into());
        change.old_name = Some(old_name.into());
        change
    }

    /// Returns true when this change affects an entry strictly below `dir`
    ///
    /// Comparison is component-wise, so `/a/bc` is not nested under `/a/b`.
    pub fn is_nested_under(&self, dir: &Path) -> bool {
        self.path != dir && self.path.starts_with(dir)
    }

    /// Consumes the change and returns it with the retry counter bumped
    pub fn into_retry(mut self) -> Self {
        self.retry_count += 1;
        self
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.kind, &self.old_path) {
            (ChangeKind::Renamed, Some(old)) => write!(
                f,
                "{} -> {} ({})",
                old.display(),
                self.path.display(),
                self.kind
            ),
            _ => write!(f, "{} ({})", self.path.display(), self.kind),
        }
    }
}
