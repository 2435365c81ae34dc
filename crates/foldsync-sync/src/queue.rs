//! Pending change queue with coalescing
//!
//! The [`ChangeQueue`] is a FIFO of [`Change`] records shared between the
//! channel drain and the worker. Every mutation happens under one mutex, and
//! the lock is never held across filesystem I/O.
//!
//! ## Coalescing rules
//!
//! Applied to the *remaining* entries each time one is dequeued:
//!
//! 1. Dequeued `Modified`: among queued `Modified` entries only the first
//!    occurrence of each `(path, name)` pair survives. Everything else keeps
//!    its relative order.
//! 2. Dequeued `Created` on a directory `D`: queued `Created`/`Modified`
//!    entries strictly below `D` are dropped, because the tree copy already
//!    covers them.
//! 3. Dequeued `Created` on a file `F`: queued `Modified` entries for `F` are
//!    dropped.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use foldsync_core::domain::{Change, ChangeKind};
use tracing::debug;

/// Lock-protected FIFO of pending changes
#[derive(Debug, Default)]
pub struct ChangeQueue {
    inner: Mutex<VecDeque<Change>>,
}

impl ChangeQueue {
    /// Creates an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Change>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a change at the back
    pub fn enqueue(&self, change: Change) {
        self.lock().push_back(change);
    }

    /// Removes and returns the change at the front
    pub fn dequeue(&self) -> Option<Change> {
        self.lock().pop_front()
    }

    /// Removes the front change and coalesces the remainder against it
    ///
    /// `is_directory` is consulted only for `Created` changes; it is evaluated
    /// before the lock is taken for the coalescing pass.
    pub fn dequeue_coalesced(&self, is_directory: impl Fn(&Path) -> bool) -> Option<Change> {
        let change = self.dequeue()?;
        let dir = change.kind == ChangeKind::Created && is_directory(&change.path);
        self.coalesce(&change, dir);
        Some(change)
    }

    /// Applies the coalescing rules for `dequeued` to the queued entries
    ///
    /// Returns the number of entries removed.
    pub fn coalesce(&self, dequeued: &Change, is_directory: bool) -> usize {
        let mut queue = self.lock();
        let before = queue.len();

        match dequeued.kind {
            ChangeKind::Modified => {
                let mut seen: HashSet<(PathBuf, PathBuf)> = HashSet::new();
                queue.retain(|c| {
                    c.kind != ChangeKind::Modified
                        || seen.insert((c.path.clone(), c.name.clone()))
                });
            }
            ChangeKind::Created if is_directory => {
                queue.retain(|c| {
                    !(matches!(c.kind, ChangeKind::Created | ChangeKind::Modified)
                        && c.is_nested_under(&dequeued.path))
                });
            }
            ChangeKind::Created => {
                queue.retain(|c| !(c.kind == ChangeKind::Modified && c.path == dequeued.path));
            }
            ChangeKind::Deleted | ChangeKind::Renamed => {}
        }

        let removed = before - queue.len();
        if removed > 0 {
            debug!(
                change = %dequeued,
                removed,
                remaining = queue.len(),
                "Coalesced pending changes"
            );
        }
        removed
    }

    /// Drops every pending change
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of pending changes
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if nothing is pending
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of the pending changes, front first
    pub fn snapshot(&self) -> Vec<Change> {
        self.lock().iter().cloned().collect()
    }
}
