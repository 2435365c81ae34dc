//! Echo suppression
//!
//! Before the worker writes into a watched root it registers the paths it is
//! about to touch here; watcher callbacks drop notifications for registered
//! paths. Folder entries match the folder and everything below it, file
//! entries match exactly.
//!
//! `notify` delivers kernel events on its own thread, so an echo can arrive
//! after the write has returned. Entries therefore outlive their
//! [`SuppressionGuard`] by a settle window before they expire.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    Folder,
    File,
}

#[derive(Debug)]
struct Entry {
    id: u64,
    kind: EntryKind,
    path: PathBuf,
    /// `None` while the owning guard is alive
    expires_at: Option<Instant>,
}

impl Entry {
    fn matches(&self, path: &Path) -> bool {
        match self.kind {
            EntryKind::Folder => path.starts_with(&self.path),
            EntryKind::File => path == self.path,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    entries: Vec<Entry>,
}

impl Inner {
    fn purge(&mut self, now: Instant) {
        self.entries
            .retain(|e| e.expires_at.map_or(true, |deadline| deadline > now));
    }
}

/// Transient folder-prefix and exact-file ignore lists
#[derive(Debug)]
pub struct IgnoreSet {
    inner: Mutex<Inner>,
    settle: Duration,
}

impl IgnoreSet {
    /// Creates an empty set whose released entries linger for `settle`
    pub fn new(settle: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            settle,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers folder prefixes and exact file paths until the guard is dropped
    pub fn suppress(&self, folders: &[PathBuf], files: &[PathBuf]) -> SuppressionGuard<'_> {
        let mut inner = self.lock();
        let mut ids = Vec::with_capacity(folders.len() + files.len());

        let tagged = folders
            .iter()
            .map(|p| (EntryKind::Folder, p))
            .chain(files.iter().map(|p| (EntryKind::File, p)));
        for (kind, path) in tagged {
            let id = inner.next_id;
            inner.next_id += 1;
            inner.entries.push(Entry {
                id,
                kind,
                path: path.clone(),
                expires_at: None,
            });
            ids.push(id);
        }

        trace!(
            folders = folders.len(),
            files = files.len(),
            "Suppressing notifications"
        );
        SuppressionGuard { set: self, ids }
    }

    /// Returns true if notifications for `path` must be dropped
    pub fn is_ignored(&self, path: &Path) -> bool {
        let mut inner = self.lock();
        inner.purge(Instant::now());
        inner.entries.iter().any(|e| e.matches(path))
    }

    /// Drops every entry, active or settling
    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    /// Number of entries still registered (active or settling)
    pub fn len(&self) -> usize {
        let mut inner = self.lock();
        inner.purge(Instant::now());
        inner.entries.len()
    }

    /// Returns true when nothing is suppressed
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release(&self, ids: &[u64]) {
        let deadline = Instant::now() + self.settle;
        let mut inner = self.lock();
        for entry in inner.entries.iter_mut().filter(|e| ids.contains(&e.id)) {
            entry.expires_at = Some(deadline);
        }
    }
}

/// Keeps a set of ignore entries active; starts their settle window on drop
#[derive(Debug)]
#[must_use = "entries start expiring as soon as the guard is dropped"]
pub struct SuppressionGuard<'a> {
    set: &'a IgnoreSet,
    ids: Vec<u64>,
}

impl Drop for SuppressionGuard<'_> {
    fn drop(&mut self) {
        self.set.release(&self.ids);
    }
}
