//! Filesystem watching for one sync root
//!
//! Provides a [`WatchAdapter`] that wraps the `notify` crate to monitor one
//! root recursively, converting raw OS events into [`Change`] values and
//! sending them through a bounded channel to the sync worker.
//!
//! ## Architecture
//!
//! ```text
//! inotify / kqueue / ReadDirectoryChangesW
//!       │
//!       ▼
//!  WatchAdapter callback ── enabled? ── ignored? ──→ mpsc::channel ──→ worker
//! ```
//!
//! The callback never blocks: when the channel is full the change is dropped
//! and reported through the [`SyncLogger`].
//!
//! ## Renames
//!
//! Backends report a rename as a `Name(From)` / `Name(To)` pair (inotify
//! follows up with a combined `Name(Both)`). A `From` is held back until its
//! partner arrives. A `From` without a partner, once the pairing window has
//! passed or another event has arrived, means the entry left the tree and is
//! reported as a deletion. A lone `To` means it entered the tree.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use foldsync_core::domain::Change;
use foldsync_core::ports::SyncLogger;
use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, trace, warn};

use crate::ignore::IgnoreSet;
use crate::SyncError;

// ============================================================================
// ChangeEvent enum
// ============================================================================

/// A filesystem change with absolute paths, before root-relative names are
/// attached
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// A new file or directory was created at the given path
    Created(PathBuf),
    /// An existing file was modified (content or metadata changed)
    Modified(PathBuf),
    /// A file or directory was deleted from the given path
    Deleted(PathBuf),
    /// A file or directory was renamed/moved
    Renamed {
        /// The original path before the rename
        old: PathBuf,
        /// The new path after the rename
        new: PathBuf,
    },
}

impl ChangeEvent {
    /// Returns the primary path associated with this event
    ///
    /// For rename events, this returns the new (destination) path.
    pub fn path(&self) -> &Path {
        match self {
            ChangeEvent::Created(p) => p,
            ChangeEvent::Modified(p) => p,
            ChangeEvent::Deleted(p) => p,
            ChangeEvent::Renamed { new, .. } => new,
        }
    }

    /// Converts into a [`Change`] with names relative to `root`
    ///
    /// Returns `None` when a path is not under `root`.
    pub fn into_change(self, root: &Path) -> Option<Change> {
        let name = |p: &Path| p.strip_prefix(root).ok().map(Path::to_path_buf);
        let change = match self {
            ChangeEvent::Created(p) => {
                let n = name(&p)?;
                Change::created(p, n)
            }
            ChangeEvent::Modified(p) => {
                let n = name(&p)?;
                Change::modified(p, n)
            }
            ChangeEvent::Deleted(p) => {
                let n = name(&p)?;
                Change::deleted(p, n)
            }
            ChangeEvent::Renamed { old, new } => {
                let old_name = name(&old)?;
                let new_name = name(&new)?;
                Change::renamed(old, old_name, new, new_name)
            }
        };
        Some(change)
    }
}

// ============================================================================
// Event mapping - notify::Event → ChangeEvent, with rename pairing
// ============================================================================

#[derive(Debug)]
struct PendingFrom {
    path: PathBuf,
    tracker: Option<usize>,
    at: Instant,
}

/// Stateful mapper from `notify` events to [`ChangeEvent`]s
#[derive(Debug)]
struct RenamePairer {
    window: Duration,
    pending: Option<PendingFrom>,
    /// Last `(old, new)` paired from a `From`/`To`, so the trailing `Both`
    /// is not reported twice
    last_pair: Option<(PathBuf, PathBuf)>,
}

impl RenamePairer {
    fn new(window: Duration) -> Self {
        Self {
            window,
            pending: None,
            last_pair: None,
        }
    }

    /// Maps one event; may also flush a held-back `From` as a deletion
    fn push(&mut self, event: &notify::Event, now: Instant) -> Vec<ChangeEvent> {
        let mut out = Vec::new();
        let paths = &event.paths;

        match &event.kind {
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                out.extend(self.take_pending());
                self.last_pair = None;
                if let Some(path) = paths.first() {
                    self.pending = Some(PendingFrom {
                        path: path.clone(),
                        tracker: event.tracker(),
                        at: now,
                    });
                }
            }

            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                let Some(new) = paths.first().cloned() else {
                    return out;
                };
                match self.pending.take() {
                    Some(from) if trackers_match(from.tracker, event.tracker()) => {
                        debug!(old = %from.path.display(), new = %new.display(), "Paired rename");
                        self.last_pair = Some((from.path.clone(), new.clone()));
                        out.push(ChangeEvent::Renamed {
                            old: from.path,
                            new,
                        });
                    }
                    Some(from) => {
                        out.push(ChangeEvent::Deleted(from.path));
                        out.push(ChangeEvent::Created(new));
                    }
                    None => out.push(ChangeEvent::Created(new)),
                }
            }

            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                out.extend(self.take_pending());
                if paths.len() >= 2 {
                    let old = paths[0].clone();
                    let new = paths[1].clone();
                    let duplicate = self
                        .last_pair
                        .take()
                        .is_some_and(|(o, n)| o == old && n == new);
                    if !duplicate {
                        out.push(ChangeEvent::Renamed { old, new });
                    }
                } else if let Some(path) = paths.first() {
                    // Fallback: treat as a modification of the first path
                    out.push(ChangeEvent::Modified(path.clone()));
                }
            }

            EventKind::Modify(ModifyKind::Name(_)) => {
                // Backends that cannot tell the two sides apart
                out.extend(self.take_pending());
                if let Some(path) = paths.first() {
                    if path.exists() {
                        out.push(ChangeEvent::Created(path.clone()));
                    } else {
                        out.push(ChangeEvent::Deleted(path.clone()));
                    }
                }
            }

            EventKind::Create(_) => {
                out.extend(self.take_pending());
                out.extend(paths.first().cloned().map(ChangeEvent::Created));
            }

            EventKind::Modify(_) => {
                out.extend(self.take_pending());
                out.extend(paths.first().cloned().map(ChangeEvent::Modified));
            }

            EventKind::Remove(_) => {
                out.extend(self.take_pending());
                out.extend(paths.first().cloned().map(ChangeEvent::Deleted));
            }

            // Ignore access events and other event types
            _ => {
                trace!(kind = ?event.kind, "Ignoring event kind");
            }
        }

        out
    }

    /// Emits a held-back `From` as a deletion once the window has passed
    fn flush_expired(&mut self, now: Instant) -> Option<ChangeEvent> {
        let expired = self
            .pending
            .as_ref()
            .is_some_and(|p| now.duration_since(p.at) >= self.window);
        if expired {
            self.take_pending()
        } else {
            None
        }
    }

    fn take_pending(&mut self) -> Option<ChangeEvent> {
        self.pending.take().map(|p| {
            debug!(path = %p.path.display(), "Unpaired rename source, treating as deleted");
            ChangeEvent::Deleted(p.path)
        })
    }

    fn reset(&mut self) {
        self.pending = None;
        self.last_pair = None;
    }
}

fn trackers_match(from: Option<usize>, to: Option<usize>) -> bool {
    match (from, to) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    }
}

// ============================================================================
// WatchSink - where an adapter delivers
// ============================================================================

/// Destination shared by every adapter of one service
#[derive(Clone)]
pub struct WatchSink {
    tx: mpsc::Sender<Change>,
    ignore: Arc<IgnoreSet>,
    logger: Arc<dyn SyncLogger>,
}

impl WatchSink {
    /// Creates a sink writing to `tx`, filtered by `ignore`
    pub fn new(
        tx: mpsc::Sender<Change>,
        ignore: Arc<IgnoreSet>,
        logger: Arc<dyn SyncLogger>,
    ) -> Self {
        Self { tx, ignore, logger }
    }
}

struct Shared {
    root: PathBuf,
    enabled: AtomicBool,
    pairer: Mutex<RenamePairer>,
    sink: WatchSink,
}

impl Shared {
    fn pairer(&self) -> MutexGuard<'_, RenamePairer> {
        self.pairer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handle(&self, res: notify::Result<notify::Event>) {
        match res {
            Ok(event) => {
                if !self.enabled.load(Ordering::SeqCst) {
                    return;
                }
                let mapped = self.pairer().push(&event, Instant::now());
                for change in mapped {
                    self.deliver(change);
                }
            }
            Err(err) => {
                let err = SyncError::NotificationSource(err.to_string());
                warn!(root = %self.root.display(), error = %err, "File watcher error");
                self.sink.logger.log_error(&err.to_string());
            }
        }
    }

    fn deliver(&self, event: ChangeEvent) {
        if !self.enabled.load(Ordering::SeqCst) {
            return;
        }

        let ignored = match &event {
            ChangeEvent::Renamed { old, new } => {
                self.sink.ignore.is_ignored(old) || self.sink.ignore.is_ignored(new)
            }
            other => self.sink.ignore.is_ignored(other.path()),
        };
        if ignored {
            trace!(event = ?event, "Suppressed echo");
            return;
        }

        let Some(change) = event.into_change(&self.root) else {
            return;
        };

        match self.sink.tx.try_send(change) {
            Ok(()) => {}
            Err(TrySendError::Full(change)) => {
                let err = SyncError::NotificationSource(format!(
                    "notification buffer full, dropped {change}"
                ));
                warn!(root = %self.root.display(), error = %err, "Change dropped");
                self.sink.logger.log_error(&err.to_string());
            }
            Err(TrySendError::Closed(change)) => {
                debug!(change = %change, "Receiver dropped, discarding change");
            }
        }
    }
}

// ============================================================================
// WatchAdapter
// ============================================================================

/// Watches one root directory recursively
///
/// Created disabled; call [`enable`](WatchAdapter::enable) to start
/// delivering. Disabling keeps the OS subscription alive.
pub struct WatchAdapter {
    shared: Arc<Shared>,
    watcher: Mutex<Option<RecommendedWatcher>>,
}

impl WatchAdapter {
    /// Subscribes to `root` and delivers its changes to `sink`
    ///
    /// # Errors
    /// Returns an error if the underlying OS watcher cannot be created or the
    /// root cannot be watched (missing, permissions, inotify watch limit).
    pub fn new(root: &Path, sink: WatchSink, rename_window: Duration) -> Result<Self> {
        let shared = Arc::new(Shared {
            root: root.to_path_buf(),
            enabled: AtomicBool::new(false),
            pairer: Mutex::new(RenamePairer::new(rename_window)),
            sink,
        });

        let callback_state = Arc::clone(&shared);
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| callback_state.handle(res),
            notify::Config::default(),
        )
        .context("Failed to create file watcher")?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch path: {}", root.display()))?;
        info!(path = %root.display(), "Started recursive watch");

        Ok(Self {
            shared,
            watcher: Mutex::new(Some(watcher)),
        })
    }

    /// The watched root
    pub fn root(&self) -> &Path {
        &self.shared.root
    }

    /// Resumes delivery
    pub fn enable(&self) {
        self.shared.enabled.store(true, Ordering::SeqCst);
        trace!(root = %self.shared.root.display(), "Watcher enabled");
    }

    /// Suspends delivery and forgets any half-seen rename
    pub fn disable(&self) {
        self.shared.enabled.store(false, Ordering::SeqCst);
        self.shared.pairer().reset();
        trace!(root = %self.shared.root.display(), "Watcher disabled");
    }

    /// Returns true while changes are being delivered
    pub fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::SeqCst)
    }

    /// Delivers a held-back rename source whose pairing window has passed
    pub fn flush_pending(&self) {
        let expired = self.shared.pairer().flush_expired(Instant::now());
        if let Some(event) = expired {
            self.shared.deliver(event);
        }
    }

    /// Tears down the OS subscription; further calls are no-ops
    pub fn dispose(&self) {
        self.shared.enabled.store(false, Ordering::SeqCst);
        let watcher = self
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut watcher) = watcher {
            if let Err(e) = watcher.unwatch(&self.shared.root) {
                debug!(error = %e, "Unwatch failed during dispose");
            }
            info!(path = %self.shared.root.display(), "Stopped watch");
        }
    }

    /// Returns true once [`dispose`](WatchAdapter::dispose) has run
    pub fn is_disposed(&self) -> bool {
        self.watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl Drop for WatchAdapter {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for WatchAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchAdapter")
            .field("root", &self.shared.root)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}
