//! Directory operation engine
//!
//! Recursive copy, move and delete between two paths, built from a single
//! per-file primitive ([`DirectoryOps::apply_file_action`]).
//!
//! ## Design Decisions
//!
//! - **Busy files**: before a file is touched, every existing path involved is
//!   locked exclusively with an advisory lock (`fs2`). A lock held elsewhere
//!   makes the engine retry every `interval` until `timeout` elapses.
//! - **Cancellation**: the busy wait checks a shared interrupt flag between
//!   attempts, so pause/stop never waits out the full busy timeout.
//! - **Ordering**: copy and move create the destination directory before
//!   descending; delete and move remove the source directory after its
//!   children.
//! - **Symlinks** are never followed. Copy skips them, move renames them,
//!   delete unlinks them.
//! - **Move overwrites**: an existing destination is replaced.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use foldsync_core::config::EngineConfig;
use foldsync_core::domain::FileAction;
use fs2::FileExt;
use serde::Serialize;
use tracing::{debug, instrument, trace, warn};

use crate::SyncError;

/// Buffer size used when comparing file contents
const COMPARE_CHUNK: usize = 64 * 1024;

// ============================================================================
// BusyWait
// ============================================================================

/// Retry policy for files locked by another process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusyWait {
    /// Delay between lock attempts
    pub interval: Duration,
    /// Total time budget before giving up
    pub timeout: Duration,
}

impl Default for BusyWait {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(200),
            timeout: Duration::from_secs(60),
        }
    }
}

impl BusyWait {
    /// Creates a policy with the given interval and timeout
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Blocks until every existing path in `paths` can be locked exclusively
    ///
    /// Paths that do not exist are skipped. Locks are released again before
    /// returning.
    ///
    /// # Errors
    /// - [`SyncError::BusyTimeout`] when a path stays locked for `timeout`
    /// - [`SyncError::Interrupted`] when `cancel` is raised while waiting
    /// - [`SyncError::OperationFailure`] when a path cannot be opened
    pub fn wait(&self, paths: &[&Path], cancel: &AtomicBool) -> Result<(), SyncError> {
        let start = Instant::now();
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            let busy = match try_lock_all(paths)? {
                None => {
                    if attempts > 1 {
                        debug!(attempts, waited = ?start.elapsed(), "Busy file released");
                    }
                    return Ok(());
                }
                Some(path) => path,
            };

            let waited = start.elapsed();
            if waited >= self.timeout {
                warn!(path = %busy.display(), ?waited, attempts, "Gave up waiting for busy file");
                return Err(SyncError::BusyTimeout { path: busy, waited });
            }
            if cancel.load(Ordering::SeqCst) {
                debug!(path = %busy.display(), "Busy wait interrupted");
                return Err(SyncError::Interrupted);
            }

            trace!(path = %busy.display(), attempts, "File busy, retrying");
            thread::sleep(self.interval.min(self.timeout - waited));
        }
    }
}

/// Tries to lock every existing path; returns the first busy one
fn try_lock_all(paths: &[&Path]) -> Result<Option<PathBuf>, SyncError> {
    let mut held = Vec::with_capacity(paths.len());

    for path in paths {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => return Err(SyncError::operation("open", *path, e)),
        };

        match file.try_lock_exclusive() {
            Ok(()) => held.push(file),
            Err(e) if is_contended(&e) => return Ok(Some(path.to_path_buf())),
            Err(e) => {
                // Filesystems without advisory locks cannot report busy files
                trace!(path = %path.display(), error = %e, "Lock unsupported, treating as free");
            }
        }
    }

    for file in &held {
        let _ = file.unlock();
    }
    Ok(None)
}

fn is_contended(err: &io::Error) -> bool {
    err.kind() == ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

// ============================================================================
// Content comparison
// ============================================================================

/// Returns true when both files have the same length and identical bytes
pub fn files_identical(a: &Path, b: &Path) -> io::Result<bool> {
    if fs::metadata(a)?.len() != fs::metadata(b)?.len() {
        return Ok(false);
    }

    let mut ra = BufReader::with_capacity(COMPARE_CHUNK, File::open(a)?);
    let mut rb = BufReader::with_capacity(COMPARE_CHUNK, File::open(b)?);

    loop {
        let ba = ra.fill_buf()?;
        let bb = rb.fill_buf()?;
        if ba.is_empty() && bb.is_empty() {
            return Ok(true);
        }
        let n = ba.len().min(bb.len());
        if n == 0 || ba[..n] != bb[..n] {
            return Ok(false);
        }
        ra.consume(n);
        rb.consume(n);
    }
}

// ============================================================================
// CopyStats
// ============================================================================

/// Counters collected by [`DirectoryOps::copy_tree`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CopyStats {
    /// Files whose content was written
    pub files_copied: usize,
    /// Files skipped because the destination was already identical
    pub files_skipped: usize,
    /// Directories created under the destination
    pub dirs_created: usize,
}

// ============================================================================
// DirectoryOps
// ============================================================================

/// Busy-file-aware recursive file operations
#[derive(Debug, Clone)]
pub struct DirectoryOps {
    busy: BusyWait,
    compare_before_copy: bool,
    interrupt: Arc<AtomicBool>,
}

impl Default for DirectoryOps {
    fn default() -> Self {
        Self::new(BusyWait::default(), true)
    }
}

impl DirectoryOps {
    /// Creates an engine with its own (never raised) interrupt flag
    pub fn new(busy: BusyWait, compare_before_copy: bool) -> Self {
        Self {
            busy,
            compare_before_copy,
            interrupt: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Builds the engine from the `engine` configuration section
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            BusyWait::new(
                Duration::from_millis(config.busy_retry_interval_ms),
                Duration::from_millis(config.busy_timeout_ms),
            ),
            config.compare_before_copy,
        )
    }

    /// Shares `flag` as the interrupt observed by busy waits
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = flag;
        self
    }

    /// The busy-wait policy in use
    pub fn busy_wait(&self) -> BusyWait {
        self.busy
    }

    /// Waits until `source` and `destination` (when given) are not busy
    pub fn open_both_and_wait_if_busy(
        &self,
        source: &Path,
        destination: Option<&Path>,
    ) -> Result<(), SyncError> {
        match destination {
            Some(dest) => self.busy.wait(&[source, dest], &self.interrupt),
            None => self.busy.wait(&[source], &self.interrupt),
        }
    }

    /// Applies `action` to one file
    ///
    /// `Copy` and `Move` require `destination`; `Delete` ignores it. Returns
    /// `false` when nothing had to be done (identical copy, file already gone).
    #[instrument(skip_all, fields(source = %source.display()))]
    pub fn apply_file_action(
        &self,
        source: &Path,
        destination: Option<&Path>,
        action: FileAction,
    ) -> Result<bool, SyncError> {
        match (action, destination) {
            (FileAction::Copy, Some(dest)) => self.copy_file(source, dest),
            (FileAction::Move, Some(dest)) => self.move_file(source, dest).map(|()| true),
            (FileAction::Delete, _) => self.delete_file(source),
            (_, None) => Err(SyncError::operation(
                "file action",
                source,
                io::Error::new(
                    ErrorKind::InvalidInput,
                    format!("{action} requires a destination"),
                ),
            )),
        }
    }

    fn copy_file(&self, source: &Path, dest: &Path) -> Result<bool, SyncError> {
        self.open_both_and_wait_if_busy(source, Some(dest))?;

        if self.compare_before_copy && dest.is_file() {
            let same =
                files_identical(source, dest).map_err(|e| SyncError::operation("compare", source, e))?;
            if same {
                trace!(dest = %dest.display(), "Destination identical, skipping copy");
                return Ok(false);
            }
        }

        if dest.is_dir() {
            self.delete_tree(dest)?;
        }
        ensure_parent(dest)?;
        fs::copy(source, dest).map_err(|e| SyncError::operation("copy", source, e))?;
        debug!(dest = %dest.display(), "Copied file");
        Ok(true)
    }

    fn move_file(&self, source: &Path, dest: &Path) -> Result<(), SyncError> {
        self.open_both_and_wait_if_busy(source, Some(dest))?;

        if dest.is_dir() {
            self.delete_tree(dest)?;
        }
        ensure_parent(dest)?;

        if let Err(rename_err) = fs::rename(source, dest) {
            debug!(error = %rename_err, "Rename failed, falling back to copy and delete");
            fs::copy(source, dest).map_err(|_| SyncError::operation("move", source, rename_err))?;
            fs::remove_file(source).map_err(|e| SyncError::operation("remove", source, e))?;
        }
        debug!(dest = %dest.display(), "Moved file");
        Ok(())
    }

    fn delete_file(&self, path: &Path) -> Result<bool, SyncError> {
        self.open_both_and_wait_if_busy(path, None)?;
        match fs::remove_file(path) {
            Ok(()) => {
                debug!(path = %path.display(), "Deleted file");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SyncError::operation("remove", path, e)),
        }
    }

    /// Copies `source` (file or directory tree) onto `dest`
    #[instrument(skip_all, fields(source = %source.display(), dest = %dest.display()))]
    pub fn copy_tree(&self, source: &Path, dest: &Path) -> Result<CopyStats, SyncError> {
        let mut stats = CopyStats::default();
        self.copy_tree_into(source, dest, &mut stats)?;
        Ok(stats)
    }

    fn copy_tree_into(
        &self,
        source: &Path,
        dest: &Path,
        stats: &mut CopyStats,
    ) -> Result<(), SyncError> {
        let meta =
            fs::symlink_metadata(source).map_err(|e| SyncError::operation("stat", source, e))?;

        if meta.is_file() {
            if self.copy_file(source, dest)? {
                stats.files_copied += 1;
            } else {
                stats.files_skipped += 1;
            }
            return Ok(());
        }
        if !meta.is_dir() {
            trace!(path = %source.display(), "Skipping symlink or special file");
            return Ok(());
        }

        if dest.exists() && !dest.is_dir() {
            self.delete_tree(dest)?;
        }
        if !dest.is_dir() {
            fs::create_dir_all(dest).map_err(|e| SyncError::operation("create_dir", dest, e))?;
            stats.dirs_created += 1;
        }

        for entry in sorted_entries(source)? {
            let name = entry.file_name().ok_or_else(|| {
                SyncError::operation("read_dir", source, io::Error::from(ErrorKind::InvalidData))
            })?;
            self.copy_tree_into(&entry, &dest.join(name), stats)?;
        }
        Ok(())
    }

    /// Moves `source` (file or directory tree) to `dest`, replacing what is there
    #[instrument(skip_all, fields(source = %source.display(), dest = %dest.display()))]
    pub fn move_tree(&self, source: &Path, dest: &Path) -> Result<(), SyncError> {
        let meta =
            fs::symlink_metadata(source).map_err(|e| SyncError::operation("stat", source, e))?;

        if meta.is_file() {
            return self.move_file(source, dest);
        }
        if !meta.is_dir() {
            ensure_parent(dest)?;
            return fs::rename(source, dest).map_err(|e| SyncError::operation("move", source, e));
        }

        if dest.exists() && !dest.is_dir() {
            self.delete_tree(dest)?;
        }
        fs::create_dir_all(dest).map_err(|e| SyncError::operation("create_dir", dest, e))?;

        for entry in sorted_entries(source)? {
            if let Some(name) = entry.file_name() {
                self.move_tree(&entry, &dest.join(name))?;
            }
        }
        fs::remove_dir(source).map_err(|e| SyncError::operation("remove_dir", source, e))?;
        Ok(())
    }

    /// Deletes `path` (file or directory tree); a missing path is not an error
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn delete_tree(&self, path: &Path) -> Result<(), SyncError> {
        let meta = match fs::symlink_metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(SyncError::operation("stat", path, e)),
        };

        if meta.is_file() {
            self.delete_file(path)?;
        } else if meta.is_dir() {
            for entry in sorted_entries(path)? {
                self.delete_tree(&entry)?;
            }
            fs::remove_dir(path).map_err(|e| SyncError::operation("remove_dir", path, e))?;
        } else {
            fs::remove_file(path).map_err(|e| SyncError::operation("remove", path, e))?;
        }
        Ok(())
    }

    /// Deletes entries under `dest_root` that have no counterpart under `source_root`
    ///
    /// Returns the number of top-most entries removed (a removed directory
    /// counts once).
    #[instrument(skip_all, fields(source = %source_root.display(), dest = %dest_root.display()))]
    pub fn remove_orphans(&self, source_root: &Path, dest_root: &Path) -> Result<usize, SyncError> {
        if !dest_root.is_dir() {
            return Ok(0);
        }

        let mut removed = 0;
        for dest_entry in sorted_entries(dest_root)? {
            let Some(name) = dest_entry.file_name() else {
                continue;
            };
            let source_entry = source_root.join(name);

            match fs::symlink_metadata(&source_entry) {
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!(orphan = %dest_entry.display(), "Removing orphan");
                    self.delete_tree(&dest_entry)?;
                    removed += 1;
                }
                Err(e) => return Err(SyncError::operation("stat", &source_entry, e)),
                Ok(meta) if meta.is_dir() && dest_entry.is_dir() => {
                    removed += self.remove_orphans(&source_entry, &dest_entry)?;
                }
                Ok(_) => {}
            }
        }
        Ok(removed)
    }
}

fn ensure_parent(path: &Path) -> Result<(), SyncError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|e| SyncError::operation("create_dir", parent, e))
        }
        _ => Ok(()),
    }
}

/// Directory entries sorted by name, for deterministic traversal
fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, SyncError> {
    let read = fs::read_dir(dir).map_err(|e| SyncError::operation("read_dir", dir, e))?;
    let mut entries = read
        .map(|entry| entry.map(|e| e.path()))
        .collect::<io::Result<Vec<_>>>()
        .map_err(|e| SyncError::operation("read_dir", dir, e))?;
    entries.sort();
    Ok(entries)
}
