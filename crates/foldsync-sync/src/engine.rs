//! Sync service - watchers, queue and a single worker
//!
//! The [`SyncService`] keeps an *output* root in line with an *input* root
//! (and, in the two-way modes, carries output-side changes back). It owns:
//!
//! - one [`WatchAdapter`] per watched root
//! - the [`ChangeQueue`] and the bounded channel feeding it
//! - the [`IgnoreSet`] used for echo suppression
//! - one worker thread, the only writer of both trees
//!
//! ## Lifecycle
//!
//! ```text
//! Stopped ──start──→ Running ──pause──→ Paused
//!    ↑                 │  ↑               │
//!    └──────stop───────┘  └───resume──────┤
//!    └────────────────────stop────────────┘
//! ```
//!
//! Invalid requests are logged as warnings and ignored. Pause and stop are
//! cooperative: the worker finishes the change in hand (a busy-file wait is
//! cut short) and acknowledges before the backlog is discarded.
//!
//! ## Dispatch
//!
//! | kind | input-root event | output-root event |
//! |---|---|---|
//! | Created | copy to output | copy to input |
//! | Modified | copy to output | restore from input counterpart |
//! | Renamed | move the mirrored entry | move back to the old name |
//! | Deleted | delete the mirrored entry | restore from input counterpart |
//!
//! Failed changes are retried up to `max_retries` times, then parked as
//! [`DeadLetter`]s.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Utc};
use foldsync_core::config::Config;
use foldsync_core::domain::{
    Change, ChangeKind, DomainError, FileAction, RootPair, ServiceState, Side, SyncMode,
};
use foldsync_core::ports::SyncLogger;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use crate::fileops::{BusyWait, DirectoryOps};
use crate::ignore::IgnoreSet;
use crate::queue::ChangeQueue;
use crate::reconcile::reconcile;
use crate::watcher::{WatchAdapter, WatchSink};
use crate::SyncError;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// SyncOptions
// ============================================================================

/// Tunables for one [`SyncService`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Capacity of the watcher → worker channel
    pub buffer_size: usize,
    /// How long a rename source waits for its partner
    pub rename_pair_window: Duration,
    /// Busy-file retry policy
    pub busy: BusyWait,
    /// Failed attempts allowed before a change becomes a dead letter
    pub max_retries: u32,
    /// Worker sleep when there is nothing to do
    pub idle_poll: Duration,
    /// Control-thread poll while waiting for the worker to acknowledge
    pub interrupt_poll: Duration,
    /// How long self-written paths stay ignored after a write
    pub echo_settle: Duration,
    /// Skip copies onto identical destinations
    pub compare_before_copy: bool,
    /// Maximum number of dead letters kept
    pub dead_letter_capacity: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl SyncOptions {
    /// Reads the `watcher` and `engine` sections
    pub fn from_config(config: &Config) -> Self {
        let engine = &config.engine;
        Self {
            buffer_size: config.watcher.buffer_size,
            rename_pair_window: Duration::from_millis(config.watcher.rename_pair_window_ms),
            busy: BusyWait::new(
                Duration::from_millis(engine.busy_retry_interval_ms),
                Duration::from_millis(engine.busy_timeout_ms),
            ),
            max_retries: engine.max_retries,
            idle_poll: Duration::from_millis(engine.idle_poll_ms),
            interrupt_poll: Duration::from_millis(engine.interrupt_poll_ms),
            echo_settle: Duration::from_millis(engine.echo_settle_ms),
            compare_before_copy: engine.compare_before_copy,
            dead_letter_capacity: engine.dead_letter_capacity,
        }
    }

    fn validate(&self) -> Result<(), SyncError> {
        let invalid = |msg: &str| Err(SyncError::InvalidConfiguration(msg.to_string()));
        if self.buffer_size == 0 {
            return invalid("buffer_size must be greater than 0");
        }
        if self.idle_poll.is_zero() || self.interrupt_poll.is_zero() {
            return invalid("poll intervals must be greater than 0");
        }
        if self.busy.interval.is_zero() || self.busy.interval >= self.busy.timeout {
            return invalid("busy retry interval must be non-zero and below the busy timeout");
        }
        Ok(())
    }
}

// ============================================================================
// DeadLetter
// ============================================================================

/// A change that exhausted its retries
#[derive(Debug, Clone)]
pub struct DeadLetter {
    /// The change, with its final retry count
    pub change: Change,
    /// The last failure
    pub error: String,
    /// When it was parked
    pub parked_at: DateTime<Utc>,
}

// ============================================================================
// Shared worker state
// ============================================================================

struct WorkerShared {
    queue: ChangeQueue,
    ignore: Arc<IgnoreSet>,
    /// Raised by pause and stop; also observed by busy-file waits
    interrupt: Arc<AtomicBool>,
    shutdown: AtomicBool,
    /// Bumped by every pause/stop request
    requested: AtomicU64,
    /// Last request the worker has acknowledged
    acknowledged: AtomicU64,
    receiver: Mutex<Option<mpsc::Receiver<Change>>>,
    dead_letters: Mutex<VecDeque<DeadLetter>>,
}

impl WorkerShared {
    fn acknowledge(&self) {
        let request = self.requested.load(Ordering::SeqCst);
        self.acknowledged.store(request, Ordering::SeqCst);
    }

    /// Moves everything waiting on the channel into the queue
    fn drain_channel(&self) -> usize {
        let mut receiver = lock(&self.receiver);
        let Some(rx) = receiver.as_mut() else {
            return 0;
        };
        let mut moved = 0;
        while let Ok(change) = rx.try_recv() {
            self.queue.enqueue(change);
            moved += 1;
        }
        moved
    }

    /// Drops the queue, the channel backlog and the ignore lists
    fn discard_backlog(&self) {
        if let Some(rx) = lock(&self.receiver).as_mut() {
            while rx.try_recv().is_ok() {}
        }
        self.queue.clear();
        self.ignore.clear();
    }

    fn park(&self, letter: DeadLetter, capacity: usize) {
        let mut letters = lock(&self.dead_letters);
        letters.push_back(letter);
        while letters.len() > capacity {
            letters.pop_front();
        }
    }
}

// ============================================================================
// Watchers
// ============================================================================

#[derive(Clone, Default)]
struct Watchers {
    input: Option<Arc<WatchAdapter>>,
    output: Option<Arc<WatchAdapter>>,
}

impl Watchers {
    fn get(&self, side: Side) -> Option<&Arc<WatchAdapter>> {
        match side {
            Side::Input => self.input.as_ref(),
            Side::Output => self.output.as_ref(),
        }
    }

    fn iter(&self) -> impl Iterator<Item = &Arc<WatchAdapter>> {
        self.input.iter().chain(self.output.iter())
    }

    fn enable_all(&self) {
        self.iter().for_each(|w| w.enable());
    }

    fn disable_all(&self) {
        self.iter().for_each(|w| w.disable());
    }

    fn dispose_all(&self) {
        self.iter().for_each(|w| w.dispose());
    }

    fn flush_pending(&self) {
        self.iter().for_each(|w| w.flush_pending());
    }
}

struct Running {
    watchers: Watchers,
    worker: JoinHandle<()>,
}

// ============================================================================
// SyncService
// ============================================================================

/// Keeps two folders synchronized in the background
pub struct SyncService {
    roots: RootPair,
    mode: SyncMode,
    options: SyncOptions,
    logger: Arc<dyn SyncLogger>,
    state: Mutex<ServiceState>,
    /// Serializes start/pause/resume/stop
    control: Mutex<Option<Running>>,
    shared: Arc<WorkerShared>,
}

impl SyncService {
    /// Creates a stopped service for `folder1` / `folder2`
    ///
    /// # Errors
    /// Returns [`SyncError::InvalidConfiguration`] for blank, identical or
    /// nested folders and for unusable options.
    pub fn new(
        folder1: impl AsRef<Path>,
        folder2: impl AsRef<Path>,
        mode: SyncMode,
        options: SyncOptions,
        logger: Arc<dyn SyncLogger>,
    ) -> Result<Self, SyncError> {
        let roots = RootPair::new(folder1, folder2, mode)
            .map_err(|e| SyncError::InvalidConfiguration(e.to_string()))?;
        options.validate()?;

        let shared = Arc::new(WorkerShared {
            queue: ChangeQueue::new(),
            ignore: Arc::new(IgnoreSet::new(options.echo_settle)),
            interrupt: Arc::new(AtomicBool::new(false)),
            shutdown: AtomicBool::new(false),
            requested: AtomicU64::new(0),
            acknowledged: AtomicU64::new(0),
            receiver: Mutex::new(None),
            dead_letters: Mutex::new(VecDeque::new()),
        });

        debug!(
            input = %roots.input().display(),
            output = %roots.output().display(),
            %mode,
            "Sync service created"
        );

        Ok(Self {
            roots,
            mode,
            options,
            logger,
            state: Mutex::new(ServiceState::Stopped),
            control: Mutex::new(None),
            shared,
        })
    }

    /// Creates a stopped service from a loaded configuration
    pub fn from_config(config: &Config, logger: Arc<dyn SyncLogger>) -> Result<Self, SyncError> {
        Self::new(
            &config.sync.folder1,
            &config.sync.folder2,
            config.sync.mode,
            SyncOptions::from_config(config),
            logger,
        )
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    /// Current lifecycle state
    pub fn state(&self) -> ServiceState {
        *lock(&self.state)
    }

    /// The priority root
    pub fn input_root(&self) -> &Path {
        self.roots.input()
    }

    /// The mirror root
    pub fn output_root(&self) -> &Path {
        self.roots.output()
    }

    /// The configured sync mode
    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    /// Changes waiting in the queue, front first
    ///
    /// Changes still on the channel from the watchers are not included.
    pub fn pending_changes(&self) -> Vec<Change> {
        self.shared.queue.snapshot()
    }

    /// Changes that exhausted their retries since the last start, oldest first
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        lock(&self.shared.dead_letters).iter().cloned().collect()
    }

    fn set_state(&self, state: ServiceState) {
        *lock(&self.state) = state;
    }

    fn reject(&self, request: &str, current: ServiceState) {
        warn!(request, state = %current, "Ignoring control request");
        self.logger
            .log_warning(&format!("Cannot {request} while {current}"));
    }

    // ------------------------------------------------------------------
    // Start
    // ------------------------------------------------------------------

    /// Reconciles both roots, then starts the worker and arms the watchers
    ///
    /// # Errors
    /// Returns [`SyncError::StartupFailure`] when the roots cannot be created,
    /// the initial reconciliation fails or a watcher cannot be armed. The
    /// service stays stopped in that case.
    pub fn start(&self) -> Result<(), SyncError> {
        let mut control = lock(&self.control);
        let current = self.state();
        if current != ServiceState::Stopped {
            self.reject("start", current);
            return Ok(());
        }

        match self.launch() {
            Ok(running) => {
                *control = Some(running);
                self.set_state(ServiceState::Running);
                info!(
                    input = %self.roots.input().display(),
                    output = %self.roots.output().display(),
                    mode = %self.mode,
                    "Sync service started"
                );
                self.logger.log_information(&format!(
                    "Started {} sync: {} -> {}",
                    self.mode,
                    self.roots.input().display(),
                    self.roots.output().display()
                ));
                Ok(())
            }
            Err(err) => {
                error!(error = %err, "Sync service failed to start");
                self.logger.log_error(&format!("{err}: {}", source_of(&err)));
                Err(err)
            }
        }
    }

    fn launch(&self) -> Result<Running, SyncError> {
        for root in [self.roots.input(), self.roots.output()] {
            std::fs::create_dir_all(root)
                .map_err(|e| SyncError::operation("create_dir", root, e).during_startup("creating roots"))?;
        }
        let roots = self
            .roots
            .canonicalized()
            .map_err(|e| {
                SyncError::operation("canonicalize", self.roots.input(), e)
                    .during_startup("resolving roots")
            })?;

        let shared = &self.shared;
        lock(&shared.dead_letters).clear();
        shared.discard_backlog();
        shared.shutdown.store(false, Ordering::SeqCst);
        shared.interrupt.store(false, Ordering::SeqCst);

        let ops = DirectoryOps::new(self.options.busy, self.options.compare_before_copy)
            .with_interrupt(Arc::clone(&shared.interrupt));

        let report = reconcile(roots.input(), roots.output(), self.mode, &ops)
            .map_err(|e| e.during_startup("initial reconciliation"))?;
        self.logger
            .log_information(&format!("Initial reconciliation: {report}"));

        let (tx, rx) = mpsc::channel(self.options.buffer_size);
        *lock(&shared.receiver) = Some(rx);

        let sink = WatchSink::new(tx, Arc::clone(&shared.ignore), Arc::clone(&self.logger));
        let arm = |root: &Path| {
            WatchAdapter::new(root, sink.clone(), self.options.rename_pair_window)
                .map(Arc::new)
                .map_err(|e| {
                    SyncError::NotificationSource(format!("{e:#}")).during_startup("arming watchers")
                })
        };
        let watchers = Watchers {
            input: Some(arm(roots.input())?),
            output: if self.mode.is_two_way() {
                Some(arm(roots.output())?)
            } else {
                None
            },
        };

        let worker = Worker {
            shared: Arc::clone(shared),
            roots,
            ops,
            watchers: watchers.clone(),
            logger: Arc::clone(&self.logger),
            max_retries: self.options.max_retries,
            dead_letter_capacity: self.options.dead_letter_capacity,
            idle_poll: self.options.idle_poll,
        };
        let handle = thread::Builder::new()
            .name("foldsync-worker".to_string())
            .spawn(move || worker.run())
            .map_err(|e| {
                SyncError::operation("spawn", "foldsync-worker", e).during_startup("starting worker")
            })?;

        watchers.enable_all();
        Ok(Running {
            watchers,
            worker: handle,
        })
    }

    // ------------------------------------------------------------------
    // Pause / Continue
    // ------------------------------------------------------------------

    /// Suspends processing and discards everything pending
    ///
    /// Watch subscriptions are kept; nothing observed while paused is
    /// replayed on [`resume`](SyncService::resume).
    pub fn pause(&self) {
        let control = lock(&self.control);
        let current = self.state();
        if current != ServiceState::Running {
            self.reject("pause", current);
            return;
        }

        self.interrupt_worker(control.as_ref());
        if let Some(running) = control.as_ref() {
            running.watchers.disable_all();
        }
        self.shared.discard_backlog();

        self.set_state(ServiceState::Paused);
        info!("Sync service paused");
        self.logger.log_information("Paused");
    }

    /// Continues after [`pause`](SyncService::pause)
    pub fn resume(&self) {
        let control = lock(&self.control);
        let current = self.state();
        if current != ServiceState::Paused {
            self.reject("continue", current);
            return;
        }

        self.shared.interrupt.store(false, Ordering::SeqCst);
        if let Some(running) = control.as_ref() {
            running.watchers.enable_all();
        }

        self.set_state(ServiceState::Running);
        info!("Sync service continued");
        self.logger.log_information("Continued");
    }

    // ------------------------------------------------------------------
    // Stop
    // ------------------------------------------------------------------

    /// Tears down the watchers, stops the worker and clears all state
    pub fn stop(&self) {
        let mut control = lock(&self.control);
        let current = self.state();
        if current == ServiceState::Stopped {
            self.reject("stop", current);
            return;
        }

        let running = control.take();
        if let Some(running) = &running {
            running.watchers.dispose_all();
        }
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.interrupt_worker(running.as_ref());

        if let Some(running) = running {
            if running.worker.join().is_err() {
                error!("Sync worker panicked");
                self.logger.log_error("Sync worker terminated abnormally");
            }
        }

        self.shared.discard_backlog();
        *lock(&self.shared.receiver) = None;

        self.set_state(ServiceState::Stopped);
        info!("Sync service stopped");
        self.logger.log_information("Stopped");
    }

    /// Raises the interrupt flag and waits until the worker has seen it
    fn interrupt_worker(&self, running: Option<&Running>) {
        let request = self.shared.requested.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.interrupt.store(true, Ordering::SeqCst);

        let Some(running) = running else {
            return;
        };
        while self.shared.acknowledged.load(Ordering::SeqCst) < request {
            if running.worker.is_finished() {
                break;
            }
            thread::sleep(self.options.interrupt_poll);
        }
        trace!(request, "Worker acknowledged interrupt");
    }
}

impl Drop for SyncService {
    fn drop(&mut self) {
        if self.state() != ServiceState::Stopped {
            self.stop();
        }
    }
}

impl std::fmt::Debug for SyncService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncService")
            .field("input", &self.roots.input())
            .field("output", &self.roots.output())
            .field("mode", &self.mode)
            .field("state", &self.state())
            .finish()
    }
}

fn source_of(err: &SyncError) -> String {
    match std::error::Error::source(err) {
        Some(source) => source.to_string(),
        None => "no further detail".to_string(),
    }
}

// ============================================================================
// Worker
// ============================================================================

struct Worker {
    shared: Arc<WorkerShared>,
    roots: RootPair,
    ops: DirectoryOps,
    watchers: Watchers,
    logger: Arc<dyn SyncLogger>,
    max_retries: u32,
    dead_letter_capacity: usize,
    idle_poll: Duration,
}

impl Worker {
    fn run(self) {
        debug!("Sync worker started");
        loop {
            if self.shared.shutdown.load(Ordering::SeqCst) {
                self.shared.acknowledge();
                break;
            }
            if self.shared.interrupt.load(Ordering::SeqCst) {
                self.shared.acknowledge();
                thread::sleep(self.idle_poll);
                continue;
            }

            self.shared.drain_channel();
            self.watchers.flush_pending();

            match self.shared.queue.dequeue_coalesced(|p: &Path| p.is_dir()) {
                Some(change) => self.process(change),
                None => thread::sleep(self.idle_poll),
            }
        }
        debug!("Sync worker stopped");
    }

    fn process(&self, change: Change) {
        trace!(change = %change, retry = change.retry_count, "Processing change");
        match self.dispatch(&change) {
            Ok(Some(message)) => {
                debug!(change = %change, "Change applied");
                self.logger.log_information(&message);
            }
            Ok(None) => trace!(change = %change, "Nothing to do"),
            Err(SyncError::Interrupted) => {
                debug!(change = %change, "Change discarded by pause or stop");
            }
            Err(err) => self.fail(change, err),
        }
    }

    fn fail(&self, change: Change, err: SyncError) {
        let change = change.into_retry();
        if change.retry_count > self.max_retries {
            error!(
                change = %change,
                attempts = change.retry_count,
                error = %err,
                "Giving up on change"
            );
            self.logger.log_error(&format!(
                "Giving up on {change} after {} attempts: {err}",
                change.retry_count
            ));
            self.shared.park(
                DeadLetter {
                    change,
                    error: err.to_string(),
                    parked_at: Utc::now(),
                },
                self.dead_letter_capacity,
            );
        } else {
            warn!(change = %change, attempt = change.retry_count, error = %err, "Change failed, requeued");
            self.logger
                .log_error(&format!("Failed to apply {change}: {err}"));
            self.shared.queue.enqueue(change);
        }
    }

    fn dispatch(&self, change: &Change) -> Result<Option<String>, SyncError> {
        let side = self
            .roots
            .side_of(&change.path)
            .ok_or_else(|| DomainError::PathNotInRoot(change.path.display().to_string()))?;

        match change.kind {
            ChangeKind::Created => self.on_created(change, side),
            ChangeKind::Modified => self.on_modified(change, side),
            ChangeKind::Renamed => self.on_renamed(change, side),
            ChangeKind::Deleted => self.on_deleted(change, side),
        }
    }

    fn on_created(&self, change: &Change, side: Side) -> Result<Option<String>, SyncError> {
        if !change.path.exists() {
            return Ok(None);
        }
        let target = side.opposite();
        let dest = self.roots.translate(&change.path, target)?;
        self.mirror(&change.path, &dest, target)
    }

    fn on_modified(&self, change: &Change, side: Side) -> Result<Option<String>, SyncError> {
        match side {
            Side::Input => {
                if !change.path.is_file() {
                    return Ok(None);
                }
                let dest = self.roots.translate(&change.path, Side::Output)?;
                self.mirror(&change.path, &dest, Side::Output)
            }
            Side::Output => {
                let source = self.roots.translate(&change.path, Side::Input)?;
                if !source.is_file() {
                    return Ok(None);
                }
                self.mirror(&source, &change.path, Side::Output)
            }
        }
    }

    fn on_renamed(&self, change: &Change, side: Side) -> Result<Option<String>, SyncError> {
        let Some(old_path) = change.old_path.as_deref() else {
            return self.on_created(change, side);
        };

        match side {
            Side::Input => {
                let old_mirror = self.roots.translate(old_path, Side::Output)?;
                let new_mirror = self.roots.translate(&change.path, Side::Output)?;
                if old_mirror.exists() {
                    self.relocate(&old_mirror, &new_mirror)
                } else if change.path.exists() {
                    self.mirror(&change.path, &new_mirror, Side::Output)
                } else {
                    Ok(None)
                }
            }
            Side::Output => {
                if !change.path.exists() {
                    return Ok(None);
                }
                self.relocate(&change.path, old_path).map(|applied| {
                    applied.map(|_| {
                        format!(
                            "Reverted rename {} -> {}",
                            old_path.display(),
                            change.path.display()
                        )
                    })
                })
            }
        }
    }

    fn on_deleted(&self, change: &Change, side: Side) -> Result<Option<String>, SyncError> {
        match side {
            Side::Input => {
                let mirror = self.roots.translate(&change.path, Side::Output)?;
                let Ok(meta) = std::fs::symlink_metadata(&mirror) else {
                    return Ok(None);
                };
                let (folders, files) = if meta.is_dir() {
                    (vec![mirror.clone()], Vec::new())
                } else {
                    (Vec::new(), vec![mirror.clone()])
                };
                self.guarded(Side::Output, &folders, &files, || self.ops.delete_tree(&mirror))?;
                Ok(Some(format!("Deleted {}", mirror.display())))
            }
            Side::Output => {
                let source = self.roots.translate(&change.path, Side::Input)?;
                if !source.exists() {
                    return Ok(None);
                }
                self.mirror(&source, &change.path, Side::Output)
            }
        }
    }

    /// Copies `source` (file or tree) onto `dest`, which lives under `written`
    fn mirror(&self, source: &Path, dest: &Path, written: Side) -> Result<Option<String>, SyncError> {
        let mut files = missing_ancestors(dest);

        if source.is_dir() {
            let stats = self.guarded(written, &[dest.to_path_buf()], &files, || {
                self.ops.copy_tree(source, dest)
            })?;
            Ok(Some(format!(
                "Copied directory {} to {} ({} files)",
                source.display(),
                dest.display(),
                stats.files_copied
            )))
        } else {
            files.push(dest.to_path_buf());
            let copied = self.guarded(written, &[], &files, || {
                self.ops
                    .apply_file_action(source, Some(dest), FileAction::Copy)
            })?;
            Ok(copied.then(|| format!("Copied {} to {}", source.display(), dest.display())))
        }
    }

    /// Moves `from` to `to` inside the output root
    fn relocate(&self, from: &Path, to: &Path) -> Result<Option<String>, SyncError> {
        let mut files = missing_ancestors(to);
        let folders = if from.is_dir() {
            vec![from.to_path_buf(), to.to_path_buf()]
        } else {
            files.push(from.to_path_buf());
            files.push(to.to_path_buf());
            Vec::new()
        };

        self.guarded(Side::Output, &folders, &files, || {
            if from.is_dir() {
                self.ops.move_tree(from, to)
            } else {
                self.ops
                    .apply_file_action(from, Some(to), FileAction::Move)
                    .map(|_| ())
            }
        })?;
        Ok(Some(format!("Moved {} to {}", from.display(), to.display())))
    }

    /// Runs a write into the `written` root with its echoes suppressed
    fn guarded<T>(
        &self,
        written: Side,
        folders: &[PathBuf],
        files: &[PathBuf],
        op: impl FnOnce() -> Result<T, SyncError>,
    ) -> Result<T, SyncError> {
        let Some(adapter) = self.watchers.get(written) else {
            return op();
        };

        adapter.disable();
        let suppression = self.shared.ignore.suppress(folders, files);
        let result = op();
        drop(suppression);
        adapter.enable();
        result
    }
}

/// Ancestors of `path` that do not exist yet, nearest first
fn missing_ancestors(path: &Path) -> Vec<PathBuf> {
    path.ancestors()
        .skip(1)
        .take_while(|p| !p.as_os_str().is_empty() && !p.exists())
        .map(Path::to_path_buf)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use foldsync_core::ports::NullLogger;
    use tempfile::TempDir;

    fn options() -> SyncOptions {
        SyncOptions {
            busy: BusyWait::new(Duration::from_millis(10), Duration::from_millis(200)),
            idle_poll: Duration::from_millis(10),
            interrupt_poll: Duration::from_millis(10),
            echo_settle: Duration::from_millis(100),
            ..SyncOptions::default()
        }
    }

    #[test]
    fn test_options_from_config() {
        let opts = SyncOptions::default();
        assert_eq!(opts.busy.interval, Duration::from_millis(200));
        assert_eq!(opts.busy.timeout, Duration::from_secs(60));
        assert_eq!(opts.max_retries, 3);
        assert!(opts.compare_before_copy);
    }

    #[test]
    fn test_new_rejects_blank_and_nested_roots() {
        let logger: Arc<dyn SyncLogger> = Arc::new(NullLogger);
        let err = SyncService::new("", "/tmp/x", SyncMode::OneWay, options(), logger.clone())
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidConfiguration(_)));

        let err = SyncService::new("/tmp/a", "/tmp/a/b", SyncMode::OneWay, options(), logger)
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_new_rejects_zero_buffer() {
        let opts = SyncOptions {
            buffer_size: 0,
            ..options()
        };
        let err = SyncService::new("/tmp/a", "/tmp/b", SyncMode::OneWay, opts, Arc::new(NullLogger))
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_dest_first_swaps_roots() {
        let service = SyncService::new(
            "/tmp/first",
            "/tmp/second",
            SyncMode::TwoWayDestFirst,
            options(),
            Arc::new(NullLogger),
        )
        .unwrap();
        assert_eq!(service.input_root(), Path::new("/tmp/second"));
        assert_eq!(service.output_root(), Path::new("/tmp/first"));
        assert_eq!(service.mode(), SyncMode::TwoWayDestFirst);
        assert_eq!(service.state(), ServiceState::Stopped);
    }

    #[test]
    fn test_invalid_transitions_are_ignored() {
        let dir = TempDir::new().unwrap();
        let service = SyncService::new(
            dir.path().join("in"),
            dir.path().join("out"),
            SyncMode::OneWay,
            options(),
            Arc::new(NullLogger),
        )
        .unwrap();

        service.pause();
        assert_eq!(service.state(), ServiceState::Stopped);
        service.resume();
        assert_eq!(service.state(), ServiceState::Stopped);
        service.stop();
        assert_eq!(service.state(), ServiceState::Stopped);
    }

    #[test]
    fn test_lifecycle() {
        let dir = TempDir::new().unwrap();
        let service = SyncService::new(
            dir.path().join("in"),
            dir.path().join("out"),
            SyncMode::TwoWaySourceFirst,
            options(),
            Arc::new(NullLogger),
        )
        .unwrap();

        service.start().unwrap();
        assert_eq!(service.state(), ServiceState::Running);
        assert!(dir.path().join("in").is_dir());
        assert!(dir.path().join("out").is_dir());

        // A second start is ignored
        service.start().unwrap();
        assert_eq!(service.state(), ServiceState::Running);

        service.pause();
        assert_eq!(service.state(), ServiceState::Paused);
        service.resume();
        assert_eq!(service.state(), ServiceState::Running);
        service.pause();
        service.stop();
        assert_eq!(service.state(), ServiceState::Stopped);

        // Restart after stop
        service.start().unwrap();
        assert_eq!(service.state(), ServiceState::Running);
        service.stop();
    }

    #[test]
    fn test_start_failure_leaves_service_stopped() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();

        let service = SyncService::new(
            blocker.join("in"),
            dir.path().join("out"),
            SyncMode::OneWay,
            options(),
            Arc::new(NullLogger),
        )
        .unwrap();

        let err = service.start().unwrap_err();
        assert!(matches!(err, SyncError::StartupFailure { .. }));
        assert_eq!(service.state(), ServiceState::Stopped);
    }

    #[test]
    fn test_missing_ancestors() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("a/b/c.txt");
        assert_eq!(
            missing_ancestors(&target),
            vec![dir.path().join("a/b"), dir.path().join("a")]
        );
        assert!(missing_ancestors(&dir.path().join("x.txt")).is_empty());
    }
}
