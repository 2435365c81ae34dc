//! Integration tests for SyncService
//!
//! Each test runs a real service over two fresh temporary roots with live
//! `notify` watchers, then polls the filesystem until the expected state is
//! reached or a deadline passes.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;
use tempfile::TempDir;

use foldsync_core::domain::{ServiceState, SyncMode};
use foldsync_core::ports::{Severity, SyncLogger};
use foldsync_sync::fileops::BusyWait;
use foldsync_sync::{SyncOptions, SyncService};

// ============================================================================
// Test helpers
// ============================================================================

const DEADLINE: Duration = Duration::from_secs(10);

/// Collects operational messages
#[derive(Default)]
struct Recorder {
    lines: Mutex<Vec<(Severity, String)>>,
}

impl Recorder {
    fn contains(&self, severity: Severity, needle: &str) -> bool {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .any(|(s, line)| *s == severity && line.contains(needle))
    }

    fn count(&self, severity: Severity, needle: &str) -> usize {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, line)| *s == severity && line.contains(needle))
            .count()
    }
}

impl SyncLogger for Recorder {
    fn log_information(&self, message: &str) {
        self.lines
            .lock()
            .unwrap()
            .push((Severity::Information, message.to_string()));
    }

    fn log_warning(&self, message: &str) {
        self.lines
            .lock()
            .unwrap()
            .push((Severity::Warning, message.to_string()));
    }

    fn log_error(&self, message: &str) {
        self.lines
            .lock()
            .unwrap()
            .push((Severity::Error, message.to_string()));
    }
}

fn fast_options() -> SyncOptions {
    SyncOptions {
        rename_pair_window: Duration::from_millis(50),
        busy: BusyWait::new(Duration::from_millis(10), Duration::from_millis(100)),
        max_retries: 1,
        idle_poll: Duration::from_millis(10),
        interrupt_poll: Duration::from_millis(10),
        echo_settle: Duration::from_millis(200),
        ..SyncOptions::default()
    }
}

struct Fixture {
    _dir: TempDir,
    input: PathBuf,
    output: PathBuf,
    recorder: Arc<Recorder>,
    service: SyncService,
}

/// Creates `in`/`out` roots, lets `prepare` seed them, then starts a service
fn start(mode: SyncMode, prepare: impl FnOnce(&Path, &Path)) -> Fixture {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in");
    let output = dir.path().join("out");
    fs::create_dir_all(&input).unwrap();
    fs::create_dir_all(&output).unwrap();
    prepare(&input, &output);

    let recorder = Arc::new(Recorder::default());
    let service = SyncService::new(&input, &output, mode, fast_options(), recorder.clone()).unwrap();
    service.start().unwrap();

    Fixture {
        _dir: dir,
        input,
        output,
        recorder,
        service,
    }
}

/// Polls `condition` until it holds or the deadline passes
fn wait_until(condition: impl Fn() -> bool) -> bool {
    let started = Instant::now();
    while started.elapsed() < DEADLINE {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    condition()
}

fn read(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok()
}

// ============================================================================
// One-way
// ============================================================================

#[test]
fn test_one_way_scenario() {
    let fx = start(SyncMode::OneWay, |input, _| {
        fs::write(input.join("a.txt"), "hello").unwrap();
    });

    // Mirrored by the initial reconciliation
    assert_eq!(read(&fx.output.join("a.txt")).as_deref(), Some("hello"));

    fs::remove_file(fx.input.join("a.txt")).unwrap();
    assert!(wait_until(|| !fx.output.join("a.txt").exists()));

    fs::create_dir(fx.input.join("sub")).unwrap();
    fs::write(fx.input.join("sub/b.txt"), "nested").unwrap();
    assert!(wait_until(
        || read(&fx.output.join("sub/b.txt")).as_deref() == Some("nested")
    ));
    assert!(fx.output.join("sub").is_dir());

    assert!(fx.recorder.contains(Severity::Information, "Started"));
}

#[test]
fn test_one_way_removes_orphans_on_start() {
    let fx = start(SyncMode::OneWay, |input, output| {
        fs::write(input.join("keep.txt"), "k").unwrap();
        fs::write(output.join("orphan.txt"), "o").unwrap();
        fs::create_dir_all(output.join("old/deeper")).unwrap();
    });

    assert!(fx.output.join("keep.txt").exists());
    assert!(!fx.output.join("orphan.txt").exists());
    assert!(!fx.output.join("old").exists());
    assert!(!fx.input.join("orphan.txt").exists());
}

#[test]
fn test_one_way_modification_is_mirrored() {
    let fx = start(SyncMode::OneWay, |input, _| {
        fs::write(input.join("doc.txt"), "v1").unwrap();
    });

    fs::write(fx.input.join("doc.txt"), "v2").unwrap();
    assert!(wait_until(
        || read(&fx.output.join("doc.txt")).as_deref() == Some("v2")
    ));
}

#[test]
fn test_file_rename_moves_mirror() {
    let fx = start(SyncMode::OneWay, |input, _| {
        fs::write(input.join("old.txt"), "data").unwrap();
    });

    fs::rename(fx.input.join("old.txt"), fx.input.join("new.txt")).unwrap();
    assert!(wait_until(|| {
        fx.output.join("new.txt").exists() && !fx.output.join("old.txt").exists()
    }));
    assert_eq!(read(&fx.output.join("new.txt")).as_deref(), Some("data"));
}

#[test]
fn test_directory_rename_moves_mirror_tree() {
    let fx = start(SyncMode::OneWay, |input, _| {
        fs::create_dir_all(input.join("photos/2024")).unwrap();
        fs::write(input.join("photos/2024/a.jpg"), "jpg").unwrap();
    });
    assert!(fx.output.join("photos/2024/a.jpg").exists());

    fs::rename(fx.input.join("photos"), fx.input.join("pictures")).unwrap();
    assert!(wait_until(|| {
        fx.output.join("pictures/2024/a.jpg").exists() && !fx.output.join("photos").exists()
    }));
}

#[test]
fn test_directory_delete_removes_mirror_tree() {
    let fx = start(SyncMode::OneWay, |input, _| {
        fs::create_dir_all(input.join("tree/branch")).unwrap();
        fs::write(input.join("tree/branch/leaf.txt"), "leaf").unwrap();
    });
    assert!(fx.output.join("tree/branch/leaf.txt").exists());

    fs::remove_dir_all(fx.input.join("tree")).unwrap();
    assert!(wait_until(|| !fx.output.join("tree").exists()));
}

#[test]
fn test_textual_prefix_roots_are_not_confused() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in");
    let output = dir.path().join("input");

    let service = SyncService::new(
        &input,
        &output,
        SyncMode::OneWay,
        fast_options(),
        Arc::new(Recorder::default()),
    )
    .unwrap();
    service.start().unwrap();

    fs::write(input.join("a.txt"), "prefix").unwrap();
    assert!(wait_until(
        || read(&output.join("a.txt")).as_deref() == Some("prefix")
    ));
    assert!(!output.join("put").exists());
    assert!(service.dead_letters().is_empty());
}

// ============================================================================
// Two-way
// ============================================================================

#[test]
fn test_two_way_preserves_orphans_on_start() {
    let fx = start(SyncMode::TwoWaySourceFirst, |input, output| {
        fs::write(input.join("from_input.txt"), "i").unwrap();
        fs::write(output.join("from_output.txt"), "o").unwrap();
    });

    assert_eq!(read(&fx.input.join("from_output.txt")).as_deref(), Some("o"));
    assert_eq!(read(&fx.output.join("from_input.txt")).as_deref(), Some("i"));
}

#[test]
fn test_two_way_changes_flow_both_ways_and_settle() {
    let fx = start(SyncMode::TwoWaySourceFirst, |_, _| {});

    fs::write(fx.input.join("x.txt"), "from input").unwrap();
    assert!(wait_until(
        || read(&fx.output.join("x.txt")).as_deref() == Some("from input")
    ));

    fs::write(fx.output.join("y.txt"), "from output").unwrap();
    assert!(wait_until(
        || read(&fx.input.join("y.txt")).as_deref() == Some("from output")
    ));

    // Once settled, the service's own writes must not be copied again
    thread::sleep(Duration::from_millis(600));
    let copies = fx.recorder.count(Severity::Information, "Copied");
    thread::sleep(Duration::from_millis(800));
    assert_eq!(fx.recorder.count(Severity::Information, "Copied"), copies);
    assert!(fx.service.pending_changes().is_empty());
    assert!(fx.service.dead_letters().is_empty());
    assert_eq!(read(&fx.input.join("x.txt")).as_deref(), Some("from input"));
    assert_eq!(read(&fx.output.join("y.txt")).as_deref(), Some("from output"));
}

#[test]
fn test_two_way_output_edit_is_restored_from_input() {
    let fx = start(SyncMode::TwoWaySourceFirst, |input, _| {
        fs::write(input.join("a.txt"), "authoritative").unwrap();
    });

    fs::write(fx.output.join("a.txt"), "edited").unwrap();
    assert!(wait_until(
        || read(&fx.output.join("a.txt")).as_deref() == Some("authoritative")
    ));
}

#[test]
fn test_two_way_output_delete_is_restored_from_input() {
    let fx = start(SyncMode::TwoWaySourceFirst, |input, _| {
        fs::write(input.join("a.txt"), "keep").unwrap();
    });
    assert!(fx.output.join("a.txt").exists());

    fs::remove_file(fx.output.join("a.txt")).unwrap();
    assert!(wait_until(
        || read(&fx.output.join("a.txt")).as_deref() == Some("keep")
    ));
    assert_eq!(read(&fx.input.join("a.txt")).as_deref(), Some("keep"));
}

#[test]
fn test_two_way_output_rename_is_reverted() {
    let fx = start(SyncMode::TwoWaySourceFirst, |input, _| {
        fs::write(input.join("a.txt"), "named").unwrap();
    });

    fs::rename(fx.output.join("a.txt"), fx.output.join("b.txt")).unwrap();
    assert!(wait_until(|| {
        fx.output.join("a.txt").exists() && !fx.output.join("b.txt").exists()
    }));
    assert!(fx.recorder.contains(Severity::Information, "Reverted rename"));

    thread::sleep(Duration::from_millis(300));
    assert!(!fx.input.join("b.txt").exists());
    assert_eq!(read(&fx.input.join("a.txt")).as_deref(), Some("named"));
    assert_eq!(read(&fx.output.join("a.txt")).as_deref(), Some("named"));
    assert!(fx.service.dead_letters().is_empty());
}

#[test]
fn test_two_way_output_directory_is_copied_to_input() {
    let fx = start(SyncMode::TwoWaySourceFirst, |_, _| {});

    fs::create_dir_all(fx.output.join("made/deep")).unwrap();
    fs::write(fx.output.join("made/deep/f.txt"), "from output").unwrap();
    fs::write(fx.output.join("made/top.txt"), "top").unwrap();

    assert!(wait_until(|| {
        read(&fx.input.join("made/deep/f.txt")).as_deref() == Some("from output")
            && read(&fx.input.join("made/top.txt")).as_deref() == Some("top")
    }));
    assert!(fx.input.join("made/deep").is_dir());
    assert_eq!(
        read(&fx.output.join("made/deep/f.txt")).as_deref(),
        Some("from output")
    );
}

#[test]
fn test_two_way_input_directory_rename_moves_mirror() {
    let fx = start(SyncMode::TwoWaySourceFirst, |input, _| {
        fs::create_dir_all(input.join("photos")).unwrap();
        fs::write(input.join("photos/a.jpg"), "jpg").unwrap();
    });
    assert!(fx.output.join("photos/a.jpg").exists());

    fs::rename(fx.input.join("photos"), fx.input.join("pictures")).unwrap();
    assert!(wait_until(|| {
        fx.output.join("pictures/a.jpg").exists() && !fx.output.join("photos").exists()
    }));

    thread::sleep(Duration::from_millis(300));
    assert!(!fx.input.join("photos").exists());
    assert!(fx.input.join("pictures/a.jpg").exists());
    assert!(fx.service.dead_letters().is_empty());
}

#[test]
fn test_dest_first_treats_second_folder_as_input() {
    let dir = TempDir::new().unwrap();
    let first = dir.path().join("first");
    let second = dir.path().join("second");
    fs::create_dir_all(&first).unwrap();
    fs::create_dir_all(&second).unwrap();
    fs::write(first.join("shared.txt"), "first").unwrap();
    fs::write(second.join("shared.txt"), "second").unwrap();

    let service = SyncService::new(
        &first,
        &second,
        SyncMode::TwoWayDestFirst,
        fast_options(),
        Arc::new(Recorder::default()),
    )
    .unwrap();
    service.start().unwrap();

    assert_eq!(read(&first.join("shared.txt")).as_deref(), Some("second"));
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_pause_discards_and_resume_rearms() {
    let fx = start(SyncMode::OneWay, |_, _| {});

    fx.service.pause();
    assert_eq!(fx.service.state(), ServiceState::Paused);

    fs::write(fx.input.join("while_paused.txt"), "p").unwrap();
    thread::sleep(Duration::from_millis(300));
    assert!(!fx.output.join("while_paused.txt").exists());

    fx.service.resume();
    assert_eq!(fx.service.state(), ServiceState::Running);

    // Nothing observed while paused is replayed
    thread::sleep(Duration::from_millis(300));
    assert!(!fx.output.join("while_paused.txt").exists());

    fs::write(fx.input.join("after_resume.txt"), "r").unwrap();
    assert!(wait_until(|| fx.output.join("after_resume.txt").exists()));
}

#[test]
fn test_pause_interrupts_busy_wait_and_drops_backlog() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in");
    let output = dir.path().join("out");
    fs::create_dir_all(&input).unwrap();
    fs::create_dir_all(&output).unwrap();
    fs::write(input.join("locked.txt"), "old").unwrap();
    fs::write(output.join("locked.txt"), "old").unwrap();

    let options = SyncOptions {
        busy: BusyWait::new(Duration::from_millis(10), Duration::from_secs(30)),
        ..fast_options()
    };
    let service =
        SyncService::new(&input, &output, SyncMode::OneWay, options, Arc::new(Recorder::default()))
            .unwrap();
    service.start().unwrap();

    let locked_path = output.join("locked.txt");
    let holder = fs::File::open(&locked_path).unwrap();
    holder.lock_exclusive().unwrap();

    // The worker blocks on the locked mirror; later changes pile up behind it
    fs::write(input.join("locked.txt"), "new").unwrap();
    thread::sleep(Duration::from_millis(300));
    for i in 0..5 {
        fs::write(input.join(format!("queued_{i}.txt")), "q").unwrap();
    }
    thread::sleep(Duration::from_millis(300));

    let began = Instant::now();
    service.pause();
    assert!(
        began.elapsed() < Duration::from_secs(2),
        "pause took {:?}",
        began.elapsed()
    );
    assert_eq!(service.state(), ServiceState::Paused);
    assert!(service.pending_changes().is_empty());

    holder.unlock().unwrap();
    service.resume();
    thread::sleep(Duration::from_millis(500));

    for i in 0..5 {
        assert!(!output.join(format!("queued_{i}.txt")).exists());
    }
    assert_eq!(read(&locked_path).as_deref(), Some("old"));
    assert!(service.dead_letters().is_empty());

    fs::write(input.join("after_resume.txt"), "r").unwrap();
    assert!(wait_until(|| output.join("after_resume.txt").exists()));
}

#[test]
fn test_restart_reconciles_changes_made_while_stopped() {
    let fx = start(SyncMode::OneWay, |_, _| {});

    fx.service.stop();
    assert_eq!(fx.service.state(), ServiceState::Stopped);

    fs::write(fx.input.join("offline.txt"), "o").unwrap();
    thread::sleep(Duration::from_millis(200));
    assert!(!fx.output.join("offline.txt").exists());

    fx.service.start().unwrap();
    assert_eq!(read(&fx.output.join("offline.txt")).as_deref(), Some("o"));
    assert!(fx.recorder.contains(Severity::Information, "Stopped"));
}

#[test]
fn test_invalid_request_is_logged_as_warning() {
    let fx = start(SyncMode::OneWay, |_, _| {});

    fx.service.resume();
    assert_eq!(fx.service.state(), ServiceState::Running);
    assert!(fx.recorder.contains(Severity::Warning, "continue"));
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn test_busy_destination_becomes_dead_letter() {
    let fx = start(SyncMode::OneWay, |_, _| {});

    // Output is not watched in one-way mode, so this write is not mirrored back
    let locked_path = fx.output.join("locked.txt");
    fs::write(&locked_path, "old").unwrap();
    let holder = fs::File::open(&locked_path).unwrap();
    holder.lock_exclusive().unwrap();

    fs::write(fx.input.join("locked.txt"), "new").unwrap();
    assert!(wait_until(|| !fx.service.dead_letters().is_empty()));

    let letters = fx.service.dead_letters();
    let letter = &letters[0];
    assert!(letter.change.path.ends_with("locked.txt"));
    assert!(letter.change.retry_count > 1);
    assert!(letter.error.contains("busy"), "{}", letter.error);
    assert!(fx.recorder.contains(Severity::Error, "Giving up"));

    holder.unlock().unwrap();
    assert_eq!(read(&locked_path).as_deref(), Some("old"));
}

#[test]
fn test_busy_file_released_within_budget_is_copied() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in");
    let output = dir.path().join("out");
    fs::create_dir_all(&output).unwrap();
    let locked_path = output.join("slow.txt");
    fs::write(&locked_path, "old").unwrap();

    let options = SyncOptions {
        busy: BusyWait::new(Duration::from_millis(20), Duration::from_secs(5)),
        ..fast_options()
    };
    let service =
        SyncService::new(&input, &output, SyncMode::OneWay, options, Arc::new(Recorder::default()))
            .unwrap();
    fs::create_dir_all(&input).unwrap();
    fs::write(input.join("slow.txt"), "old").unwrap();
    service.start().unwrap();

    let holder = fs::File::open(&locked_path).unwrap();
    holder.lock_exclusive().unwrap();
    fs::write(input.join("slow.txt"), "fresh").unwrap();

    thread::sleep(Duration::from_millis(300));
    holder.unlock().unwrap();

    assert!(wait_until(
        || read(&locked_path).as_deref() == Some("fresh")
    ));
    assert!(service.dead_letters().is_empty());
}
