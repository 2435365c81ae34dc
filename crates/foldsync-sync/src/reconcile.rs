//! One-shot reconciliation of the two roots
//!
//! Runs on service start and from the CLI `reconcile` command:
//!
//! - `OneWay`: copy input → output, then delete output-only orphans
//! - `TwoWay*`: copy input → output, then copy output → input (orphans are
//!   carried back rather than deleted)
//!
//! Copies skip identical destinations, so a second run over unchanged trees
//! writes nothing.

use std::path::Path;

use foldsync_core::domain::SyncMode;
use serde::Serialize;
use tracing::{info, instrument};

use crate::fileops::{CopyStats, DirectoryOps};
use crate::SyncError;

/// Counters describing what a reconciliation did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Files whose content was written
    pub files_copied: usize,
    /// Files already identical on the other side
    pub files_skipped: usize,
    /// Directories created
    pub dirs_created: usize,
    /// Output-only entries deleted (`OneWay` only)
    pub orphans_removed: usize,
}

impl ReconcileReport {
    /// Returns true when nothing had to be written or removed
    pub fn is_noop(&self) -> bool {
        self.files_copied == 0 && self.dirs_created == 0 && self.orphans_removed == 0
    }

    fn absorb(&mut self, stats: CopyStats) {
        self.files_copied += stats.files_copied;
        self.files_skipped += stats.files_skipped;
        self.dirs_created += stats.dirs_created;
    }
}

impl std::fmt::Display for ReconcileReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} copied, {} unchanged, {} directories created, {} orphans removed",
            self.files_copied, self.files_skipped, self.dirs_created, self.orphans_removed
        )
    }
}

/// Brings `output` in line with `input` according to `mode`
///
/// Both roots are created when missing.
#[instrument(skip_all, fields(input = %input.display(), output = %output.display(), %mode))]
pub fn reconcile(
    input: &Path,
    output: &Path,
    mode: SyncMode,
    ops: &DirectoryOps,
) -> Result<ReconcileReport, SyncError> {
    for root in [input, output] {
        std::fs::create_dir_all(root).map_err(|e| SyncError::operation("create_dir", root, e))?;
    }

    let mut report = ReconcileReport::default();
    report.absorb(ops.copy_tree(input, output)?);

    if mode.removes_orphans() {
        report.orphans_removed = ops.remove_orphans(input, output)?;
    } else {
        report.absorb(ops.copy_tree(output, input)?);
    }

    info!(
        files_copied = report.files_copied,
        files_skipped = report.files_skipped,
        dirs_created = report.dirs_created,
        orphans_removed = report.orphans_removed,
        "Reconciliation complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, std::path::PathBuf, std::path::PathBuf) {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in");
        let output = dir.path().join("out");
        fs::create_dir_all(input.join("sub")).unwrap();
        fs::create_dir_all(&output).unwrap();
        fs::write(input.join("a.txt"), "a").unwrap();
        fs::write(input.join("sub/b.txt"), "b").unwrap();
        fs::write(output.join("extra.txt"), "x").unwrap();
        (dir, input, output)
    }

    #[test]
    fn test_one_way_mirrors_and_removes_orphans() {
        let (_dir, input, output) = setup();
        let report = reconcile(&input, &output, SyncMode::OneWay, &DirectoryOps::default()).unwrap();

        assert_eq!(report.files_copied, 2);
        assert_eq!(report.orphans_removed, 1);
        assert_eq!(fs::read_to_string(output.join("sub/b.txt")).unwrap(), "b");
        assert!(!output.join("extra.txt").exists());
        assert!(!input.join("extra.txt").exists());
    }

    #[test]
    fn test_two_way_copies_orphans_back() {
        let (_dir, input, output) = setup();
        let report = reconcile(
            &input,
            &output,
            SyncMode::TwoWaySourceFirst,
            &DirectoryOps::default(),
        )
        .unwrap();

        assert_eq!(report.orphans_removed, 0);
        assert_eq!(report.files_copied, 3);
        assert_eq!(fs::read_to_string(input.join("extra.txt")).unwrap(), "x");
        assert!(output.join("a.txt").exists());
    }

    #[test]
    fn test_input_wins_on_conflicting_content() {
        let (_dir, input, output) = setup();
        fs::write(output.join("a.txt"), "stale").unwrap();
        reconcile(
            &input,
            &output,
            SyncMode::TwoWaySourceFirst,
            &DirectoryOps::default(),
        )
        .unwrap();
        assert_eq!(fs::read_to_string(output.join("a.txt")).unwrap(), "a");
        assert_eq!(fs::read_to_string(input.join("a.txt")).unwrap(), "a");
    }

    #[test]
    fn test_second_run_is_noop() {
        let (_dir, input, output) = setup();
        let ops = DirectoryOps::default();
        for mode in SyncMode::ALL {
            reconcile(&input, &output, mode, &ops).unwrap();
            let again = reconcile(&input, &output, mode, &ops).unwrap();
            assert!(again.is_noop(), "{mode}: {again}");
        }
    }

    #[test]
    fn test_missing_roots_are_created() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("new-in");
        let output = dir.path().join("nested/new-out");
        let report = reconcile(&input, &output, SyncMode::OneWay, &DirectoryOps::default()).unwrap();
        assert!(input.is_dir());
        assert!(output.is_dir());
        assert!(report.is_noop());
    }
}
