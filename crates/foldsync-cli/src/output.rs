//! Output rendering for the `foldsync` CLI
//!
//! Commands print through an [`OutputFormatter`]. The human formatter writes
//! status lines to stdout and problems to stderr; the JSON formatter emits one
//! document per command and stays silent otherwise.

use std::path::Path;

use foldsync_core::domain::SyncMode;
use foldsync_sync::{DeadLetter, ReconcileReport};
use serde_json::{json, Value};

/// Output format selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
}

impl OutputFormat {
    pub fn from_flag(json: bool) -> Self {
        if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }

    pub fn is_json(self) -> bool {
        matches!(self, OutputFormat::Json)
    }
}

/// The folder pair a command worked on
#[derive(Debug, Clone, Copy)]
pub struct FolderPair<'a> {
    pub input: &'a Path,
    pub output: &'a Path,
    pub mode: SyncMode,
}

impl FolderPair<'_> {
    fn to_json(self) -> Value {
        json!({
            "input": self.input.display().to_string(),
            "output": self.output.display().to_string(),
            "mode": self.mode.as_str(),
        })
    }

    fn heading(self) -> String {
        format!(
            "{} -> {} ({})",
            self.input.display(),
            self.output.display(),
            self.mode
        )
    }
}

/// Trait for formatting CLI output
pub trait OutputFormatter {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
    fn warn(&self, message: &str);
    fn info(&self, message: &str);
    fn print_json(&self, value: &Value);

    /// Prints the counters of a finished reconciliation
    fn reconcile_report(&self, pair: FolderPair<'_>, report: &ReconcileReport);

    /// Prints the summary of a stopped service, including abandoned changes
    fn session_summary(&self, pair: FolderPair<'_>, dead_letters: &[DeadLetter]);
}

/// Human-readable output formatter with checkmarks and indentation
pub struct HumanFormatter;

impl OutputFormatter for HumanFormatter {
    fn success(&self, message: &str) {
        println!("\u{2713} {message}");
    }

    fn error(&self, message: &str) {
        eprintln!("\u{2717} Error: {message}");
    }

    fn warn(&self, message: &str) {
        eprintln!("\u{26a0} Warning: {message}");
    }

    fn info(&self, message: &str) {
        println!("  {message}");
    }

    fn print_json(&self, _value: &Value) {}

    fn reconcile_report(&self, pair: FolderPair<'_>, report: &ReconcileReport) {
        self.success(&format!("Reconciled {}", pair.heading()));
        for line in report_lines(report, pair.mode) {
            self.info(&line);
        }
    }

    fn session_summary(&self, pair: FolderPair<'_>, dead_letters: &[DeadLetter]) {
        self.success(&format!("Stopped syncing {}", pair.heading()));
        if dead_letters.is_empty() {
            return;
        }
        self.warn(&format!(
            "{} change{} could not be applied:",
            dead_letters.len(),
            if dead_letters.len() == 1 { "" } else { "s" }
        ));
        for letter in dead_letters {
            self.info(&dead_letter_line(letter));
        }
    }
}

/// JSON output formatter
pub struct JsonFormatter;

impl OutputFormatter for JsonFormatter {
    fn success(&self, message: &str) {
        println!("{}", json!({"success": true, "message": message}));
    }

    fn error(&self, message: &str) {
        eprintln!("{}", json!({"success": false, "error": message}));
    }

    fn warn(&self, message: &str) {
        eprintln!("{}", json!({"level": "warning", "message": message}));
    }

    fn info(&self, _message: &str) {}

    fn print_json(&self, value: &Value) {
        println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
    }

    fn reconcile_report(&self, pair: FolderPair<'_>, report: &ReconcileReport) {
        self.print_json(&reconcile_json(pair, report));
    }

    fn session_summary(&self, pair: FolderPair<'_>, dead_letters: &[DeadLetter]) {
        self.print_json(&session_json(pair, dead_letters));
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::Json => Box::new(JsonFormatter),
        OutputFormat::Human => Box::new(HumanFormatter),
    }
}

// ============================================================================
// Rendering helpers
// ============================================================================

fn report_lines(report: &ReconcileReport, mode: SyncMode) -> Vec<String> {
    let mut lines = vec![
        format!("Files copied:        {}", report.files_copied),
        format!("Files unchanged:     {}", report.files_skipped),
        format!("Directories created: {}", report.dirs_created),
    ];
    if mode.removes_orphans() {
        lines.push(format!("Orphans removed:     {}", report.orphans_removed));
    }
    if report.is_noop() {
        lines.push("Folders were already in sync".to_string());
    }
    lines
}

fn dead_letter_line(letter: &DeadLetter) -> String {
    format!(
        "{} after {} attempts - {}",
        letter.change, letter.change.retry_count, letter.error
    )
}

fn dead_letter_json(letter: &DeadLetter) -> Value {
    json!({
        "kind": letter.change.kind.to_string(),
        "path": letter.change.path.display().to_string(),
        "old_path": letter.change.old_path.as_ref().map(|p| p.display().to_string()),
        "attempts": letter.change.retry_count,
        "error": letter.error,
        "parked_at": letter.parked_at.to_rfc3339(),
    })
}

fn reconcile_json(pair: FolderPair<'_>, report: &ReconcileReport) -> Value {
    let mut value = pair.to_json();
    value["success"] = json!(true);
    value["report"] = serde_json::to_value(report).unwrap_or(Value::Null);
    value
}

fn session_json(pair: FolderPair<'_>, dead_letters: &[DeadLetter]) -> Value {
    let mut value = pair.to_json();
    value["success"] = json!(true);
    value["dead_letters"] = dead_letters.iter().map(dead_letter_json).collect();
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use foldsync_core::domain::Change;

    fn pair(mode: SyncMode) -> FolderPair<'static> {
        FolderPair {
            input: Path::new("/srv/in"),
            output: Path::new("/srv/out"),
            mode,
        }
    }

    fn letter() -> DeadLetter {
        DeadLetter {
            change: Change::renamed("/in/a.txt", "a.txt", "/in/b.txt", "b.txt").into_retry(),
            error: "File busy".to_string(),
            parked_at: "2026-01-02T03:04:05Z".parse().unwrap(),
        }
    }

    #[test]
    fn test_format_from_flag() {
        assert_eq!(OutputFormat::from_flag(true), OutputFormat::Json);
        assert!(!OutputFormat::from_flag(false).is_json());
    }

    #[test]
    fn test_report_lines_show_orphans_only_for_one_way() {
        let report = ReconcileReport {
            files_copied: 2,
            orphans_removed: 1,
            ..ReconcileReport::default()
        };

        let one_way = report_lines(&report, SyncMode::OneWay);
        assert!(one_way.iter().any(|l| l.starts_with("Orphans removed") && l.ends_with('1')));

        let two_way = report_lines(&report, SyncMode::TwoWaySourceFirst);
        assert!(!two_way.iter().any(|l| l.starts_with("Orphans removed")));
        assert!(!two_way.iter().any(|l| l.contains("already in sync")));
    }

    #[test]
    fn test_report_lines_note_noop() {
        let lines = report_lines(&ReconcileReport::default(), SyncMode::OneWay);
        assert_eq!(lines.last().map(String::as_str), Some("Folders were already in sync"));
    }

    #[test]
    fn test_reconcile_json_carries_pair_and_counters() {
        let report = ReconcileReport {
            files_copied: 3,
            dirs_created: 1,
            ..ReconcileReport::default()
        };

        let json = reconcile_json(pair(SyncMode::OneWay), &report);
        assert_eq!(json["success"], true);
        assert_eq!(json["input"], "/srv/in");
        assert_eq!(json["output"], "/srv/out");
        assert_eq!(json["mode"], SyncMode::OneWay.as_str());
        assert_eq!(json["report"]["files_copied"], 3);
        assert_eq!(json["report"]["dirs_created"], 1);
    }

    #[test]
    fn test_dead_letter_json_fields() {
        let json = dead_letter_json(&letter());
        assert_eq!(json["path"], "/in/b.txt");
        assert_eq!(json["old_path"], "/in/a.txt");
        assert_eq!(json["attempts"], 1);
        assert_eq!(json["error"], "File busy");
        assert_eq!(json["parked_at"], "2026-01-02T03:04:05+00:00");
    }

    #[test]
    fn test_session_json_lists_dead_letters() {
        let json = session_json(pair(SyncMode::TwoWayDestFirst), &[letter()]);
        assert_eq!(json["dead_letters"].as_array().map(Vec::len), Some(1));
        assert_eq!(json["dead_letters"][0]["error"], "File busy");

        let empty = session_json(pair(SyncMode::OneWay), &[]);
        assert_eq!(empty["dead_letters"], json!([]));
    }

    #[test]
    fn test_dead_letter_line_mentions_attempts() {
        let line = dead_letter_line(&letter());
        assert!(line.contains("after 1 attempts"));
        assert!(line.ends_with("File busy"));
    }
}
