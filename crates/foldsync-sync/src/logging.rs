//! `SyncLogger` sinks
//!
//! - [`TracingLogger`] forwards to `tracing` (target `foldsync::ops`)
//! - [`FileLogger`] appends `[I][timestamp] : message` lines to a file
//!
//! [`from_config`] assembles the sink used by the binaries.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Local;
use foldsync_core::config::LoggingConfig;
use foldsync_core::ports::{FanoutLogger, SeverityFilter, Severity, SyncLogger};
use tracing::{error, info, warn};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Forwards operational messages to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl SyncLogger for TracingLogger {
    fn log_information(&self, message: &str) {
        info!(target: "foldsync::ops", "{message}");
    }

    fn log_warning(&self, message: &str) {
        warn!(target: "foldsync::ops", "{message}");
    }

    fn log_error(&self, message: &str) {
        error!(target: "foldsync::ops", "{message}");
    }
}

/// Appends operational messages to a file
#[derive(Debug)]
pub struct FileLogger {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileLogger {
    /// Opens `path` for appending, creating it and its parent directory
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// The file being written
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_line(&self, severity: Severity, message: &str) {
        let line = format!(
            "[{}][{}] : {}\n",
            severity.tag(),
            Local::now().format(TIMESTAMP_FORMAT),
            message
        );
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = file.write_all(line.as_bytes()) {
            // Sinks swallow their own failures
            warn!(path = %self.path.display(), error = %e, "Failed to write log file");
        }
    }
}

impl SyncLogger for FileLogger {
    fn log_information(&self, message: &str) {
        self.write_line(Severity::Information, message);
    }

    fn log_warning(&self, message: &str) {
        self.write_line(Severity::Warning, message);
    }

    fn log_error(&self, message: &str) {
        self.write_line(Severity::Error, message);
    }
}

/// Builds the operational logger described by `config`
///
/// Always includes a [`TracingLogger`]; adds a [`FileLogger`] when
/// `logging.file` is set. Severities are muted per the enable flags.
pub fn from_config(config: &LoggingConfig) -> io::Result<Arc<dyn SyncLogger>> {
    let mut fanout = FanoutLogger::new().with_sink(Arc::new(TracingLogger));
    if let Some(path) = &config.file {
        fanout = fanout.with_sink(Arc::new(FileLogger::open(path)?));
    }

    Ok(Arc::new(
        SeverityFilter::new(fanout)
            .information(config.information)
            .warning(config.warning)
            .error(config.error),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_logger_appends_tagged_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs/foldsync.log");
        let logger = FileLogger::open(&path).unwrap();

        logger.log_information("started");
        logger.log_warning("odd");
        logger.log_error("failed");

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("[I]["));
        assert!(lines[0].ends_with("] : started"));
        assert!(lines[1].starts_with("[W]["));
        assert!(lines[2].starts_with("[E]["));
        assert!(lines[2].ends_with(" : failed"));
    }

    #[test]
    fn test_file_logger_keeps_existing_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ops.log");
        std::fs::write(&path, "previous\n").unwrap();

        FileLogger::open(&path).unwrap().log_information("next");

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("previous\n"));
        assert_eq!(contents.lines().count(), 2);
    }

    #[test]
    fn test_from_config_mutes_disabled_severities() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ops.log");
        let config = LoggingConfig {
            file: Some(path.clone()),
            information: false,
            ..LoggingConfig::default()
        };

        let logger = from_config(&config).unwrap();
        logger.log_information("hidden");
        logger.log_error("shown");

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(!contents.contains("hidden"));
        assert!(contents.contains("shown"));
    }

    #[test]
    fn test_from_config_without_file() {
        let logger = from_config(&LoggingConfig::default()).unwrap();
        logger.log_information("to tracing only");
    }
}
