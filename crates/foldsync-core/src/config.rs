//! Configuration module for foldsync.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::{DomainError, RootPair, SyncMode};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for foldsync.
///
/// Every section is optional in the YAML file; missing sections and fields
/// take their default values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sync: SyncConfig,
    pub watcher: WatcherConfig,
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
}

/// Which folders are synchronized, and how.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// First configured folder (the input root unless `mode` is `TwoWayDestFirst`).
    pub folder1: PathBuf,
    /// Second configured folder.
    pub folder2: PathBuf,
    /// Sync mode: `OneWay`, `TwoWaySourceFirst` or `TwoWayDestFirst`.
    pub mode: SyncMode,
}

/// Filesystem notification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Capacity of the channel between the watcher callback and the worker.
    pub buffer_size: usize,
    /// Milliseconds a rename-from notification waits for its rename-to partner.
    pub rename_pair_window_ms: u64,
}

/// Worker, retry and file-operation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Milliseconds between attempts to lock a busy file.
    pub busy_retry_interval_ms: u64,
    /// Milliseconds after which a busy file gives up with a timeout.
    pub busy_timeout_ms: u64,
    /// Failed attempts allowed before a change is parked as a dead letter.
    pub max_retries: u32,
    /// Milliseconds the worker sleeps when the queue is empty.
    pub idle_poll_ms: u64,
    /// Milliseconds between checks while waiting for the worker to acknowledge.
    pub interrupt_poll_ms: u64,
    /// Milliseconds self-written paths stay on the ignore lists.
    pub echo_settle_ms: u64,
    /// Skip copies whose destination already has identical content.
    ///
    /// When disabled, every reconciliation rewrites all mirrored files, and
    /// the two-way pass copies each output file back over its identical
    /// input copy. [`Config::warnings`] reports this.
    pub compare_before_copy: bool,
    /// Maximum number of dead letters kept; the oldest is evicted first.
    pub dead_letter_capacity: usize,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Optional operational log file (`[I]`/`[W]`/`[E]` lines).
    pub file: Option<PathBuf>,
    /// Emit informational operational messages.
    pub information: bool,
    /// Emit warnings.
    pub warning: bool,
    /// Emit errors.
    pub error: bool,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/foldsync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("foldsync")
            .join("config.yaml")
    }

    /// Resolves the input/output root pair described by the `sync` section.
    pub fn root_pair(&self) -> Result<RootPair, DomainError> {
        RootPair::new(&self.sync.folder1, &self.sync.folder2, self.sync.mode)
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for SyncConfig {
    fn default() -> Self {
        let base = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("~"))
            .join("foldsync");
        Self {
            folder1: base.join("source"),
            folder2: base.join("mirror"),
            mode: SyncMode::OneWay,
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            buffer_size: 4096,
            rename_pair_window_ms: 50,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            busy_retry_interval_ms: 200,
            busy_timeout_ms: 60_000,
            max_retries: 3,
            idle_poll_ms: 50,
            interrupt_poll_ms: 200,
            echo_settle_ms: 250,
            compare_before_copy: true,
            dead_letter_capacity: 256,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            information: true,
            warning: true,
            error: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"engine.busy_timeout_ms"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

fn is_blank(path: &Path) -> bool {
    path.to_string_lossy().trim().is_empty()
}

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- sync ---
        let folder1_blank = is_blank(&self.sync.folder1);
        let folder2_blank = is_blank(&self.sync.folder2);
        if folder1_blank {
            errors.push(ValidationError {
                field: "sync.folder1".into(),
                message: "must not be blank".into(),
            });
        }
        if folder2_blank {
            errors.push(ValidationError {
                field: "sync.folder2".into(),
                message: "must not be blank".into(),
            });
        }
        if !folder1_blank && !folder2_blank {
            if let Err(e) = self.root_pair() {
                errors.push(ValidationError {
                    field: "sync.folder2".into(),
                    message: e.to_string(),
                });
            }
        }

        // --- watcher ---
        if self.watcher.buffer_size == 0 {
            errors.push(ValidationError {
                field: "watcher.buffer_size".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.watcher.rename_pair_window_ms == 0 {
            errors.push(ValidationError {
                field: "watcher.rename_pair_window_ms".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- engine ---
        if self.engine.busy_retry_interval_ms == 0 {
            errors.push(ValidationError {
                field: "engine.busy_retry_interval_ms".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.engine.busy_timeout_ms == 0 {
            errors.push(ValidationError {
                field: "engine.busy_timeout_ms".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.engine.busy_retry_interval_ms >= self.engine.busy_timeout_ms {
            errors.push(ValidationError {
                field: "engine.busy_retry_interval_ms".into(),
                message: format!(
                    "busy_retry_interval_ms ({}) must be below busy_timeout_ms ({})",
                    self.engine.busy_retry_interval_ms, self.engine.busy_timeout_ms
                ),
            });
        }
        if self.engine.idle_poll_ms == 0 {
            errors.push(ValidationError {
                field: "engine.idle_poll_ms".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.engine.interrupt_poll_ms == 0 {
            errors.push(ValidationError {
                field: "engine.interrupt_poll_ms".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.engine.dead_letter_capacity == 0 {
            errors.push(ValidationError {
                field: "engine.dead_letter_capacity".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }
        if let Some(file) = &self.logging.file {
            if is_blank(file) {
                errors.push(ValidationError {
                    field: "logging.file".into(),
                    message: "must not be blank when set".into(),
                });
            }
        }

        errors
    }

    /// Returns settings that are valid but degrade sync behaviour.
    ///
    /// Unlike [`Config::validate`], these do not prevent the service from
    /// starting.
    pub fn warnings(&self) -> Vec<ValidationError> {
        let mut warnings = Vec::new();

        if !self.engine.compare_before_copy {
            let message = if self.sync.mode.is_two_way() {
                "disabled: each reconciliation rewrites every file in both folders"
            } else {
                "disabled: each reconciliation rewrites every mirrored file"
            };
            warnings.push(ValidationError {
                field: "engine.compare_before_copy".into(),
                message: message.into(),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use foldsync_core::config::ConfigBuilder;
/// use foldsync_core::domain::SyncMode;
///
/// let config = ConfigBuilder::new()
///     .folders("/srv/source", "/srv/mirror")
///     .mode(SyncMode::TwoWaySourceFirst)
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- sync ---

    pub fn folders(mut self, folder1: impl Into<PathBuf>, folder2: impl Into<PathBuf>) -> Self {
        self.config.sync.folder1 = folder1.into();
        self.config.sync.folder2 = folder2.into();
        self
    }

    pub fn mode(mut self, mode: SyncMode) -> Self {
        self.config.sync.mode = mode;
        self
    }

    // --- watcher ---

    pub fn watcher_buffer_size(mut self, size: usize) -> Self {
        self.config.watcher.buffer_size = size;
        self
    }

    pub fn watcher_rename_pair_window_ms(mut self, ms: u64) -> Self {
        self.config.watcher.rename_pair_window_ms = ms;
        self
    }

    // --- engine ---

    pub fn busy_retry_interval_ms(mut self, ms: u64) -> Self {
        self.config.engine.busy_retry_interval_ms = ms;
        self
    }

    pub fn busy_timeout_ms(mut self, ms: u64) -> Self {
        self.config.engine.busy_timeout_ms = ms;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.engine.max_retries = n;
        self
    }

    pub fn idle_poll_ms(mut self, ms: u64) -> Self {
        self.config.engine.idle_poll_ms = ms;
        self
    }

    pub fn interrupt_poll_ms(mut self, ms: u64) -> Self {
        self.config.engine.interrupt_poll_ms = ms;
        self
    }

    pub fn echo_settle_ms(mut self, ms: u64) -> Self {
        self.config.engine.echo_settle_ms = ms;
        self
    }

    pub fn compare_before_copy(mut self, enabled: bool) -> Self {
        self.config.engine.compare_before_copy = enabled;
        self
    }

    pub fn dead_letter_capacity(mut self, n: usize) -> Self {
        self.config.engine.dead_letter_capacity = n;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_file(mut self, file: PathBuf) -> Self {
        self.config.logging.file = Some(file);
        self
    }

    pub fn logging_severities(mut self, information: bool, warning: bool, error: bool) -> Self {
        self.config.logging.information = information;
        self.config.logging.warning = warning;
        self.config.logging.error = error;
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
