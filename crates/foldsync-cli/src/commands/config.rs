//! Config command - View and manage foldsync configuration
//!
//! Provides the `foldsync config` CLI command which:
//! 1. Shows the current configuration (YAML or JSON)
//! 2. Sets individual configuration values via dot-notation keys
//! 3. Validates the configuration file and reports errors
//! 4. Prints the configuration file location

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;
use foldsync_core::config::Config;
use foldsync_core::domain::SyncMode;
use tracing::info;

use crate::output::{get_formatter, OutputFormat};

/// Keys accepted by `config set`, with a short description
const SUPPORTED_KEYS: &[(&str, &str)] = &[
    ("sync.folder1", "First folder"),
    ("sync.folder2", "Second folder"),
    ("sync.mode", "OneWay|TwoWaySourceFirst|TwoWayDestFirst"),
    ("watcher.buffer_size", "Watcher channel capacity"),
    ("watcher.rename_pair_window_ms", "Rename pairing window (ms)"),
    ("engine.busy_retry_interval_ms", "Busy-file retry interval (ms)"),
    ("engine.busy_timeout_ms", "Busy-file timeout (ms)"),
    ("engine.max_retries", "Attempts before a change is given up"),
    ("engine.idle_poll_ms", "Worker idle poll (ms)"),
    ("engine.interrupt_poll_ms", "Pause/stop acknowledgement poll (ms)"),
    ("engine.echo_settle_ms", "Echo suppression settle window (ms)"),
    ("engine.compare_before_copy", "true|false"),
    ("engine.dead_letter_capacity", "Dead letters kept"),
    ("logging.level", "trace|debug|info|warn|error"),
    ("logging.file", "Operational log file (none to disable)"),
    ("logging.information", "true|false"),
    ("logging.warning", "true|false"),
    ("logging.error", "true|false"),
];

/// Config subcommands
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (e.g., "sync.mode")
        key: String,
        /// New value
        value: String,
    },
    /// Validate configuration file
    Validate,
    /// Print the configuration file path
    Path,
}

impl ConfigCommand {
    /// Execute the config command against the file at `config_path`
    pub fn execute(&self, config_path: &Path, format: OutputFormat) -> Result<()> {
        match self {
            ConfigCommand::Show => execute_show(config_path, format),
            ConfigCommand::Set { key, value } => execute_set(config_path, key, value, format),
            ConfigCommand::Validate => execute_validate(config_path, format),
            ConfigCommand::Path => execute_path(config_path, format),
        }
    }
}

fn execute_show(config_path: &Path, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);
    let config = Config::load_or_default(config_path);

    info!(config_path = %config_path.display(), "Showing configuration");

    if format.is_json() {
        let json =
            serde_json::to_value(&config).context("Failed to serialize configuration to JSON")?;
        formatter.print_json(&json);
    } else {
        formatter.success(&format!("Configuration ({})", config_path.display()));
        formatter.info("");

        let yaml =
            serde_yaml::to_string(&config).context("Failed to serialize configuration to YAML")?;
        for line in yaml.lines() {
            formatter.info(line);
        }
    }

    Ok(())
}

fn execute_set(config_path: &Path, key: &str, value: &str, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);
    let mut config = Config::load_or_default(config_path);

    info!(key = %key, value = %value, "Setting configuration value");

    if let Err(e) = apply_config_value(&mut config, key, value) {
        if format.is_json() {
            formatter.print_json(&serde_json::json!({
                "success": false,
                "key": key,
                "value": value,
                "error": format!("{e:#}"),
            }));
        } else {
            formatter.error(&format!("Failed to set '{}': {:#}", key, e));
            formatter.info("");
            formatter.info("Supported keys:");
            for (name, help) in SUPPORTED_KEYS {
                formatter.info(&format!("  {:<34} - {}", name, help));
            }
        }
        return Ok(());
    }

    // Validate the new config before saving
    let errors = config.validate();
    if !errors.is_empty() {
        let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
        if format.is_json() {
            formatter.print_json(&serde_json::json!({
                "success": false,
                "key": key,
                "value": value,
                "errors": messages,
            }));
        } else {
            formatter.error(&format!(
                "Invalid value for '{}': {}",
                key,
                messages.join("; ")
            ));
        }
        return Ok(());
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create configuration directory")?;
    }
    let yaml = serde_yaml::to_string(&config).context("Failed to serialize configuration")?;
    std::fs::write(config_path, yaml).context("Failed to write configuration file")?;

    if format.is_json() {
        formatter.print_json(&serde_json::json!({
            "success": true,
            "key": key,
            "value": value,
            "config_path": config_path.display().to_string(),
        }));
    } else {
        formatter.success(&format!("Set {} = {}", key, value));
        formatter.info(&format!("Saved to {}", config_path.display()));
    }

    Ok(())
}

fn execute_validate(config_path: &Path, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);

    if !config_path.exists() {
        if format.is_json() {
            formatter.print_json(&serde_json::json!({
                "valid": false,
                "config_path": config_path.display().to_string(),
                "errors": ["Configuration file not found. Using defaults."],
            }));
        } else {
            formatter.info(&format!(
                "Configuration file not found at {}",
                config_path.display()
            ));
            formatter.info(
                "Using default configuration. Run 'foldsync config set <key> <value>' to create one.",
            );
        }
        return Ok(());
    }

    let config = match Config::load(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            if format.is_json() {
                formatter.print_json(&serde_json::json!({
                    "valid": false,
                    "config_path": config_path.display().to_string(),
                    "errors": [format!("Failed to parse configuration: {}", e)],
                }));
            } else {
                formatter.error(&format!("Failed to parse configuration: {}", e));
                formatter.info(&format!("File: {}", config_path.display()));
            }
            return Ok(());
        }
    };

    info!(config_path = %config_path.display(), "Validating configuration");

    let errors = config.validate();
    let warnings = config.warnings();

    if format.is_json() {
        let error_strings: Vec<String> = errors.iter().map(ToString::to_string).collect();
        let warning_strings: Vec<String> = warnings.iter().map(ToString::to_string).collect();
        formatter.print_json(&serde_json::json!({
            "valid": errors.is_empty(),
            "config_path": config_path.display().to_string(),
            "errors": error_strings,
            "warnings": warning_strings,
        }));
    } else if errors.is_empty() {
        formatter.success("Configuration is valid");
        formatter.info(&format!("File: {}", config_path.display()));
        for warning in &warnings {
            formatter.warn(&format!("{} - {}", warning.field, warning.message));
        }
    } else {
        formatter.error(&format!(
            "Configuration has {} error{}:",
            errors.len(),
            if errors.len() == 1 { "" } else { "s" }
        ));
        formatter.info(&format!("File: {}", config_path.display()));
        formatter.info("");
        for error in &errors {
            formatter.info(&format!("  {} - {}", error.field, error.message));
        }
    }

    Ok(())
}

fn execute_path(config_path: &Path, format: OutputFormat) -> Result<()> {
    if format.is_json() {
        get_formatter(format).print_json(&serde_json::json!({
            "config_path": config_path.display().to_string(),
            "exists": config_path.exists(),
        }));
    } else {
        println!("{}", config_path.display());
    }
    Ok(())
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => anyhow::bail!("Expected true or false for {}", key),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse::<T>()
        .with_context(|| format!("Expected a positive integer for {}", key))
}

/// Apply a dot-notation key/value pair to a Config struct
///
/// See [`SUPPORTED_KEYS`] for the accepted keys.
fn apply_config_value(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        // --- sync ---
        "sync.folder1" => config.sync.folder1 = PathBuf::from(value),
        "sync.folder2" => config.sync.folder2 = PathBuf::from(value),
        "sync.mode" => {
            config.sync.mode = value.parse::<SyncMode>()?;
        }

        // --- watcher ---
        "watcher.buffer_size" => config.watcher.buffer_size = parse_number(key, value)?,
        "watcher.rename_pair_window_ms" => {
            config.watcher.rename_pair_window_ms = parse_number(key, value)?;
        }

        // --- engine ---
        "engine.busy_retry_interval_ms" => {
            config.engine.busy_retry_interval_ms = parse_number(key, value)?;
        }
        "engine.busy_timeout_ms" => config.engine.busy_timeout_ms = parse_number(key, value)?,
        "engine.max_retries" => config.engine.max_retries = parse_number(key, value)?,
        "engine.idle_poll_ms" => config.engine.idle_poll_ms = parse_number(key, value)?,
        "engine.interrupt_poll_ms" => config.engine.interrupt_poll_ms = parse_number(key, value)?,
        "engine.echo_settle_ms" => config.engine.echo_settle_ms = parse_number(key, value)?,
        "engine.compare_before_copy" => {
            config.engine.compare_before_copy = parse_bool(key, value)?;
        }
        "engine.dead_letter_capacity" => {
            config.engine.dead_letter_capacity = parse_number(key, value)?;
        }

        // --- logging ---
        "logging.level" => config.logging.level = value.to_string(),
        "logging.file" => {
            config.logging.file = if value.is_empty() || value == "none" {
                None
            } else {
                Some(PathBuf::from(value))
            };
        }
        "logging.information" => config.logging.information = parse_bool(key, value)?,
        "logging.warning" => config.logging.warning = parse_bool(key, value)?,
        "logging.error" => config.logging.error = parse_bool(key, value)?,

        _ => {
            anyhow::bail!("Unknown configuration key: '{}'", key);
        }
    }

    Ok(())
}
