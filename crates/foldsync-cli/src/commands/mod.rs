//! CLI subcommands

pub mod completions;
pub mod config;
pub mod reconcile;
pub mod run;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use foldsync_core::config::Config;
use foldsync_core::domain::SyncMode;
use tracing::{debug, info};

/// Folder pair and mode overrides shared by `run` and `reconcile`
#[derive(Debug, Clone, Default, Args)]
pub struct FolderArgs {
    /// First folder (overrides sync.folder1)
    #[arg(requires = "folder2")]
    pub folder1: Option<PathBuf>,

    /// Second folder (overrides sync.folder2)
    pub folder2: Option<PathBuf>,

    /// Sync mode: one-way, two-way-source-first or two-way-dest-first
    #[arg(long, short)]
    pub mode: Option<SyncMode>,
}

impl FolderArgs {
    fn apply(&self, config: &mut Config) {
        if let (Some(folder1), Some(folder2)) = (&self.folder1, &self.folder2) {
            config.sync.folder1 = folder1.clone();
            config.sync.folder2 = folder2.clone();
        }
        if let Some(mode) = self.mode {
            config.sync.mode = mode;
        }
    }
}

/// Loads `path` (defaults when absent), applies overrides and validates
pub fn load_config(path: &Path, overrides: &FolderArgs) -> Result<Config> {
    let mut config = if path.exists() {
        Config::load(path)
            .with_context(|| format!("Failed to parse configuration {}", path.display()))?
    } else {
        debug!(config_path = %path.display(), "Configuration file not found, using defaults");
        Config::default()
    };
    overrides.apply(&mut config);

    let problems = config.validate();
    if !problems.is_empty() {
        let details: Vec<String> = problems.iter().map(ToString::to_string).collect();
        anyhow::bail!("Invalid configuration: {}", details.join("; "));
    }

    info!(
        config_path = %path.display(),
        folder1 = %config.sync.folder1.display(),
        folder2 = %config.sync.folder2.display(),
        mode = %config.sync.mode,
        "Loaded configuration"
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_overrides_replace_folders_and_mode() {
        let dir = TempDir::new().unwrap();
        let overrides = FolderArgs {
            folder1: Some(dir.path().join("a")),
            folder2: Some(dir.path().join("b")),
            mode: Some(SyncMode::TwoWayDestFirst),
        };

        let config = load_config(&dir.path().join("missing.yaml"), &overrides).unwrap();
        assert_eq!(config.sync.folder1, dir.path().join("a"));
        assert_eq!(config.sync.folder2, dir.path().join("b"));
        assert_eq!(config.sync.mode, SyncMode::TwoWayDestFirst);
    }

    #[test]
    fn test_file_values_kept_without_overrides() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "sync:\n  folder1: /data/photos\n  folder2: /backup/photos\n  mode: TwoWaySourceFirst\n",
        )
        .unwrap();

        let config = load_config(&path, &FolderArgs::default()).unwrap();
        assert_eq!(config.sync.folder1, PathBuf::from("/data/photos"));
        assert_eq!(config.sync.mode, SyncMode::TwoWaySourceFirst);
    }

    #[test]
    fn test_nested_override_is_rejected() {
        let dir = TempDir::new().unwrap();
        let overrides = FolderArgs {
            folder1: Some(dir.path().join("a")),
            folder2: Some(dir.path().join("a/b")),
            mode: None,
        };

        let err = load_config(&dir.path().join("missing.yaml"), &overrides).unwrap_err();
        assert!(err.to_string().contains("sync.folder2"));
    }

    #[test]
    fn test_unparseable_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "sync: 42\n").unwrap();
        assert!(load_config(&path, &FolderArgs::default()).is_err());
    }
}
