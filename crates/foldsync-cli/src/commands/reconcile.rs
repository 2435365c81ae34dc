//! Reconcile command - One-shot folder reconciliation
//!
//! Copies the input folder over the output folder, then either removes
//! output-only orphans (one-way) or copies them back (two-way). No watchers
//! are started.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use foldsync_sync::fileops::DirectoryOps;
use foldsync_sync::reconcile;

use super::{load_config, FolderArgs};
use crate::output::{get_formatter, FolderPair, OutputFormat};

/// Reconciles the configured folders once
#[derive(Debug, Args)]
pub struct ReconcileCommand {
    #[command(flatten)]
    pub folders: FolderArgs,
}

impl ReconcileCommand {
    pub async fn execute(&self, config_path: &Path, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);
        let config = load_config(config_path, &self.folders)?;

        let roots = config.root_pair()?;
        let mode = config.sync.mode;
        let ops = DirectoryOps::from_config(&config.engine);

        let (input, output) = (roots.input().to_path_buf(), roots.output().to_path_buf());
        let report = tokio::task::spawn_blocking(move || reconcile(&input, &output, mode, &ops))
            .await
            .context("Reconcile task panicked")??;

        formatter.reconcile_report(
            FolderPair {
                input: roots.input(),
                output: roots.output(),
                mode,
            },
            &report,
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use foldsync_core::domain::SyncMode;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_reconcile_command_mirrors_folders() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source");
        let mirror = dir.path().join("mirror");
        std::fs::create_dir_all(source.join("docs")).unwrap();
        std::fs::write(source.join("docs/readme.txt"), "hi").unwrap();

        let cmd = ReconcileCommand {
            folders: FolderArgs {
                folder1: Some(source.clone()),
                folder2: Some(mirror.clone()),
                mode: Some(SyncMode::OneWay),
            },
        };
        cmd.execute(&dir.path().join("absent.yaml"), OutputFormat::Json)
            .await
            .unwrap();

        assert_eq!(
            std::fs::read_to_string(mirror.join("docs/readme.txt")).unwrap(),
            "hi"
        );
    }
}
