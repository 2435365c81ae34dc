//! Run command - Foreground sync service
//!
//! Provides the `foldsync run` CLI command which:
//! 1. Loads configuration (with optional folder/mode overrides)
//! 2. Starts a `SyncService`, running the initial reconciliation
//! 3. Keeps the folders in sync until Ctrl+C, then stops cleanly
//! 4. Reports any changes that were given up on

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use foldsync_sync::{logging, SyncService};
use tracing::info;

use super::{load_config, FolderArgs};
use crate::output::{get_formatter, FolderPair, OutputFormat};

/// Runs the sync service until interrupted
#[derive(Debug, Args)]
pub struct RunCommand {
    #[command(flatten)]
    pub folders: FolderArgs,
}

impl RunCommand {
    pub async fn execute(&self, config_path: &Path, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);
        let config = load_config(config_path, &self.folders)?;

        let logger = logging::from_config(&config.logging).context("Failed to open log file")?;
        let service = Arc::new(SyncService::from_config(&config, logger)?);

        let starting = Arc::clone(&service);
        tokio::task::spawn_blocking(move || starting.start())
            .await
            .context("Startup task panicked")?
            .context("Failed to start sync service")?;

        if !format.is_json() {
            formatter.success(&format!(
                "Syncing {} -> {} ({})",
                service.input_root().display(),
                service.output_root().display(),
                service.mode()
            ));
            formatter.info("Press Ctrl+C to stop");
        }

        tokio::signal::ctrl_c()
            .await
            .context("Failed to install Ctrl+C handler")?;
        info!("Received Ctrl+C, stopping");

        let stopping = Arc::clone(&service);
        let dead_letters = tokio::task::spawn_blocking(move || {
            let letters = stopping.dead_letters();
            stopping.stop();
            letters
        })
        .await
        .context("Shutdown task panicked")?;

        formatter.session_summary(
            FolderPair {
                input: service.input_root(),
                output: service.output_root(),
                mode: service.mode(),
            },
            &dead_letters,
        );

        Ok(())
    }
}
