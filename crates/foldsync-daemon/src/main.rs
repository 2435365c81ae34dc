//! foldsync Daemon - Background folder synchronization
//!
//! This binary runs as a systemd user service and:
//! - Loads the YAML configuration (`$FOLDSYNC_CONFIG` or the default path)
//! - Starts a [`SyncService`] for the configured folder pair
//! - Maps signals onto the service lifecycle:
//!   - `SIGTERM`/`SIGINT` → stop and exit
//!   - `SIGUSR1` → pause
//!   - `SIGUSR2` → continue
//!
//! # Architecture
//!
//! A signal task turns OS signals into [`ControlRequest`]s on a channel.
//! The main loop applies them to the service on the blocking pool, since
//! pause and stop wait for the worker to acknowledge. Shutdown is propagated
//! with a `CancellationToken`.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use foldsync_core::config::Config;
use foldsync_sync::{logging, SyncService};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Environment variable overriding the configuration path
const CONFIG_ENV: &str = "FOLDSYNC_CONFIG";

// ============================================================================
// Control requests
// ============================================================================

/// A lifecycle request raised by a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControlRequest {
    Pause,
    Continue,
    Stop,
}

impl ControlRequest {
    /// Applies the request; returns false once the daemon should exit
    fn apply(self, service: &SyncService) -> bool {
        match self {
            ControlRequest::Pause => {
                service.pause();
                true
            }
            ControlRequest::Continue => {
                service.resume();
                true
            }
            ControlRequest::Stop => {
                service.stop();
                false
            }
        }
    }
}

// ============================================================================
// Signal handling
// ============================================================================

/// Forwards SIGUSR1/SIGUSR2 as pause/continue and SIGTERM/SIGINT as stop
///
/// Returns after forwarding a stop request or when `token` is cancelled.
#[cfg(unix)]
async fn forward_signals(tx: mpsc::Sender<ControlRequest>, token: CancellationToken) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let mut interrupt =
        signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
    let mut usr1 = signal(SignalKind::user_defined1()).context("Failed to install SIGUSR1 handler")?;
    let mut usr2 = signal(SignalKind::user_defined2()).context("Failed to install SIGUSR2 handler")?;

    loop {
        let request = tokio::select! {
            _ = terminate.recv() => {
                info!("Received SIGTERM");
                ControlRequest::Stop
            }
            _ = interrupt.recv() => {
                info!("Received SIGINT");
                ControlRequest::Stop
            }
            _ = usr1.recv() => {
                info!("Received SIGUSR1");
                ControlRequest::Pause
            }
            _ = usr2.recv() => {
                info!("Received SIGUSR2");
                ControlRequest::Continue
            }
            _ = token.cancelled() => return Ok(()),
        };

        if tx.send(request).await.is_err() || request == ControlRequest::Stop {
            return Ok(());
        }
    }
}

#[cfg(not(unix))]
async fn forward_signals(tx: mpsc::Sender<ControlRequest>, token: CancellationToken) -> Result<()> {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to install Ctrl+C handler")?;
            info!("Received Ctrl+C");
            let _ = tx.send(ControlRequest::Stop).await;
        }
        _ = token.cancelled() => {}
    }
    Ok(())
}

// ============================================================================
// Daemon
// ============================================================================

fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path)
}

/// Loads and validates the configuration
///
/// Runs before tracing is installed, so problems are reported in the error.
fn load_config(path: &Path) -> Result<Config> {
    let config = if path.exists() {
        Config::load(path)?
    } else {
        Config::default()
    };

    let problems = config.validate();
    if !problems.is_empty() {
        let details: Vec<String> = problems.iter().map(ToString::to_string).collect();
        anyhow::bail!(
            "Invalid configuration in {}: {}",
            path.display(),
            details.join("; ")
        );
    }
    Ok(config)
}

fn init_tracing(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .init();
}

async fn run(config: Config, shutdown: CancellationToken) -> Result<()> {
    let logger = logging::from_config(&config.logging).context("Failed to open log file")?;
    let service = Arc::new(SyncService::from_config(&config, logger)?);

    let starting = Arc::clone(&service);
    tokio::task::spawn_blocking(move || starting.start())
        .await
        .context("Startup task panicked")?
        .context("Failed to start sync service")?;

    let (tx, mut rx) = mpsc::channel(8);
    let signals = tokio::spawn(forward_signals(tx, shutdown.clone()));

    while let Some(request) = rx.recv().await {
        let target = Arc::clone(&service);
        let keep_running = tokio::task::spawn_blocking(move || request.apply(&target))
            .await
            .context("Control task panicked")?;
        if !keep_running {
            break;
        }
    }

    shutdown.cancel();
    match signals.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %format!("{e:#}"), "Signal handling failed"),
        Err(e) => warn!(error = %e, "Signal task aborted"),
    }

    // Covers the signal task failing before a stop was delivered
    let remaining = Arc::clone(&service);
    tokio::task::spawn_blocking(move || {
        if remaining.state() != foldsync_core::domain::ServiceState::Stopped {
            remaining.stop();
        }
    })
    .await
    .context("Shutdown task panicked")?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let path = config_path();
    let config = load_config(&path)?;
    init_tracing(&config);

    if path.exists() {
        info!(config_path = %path.display(), "Loaded configuration");
    } else {
        warn!(config_path = %path.display(), "Configuration file not found, using defaults");
    }
    for warning in config.warnings() {
        warn!(field = %warning.field, "{}", warning.message);
    }

    info!(
        folder1 = %config.sync.folder1.display(),
        folder2 = %config.sync.folder2.display(),
        mode = %config.sync.mode,
        "foldsync daemon starting (foldsyncd)"
    );

    let shutdown = CancellationToken::new();
    let result = run(config, shutdown).await;

    match &result {
        Ok(()) => info!("foldsync daemon shut down gracefully"),
        Err(e) => error!(error = %format!("{e:#}"), "foldsync daemon exiting with error"),
    }

    result
}

// ============================================================================
// Tests
// ============================================================================
