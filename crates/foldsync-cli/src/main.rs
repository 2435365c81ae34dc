//! foldsync CLI - Command-line interface for foldsync
//!
//! Provides commands for:
//! - Running the sync service in the foreground
//! - One-shot reconciliation of a folder pair
//! - Viewing, validating and editing the configuration

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use foldsync_core::config::Config;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    completions::CompletionsCommand, config::ConfigCommand, reconcile::ReconcileCommand,
    run::RunCommand,
};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "foldsync", version, about = "Keep two folders synchronized")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the sync service in the foreground until Ctrl+C
    Run(RunCommand),
    /// Reconcile the two folders once and exit
    Reconcile(ReconcileCommand),
    /// View and manage configuration
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Generate shell completions
    Completions(CompletionsCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup tracing
    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let format = OutputFormat::from_flag(cli.json);
    let config_path = cli.config.unwrap_or_else(Config::default_path);

    match cli.command {
        Commands::Run(cmd) => cmd.execute(&config_path, format).await,
        Commands::Reconcile(cmd) => cmd.execute(&config_path, format).await,
        Commands::Config(cmd) => cmd.execute(&config_path, format),
        Commands::Completions(cmd) => cmd.execute(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["foldsync", "config", "show", "--json", "-vv"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Config(ConfigCommand::Show)));
    }

    #[test]
    fn test_config_override() {
        let cli =
            Cli::try_parse_from(["foldsync", "--config", "/tmp/alt.yaml", "reconcile"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/alt.yaml")));
    }
}
