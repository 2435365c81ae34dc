//! Completions command - Shell completion scripts
//!
//! `foldsync completions bash > ~/.local/share/bash-completion/completions/foldsync`

use std::io::{self, Write};

use anyhow::{Context, Result};
use clap::CommandFactory;
use clap_complete::Shell;

const BIN_NAME: &str = "foldsync";

/// Prints a completion script for the given shell
#[derive(Debug, clap::Args)]
pub struct CompletionsCommand {
    /// Target shell
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsCommand {
    pub fn execute(&self) -> Result<()> {
        let mut stdout = io::stdout().lock();
        write_completions(self.shell, &mut stdout);
        stdout.flush().context("Failed to write completions")
    }
}

/// Writes the completion script for every `foldsync` subcommand to `out`
fn write_completions(shell: Shell, out: &mut dyn Write) {
    let mut cmd = crate::Cli::command();
    clap_complete::generate(shell, &mut cmd, BIN_NAME, out);
}
