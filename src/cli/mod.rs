//! Command-line interface.

use clap::{Parser, Subcommand};

/// Secretboard - share a secret anonymously
#[derive(Parser)]
#[command(name = "secretboard")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Start the web server (default)
    #[command(alias = "web")]
    Serve,

    /// Write a default config.toml to the working directory
    Init,

    /// Load and validate the configuration, then exit
    CheckConfig,
}

impl Cli {
    #[must_use]
    pub fn command_or_default(&self) -> Commands {
        self.command.unwrap_or(Commands::Serve)
    }
}
