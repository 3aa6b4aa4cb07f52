//! Main CLI parser and top-level argument handling.

use std::path::PathBuf;

use clap::Parser;

use crate::commands::Commands;

/// Command-line interface for the tool invocation gateway.
#[derive(Parser)]
#[command(name = "toolgate")]
#[command(about = "Route tool calls to built-in handlers and MCP tool servers")]
#[command(version)]
pub struct Cli {
    /// Configuration file (defaults to the per-user toolgate.toml)
    #[arg(long, global = true, env = "TOOLGATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}
