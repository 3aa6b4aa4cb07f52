//! Subcommand definitions.

use clap::Subcommand;

/// Available subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// List every reachable tool with its risk class
    Tools {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Invoke a tool once and print the result
    Call {
        /// Tool name (aliases like fs_writeFile are accepted)
        tool: String,

        /// Arguments as a JSON object
        #[arg(short, long, default_value = "{}")]
        args: String,

        /// Confirm a side-effecting call
        #[arg(long)]
        confirm: bool,
    },

    /// Show the state of each configured server
    Servers,

    /// Show the confirmation rules in effect
    Policy,

    /// Classify tool names without running them
    Classify {
        /// Names to classify
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Serve invocation requests as JSON lines on stdin/stdout
    Serve,

    /// Print the effective configuration as TOML
    Config,
}
