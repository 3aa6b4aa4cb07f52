//! Command-line adapter for the toolgate tool invocation gateway.
//!
//! Owns configuration loading, logging, the built-in local tools, and the
//! composition of the gateway over the MCP session manager.

#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

// Used only by the binary entry point
use dotenvy as _;
use tracing_subscriber as _;

pub mod bootstrap;
pub mod builtins;
pub mod commands;
pub mod config;
pub mod emitter;
pub mod error;
pub mod handlers;
pub mod parser;
pub mod presentation;

// Re-export primary types for convenient access
pub use bootstrap::{CliContext, bootstrap};
pub use commands::Commands;
pub use config::{ConfigLoader, FileConfig, PolicyConfig};
pub use emitter::TracingEmitter;
pub use error::CliError;
pub use parser::Cli;
