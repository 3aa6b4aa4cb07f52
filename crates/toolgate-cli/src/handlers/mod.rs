//! Command handlers.
//!
//! Handlers follow the canonical pattern:
//! - Signature: `pub async fn execute(ctx: &CliContext, ...) -> Result<()>`
//! - Thin wrappers that parse CLI input, call the gateway or session
//!   manager, and format output for the terminal
//!
//! Commands that only read configuration (`policy`, `classify`, `config`)
//! take the loaded config instead and never connect to servers.

pub mod call;
pub mod config;
pub mod policy;
pub mod serve;
pub mod servers;
pub mod tools;
