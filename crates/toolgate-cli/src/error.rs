//! CLI-specific error types and mappings.
//!
//! Maps gateway, settings, and configuration errors to exit codes and
//! user-facing messages.

use thiserror::Error;
use toolgate_core::{GatewayError, SettingsError};

/// CLI-specific error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// Gateway error that is not a tool outcome.
    #[error("{0}")]
    Gateway(String),

    /// The tool ran (or was refused) and reported failure.
    #[error("{0}")]
    Tool(String),

    /// Argument parsing error.
    #[error("Invalid arguments: {0}")]
    Arguments(String),

    /// IO error (file not found, permission denied, etc.).
    #[error("IO error: {0}")]
    Io(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A server could not be reached.
    #[error("Server unavailable: {0}")]
    Unavailable(String),
}

impl CliError {
    /// Map error to appropriate exit code.
    ///
    /// Exit codes follow Unix conventions:
    /// - 0: Success
    /// - 1: General error
    /// - 2: Misuse of shell command (invalid arguments)
    /// - 64-78: Reserved for specific error categories (see sysexits.h)
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Gateway(_) | Self::Tool(_) => 1,
            Self::Arguments(_) => 2,   // EX_USAGE
            Self::Unavailable(_) => 69, // EX_UNAVAILABLE
            Self::Io(_) => 74,         // EX_IOERR
            Self::Config(_) => 78,     // EX_CONFIG
        }
    }
}

impl From<GatewayError> for CliError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::InvalidArguments { .. } => Self::Arguments(err.to_string()),
            GatewayError::InvalidConfig(msg) => Self::Config(msg),
            GatewayError::ConnectionError { .. }
            | GatewayError::HandshakeTimeout { .. }
            | GatewayError::ServerUnavailable { .. } => Self::Unavailable(err.to_string()),
            GatewayError::ToolFailed { .. }
            | GatewayError::ConfirmationRequired(_)
            | GatewayError::InvocationTimeout { .. } => Self::Tool(err.to_string()),
            GatewayError::ToolNotFound(_)
            | GatewayError::DiscoveryError { .. }
            | GatewayError::TransportError { .. } => Self::Gateway(err.to_string()),
        }
    }
}

impl From<SettingsError> for CliError {
    fn from(err: SettingsError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<figment::Error> for CliError {
    fn from(err: figment::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        Self::Arguments(err.to_string())
    }
}
