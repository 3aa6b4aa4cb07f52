//! Gateway error taxonomy.
//!
//! Every failure surfaced by the gateway is one of these variants. Adapter
//! crates convert their own errors at the port boundary so transport details
//! (process errors, HTTP status codes) never leak past it.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Message fragment every blocked confirmation-gated call carries.
pub const CONFIRMATION_REQUIRED_MESSAGE: &str = "requires user confirmation before execution";

/// Errors produced while resolving, gating, or dispatching a tool call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The transport to a server could not be opened or the peer rejected it.
    #[error("Connection to '{server_id}' failed: {message}")]
    ConnectionError { server_id: String, message: String },

    /// The peer did not complete capability negotiation in time.
    #[error("Handshake with '{server_id}' timed out after {}ms", .timeout.as_millis())]
    HandshakeTimeout { server_id: String, timeout: Duration },

    /// The peer returned a malformed tool catalog.
    #[error("Tool discovery on '{server_id}' failed: {message}")]
    DiscoveryError { server_id: String, message: String },

    /// No local or remote tool matches the requested name.
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// The tool is side-effecting and the call was not confirmed.
    #[error("Tool '{0}' requires user confirmation before execution")]
    ConfirmationRequired(String),

    /// The owning session is not ready to accept calls.
    #[error("Server '{server_id}' is unavailable ({state})")]
    ServerUnavailable { server_id: String, state: String },

    /// No response arrived within the invocation timeout.
    #[error("Tool '{tool}' timed out after {}ms", .timeout.as_millis())]
    InvocationTimeout { tool: String, timeout: Duration },

    /// Sending or receiving on an established transport failed.
    #[error("Transport error on '{server_id}': {message}")]
    TransportError { server_id: String, message: String },

    /// Arguments do not satisfy the tool's input schema.
    #[error("Invalid arguments for '{tool}': {}", .errors.join("; "))]
    InvalidArguments { tool: String, errors: Vec<String> },

    /// The handler ran and reported failure.
    #[error("Tool '{tool}' failed: {message}")]
    ToolFailed { tool: String, message: String },

    /// Configuration was rejected.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl GatewayError {
    pub const fn is_confirmation_required(&self) -> bool {
        matches!(self, Self::ConfirmationRequired(_))
    }

    /// Errors worth retrying after a reconnect.
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ServerUnavailable { .. }
                | Self::InvocationTimeout { .. }
                | Self::TransportError { .. }
                | Self::ConnectionError { .. }
                | Self::HandshakeTimeout { .. }
        )
    }
}

/// Categories of server errors for event consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Connection,
    Handshake,
    Discovery,
    Transport,
    Configuration,
}

/// User-safe error information carried by server error events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerErrorInfo {
    pub server_id: String,
    pub message: String,
    pub category: ErrorCategory,
}

impl ServerErrorInfo {
    pub fn new(
        server_id: impl Into<String>,
        message: impl Into<String>,
        category: ErrorCategory,
    ) -> Self {
        Self {
            server_id: server_id.into(),
            message: message.into(),
            category,
        }
    }

    /// Build error info from a gateway error attributed to `server_id`.
    pub fn from_error(server_id: impl Into<String>, error: &GatewayError) -> Self {
        Self::new(server_id, error.to_string(), ErrorCategory::from(error))
    }
}

impl From<&GatewayError> for ErrorCategory {
    fn from(error: &GatewayError) -> Self {
        match error {
            GatewayError::ConnectionError { .. } | GatewayError::ServerUnavailable { .. } => {
                Self::Connection
            }
            GatewayError::HandshakeTimeout { .. } => Self::Handshake,
            GatewayError::DiscoveryError { .. } => Self::Discovery,
            GatewayError::InvalidConfig(_) => Self::Configuration,
            GatewayError::TransportError { .. }
            | GatewayError::InvocationTimeout { .. }
            | GatewayError::ToolNotFound(_)
            | GatewayError::ConfirmationRequired(_)
            | GatewayError::InvalidArguments { .. }
            | GatewayError::ToolFailed { .. } => Self::Transport,
        }
    }
}
