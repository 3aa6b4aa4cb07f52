//! Session-level errors.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while talking to one tool server.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to spawn server process: {0}")]
    SpawnFailed(String),

    #[error("Failed to communicate with server: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP transport error: {0}")]
    Http(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Server returned error: code={code}, message={message}")]
    ServerError { code: i64, message: String },

    #[error("Timed out after {}ms waiting for {method}", .timeout.as_millis())]
    Timeout { method: String, timeout: Duration },

    #[error("Malformed tool catalog: {0}")]
    Discovery(String),

    #[error("Tool reported failure: {0}")]
    ToolError(String),

    #[error("Server not connected ({0})")]
    NotConnected(String),

    #[error("Transport closed")]
    TransportClosed,

    #[error("Session closed")]
    Closed,
}

impl SessionError {
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
