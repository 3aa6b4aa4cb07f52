//! Canonical event union for gateway lifecycle events.
//!
//! # Structure
//!
//! - `session` - Session state changes, catalog updates, server errors
//! - `invocation` - Confirmation gating and tool invocation outcomes
//!
//! # Wire Format
//!
//! Events are serialized with a `type` tag:
//!
//! ```json
//! { "type": "session_state_changed", "serverId": "files", "state": { "state": "ready" } }
//! ```

mod invocation;
mod session;

use serde::{Deserialize, Serialize};

use crate::domain::SessionState;
use crate::ports::ServerErrorInfo;

/// Canonical event types for all adapters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppEvent {
    // ========== Session Events ==========
    /// A session moved to a new lifecycle state.
    SessionStateChanged {
        #[serde(rename = "serverId")]
        server_id: String,
        state: SessionState,
    },

    /// The aggregated catalog snapshot was replaced.
    CatalogUpdated {
        #[serde(rename = "toolCount")]
        tool_count: usize,
        collisions: usize,
    },

    /// A server failed to connect, negotiate, or discover tools.
    ServerError { error: ServerErrorInfo },

    // ========== Invocation Events ==========
    /// A call was blocked pending user confirmation.
    ConfirmationRequired { tool: String },

    /// A tool call finished.
    ToolInvoked {
        tool: String,
        owner: String,
        success: bool,
        #[serde(rename = "durationMs")]
        duration_ms: u64,
    },
}

impl AppEvent {
    /// Short, stable name for log lines.
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::SessionStateChanged { .. } => "session_state_changed",
            Self::CatalogUpdated { .. } => "catalog_updated",
            Self::ServerError { .. } => "server_error",
            Self::ConfirmationRequired { .. } => "confirmation_required",
            Self::ToolInvoked { .. } => "tool_invoked",
        }
    }
}
