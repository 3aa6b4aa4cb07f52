//! Tool invocation events.

use super::AppEvent;

impl AppEvent {
    /// Create a confirmation required event.
    pub fn confirmation_required(tool: impl Into<String>) -> Self {
        Self::ConfirmationRequired { tool: tool.into() }
    }

    /// Create a tool invoked event.
    pub fn tool_invoked(
        tool: impl Into<String>,
        owner: impl Into<String>,
        success: bool,
        duration_ms: u64,
    ) -> Self {
        Self::ToolInvoked {
            tool: tool.into(),
            owner: owner.into(),
            success,
            duration_ms,
        }
    }
}
