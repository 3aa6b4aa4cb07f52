//! Event emitter that forwards gateway events to `tracing`.

use toolgate_core::{AppEvent, AppEventEmitter};

/// Logs every event as a structured line on stderr.
#[derive(Debug, Clone, Default)]
pub struct TracingEmitter;

impl AppEventEmitter for TracingEmitter {
    fn emit(&self, event: AppEvent) {
        match &event {
            AppEvent::ServerError { error } => {
                tracing::warn!(
                    event = event.event_type(),
                    server_id = %error.server_id,
                    error = %error.message,
                    "Server error"
                );
            }
            AppEvent::ToolInvoked {
                tool,
                owner,
                success,
                duration_ms,
            } => {
                tracing::info!(
                    event = event.event_type(),
                    tool = %tool,
                    owner = %owner,
                    success,
                    duration_ms,
                    "Tool invoked"
                );
            }
            AppEvent::ConfirmationRequired { tool } => {
                tracing::info!(event = event.event_type(), tool = %tool, "Confirmation required");
            }
            AppEvent::SessionStateChanged { server_id, state } => {
                tracing::debug!(
                    event = event.event_type(),
                    server_id = %server_id,
                    state = %state,
                    "Session state changed"
                );
            }
            AppEvent::CatalogUpdated {
                tool_count,
                collisions,
            } => {
                tracing::debug!(
                    event = event.event_type(),
                    tool_count,
                    collisions,
                    "Catalog updated"
                );
            }
        }
    }

    fn clone_box(&self) -> Box<dyn AppEventEmitter> {
        Box::new(self.clone())
    }
}
