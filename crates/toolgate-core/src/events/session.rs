//! Session and catalog lifecycle events.

use super::AppEvent;
use crate::domain::SessionState;
use crate::ports::ServerErrorInfo;

impl AppEvent {
    /// Create a session state change event.
    pub fn session_state_changed(server_id: impl Into<String>, state: SessionState) -> Self {
        Self::SessionStateChanged {
            server_id: server_id.into(),
            state,
        }
    }

    /// Create a catalog updated event.
    pub const fn catalog_updated(tool_count: usize, collisions: usize) -> Self {
        Self::CatalogUpdated {
            tool_count,
            collisions,
        }
    }

    /// Create a server error event.
    pub const fn server_error(error: ServerErrorInfo) -> Self {
        Self::ServerError { error }
    }
}
