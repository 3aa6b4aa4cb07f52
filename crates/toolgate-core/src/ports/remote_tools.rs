//! Port for tools hosted by external servers.
//!
//! The gateway only sees the aggregated catalog and an invoke entry point;
//! sessions, transports, and reconnects stay behind this trait.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::error::GatewayError;
use crate::domain::ToolCatalog;

/// Access to remotely hosted tools.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteToolPort: Send + Sync {
    /// Current aggregated catalog snapshot.
    fn catalog(&self) -> Arc<ToolCatalog>;

    /// Invoke `remote_name` on the server that owns it.
    ///
    /// Callers pass the owner taken from the catalog entry they classified;
    /// implementations must not re-resolve the name against a newer catalog.
    async fn invoke(
        &self,
        server_id: &str,
        remote_name: &str,
        arguments: Value,
    ) -> Result<Value, GatewayError>;
}

/// A remote port with no servers, for tests and local-only setups.
#[derive(Debug, Clone, Default)]
pub struct NoRemoteTools {
    catalog: Arc<ToolCatalog>,
}

impl NoRemoteTools {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RemoteToolPort for NoRemoteTools {
    fn catalog(&self) -> Arc<ToolCatalog> {
        Arc::clone(&self.catalog)
    }

    async fn invoke(
        &self,
        server_id: &str,
        remote_name: &str,
        _arguments: Value,
    ) -> Result<Value, GatewayError> {
        Err(GatewayError::ToolNotFound(format!("{server_id}.{remote_name}")))
    }
}
