//! CLI bootstrap - the composition root.
//!
//! This module is the ONLY place where the gateway is wired together for the
//! CLI adapter:
//! - Built-in tool registry
//! - Confirmation policy (built-in rules plus configured overrides)
//! - Session manager with the stdio/HTTP connector factory
//! - Tool gateway over both
//!
//! Command handlers receive the composed `CliContext`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use toolgate_core::{AppEventEmitter, ConfirmationPolicy, RemoteToolPort, ToolGateway};
use toolgate_mcp::{DefaultConnectors, InitReport, SessionManager};

use crate::builtins;
use crate::config::{ConfigLoader, FileConfig};
use crate::emitter::TracingEmitter;

/// Fully composed application context for CLI commands.
pub struct CliContext {
    /// The tool invocation gateway.
    pub gateway: ToolGateway,
    /// Session manager owning every tool server connection.
    pub manager: Arc<SessionManager>,
    /// Outcome of the initial connect.
    pub startup: InitReport,
    /// Configuration the context was built from.
    pub config: FileConfig,
    /// Explicit config path, re-read on reload.
    pub config_path: Option<PathBuf>,
}

impl CliContext {
    pub const fn gateway(&self) -> &ToolGateway {
        &self.gateway
    }

    pub const fn manager(&self) -> &Arc<SessionManager> {
        &self.manager
    }

    /// Re-read configuration and reconcile servers.
    ///
    /// Gateway settings and policy changes take effect on restart.
    pub async fn reload(&self) -> Result<toolgate_mcp::ReconcileReport> {
        let config = ConfigLoader::load(self.config_path.as_deref())?;
        Ok(self.manager.reconcile(config.servers).await)
    }

    /// Close every server connection.
    pub async fn shutdown(&self) {
        self.manager.shutdown().await;
    }
}

/// Confirmation policy for a configuration.
pub fn policy(config: &FileConfig) -> ConfirmationPolicy {
    ConfirmationPolicy::default().with_rules(config.policy.rules.clone())
}

/// Bootstrap the CLI application.
///
/// Connects to every configured server. Servers that fail are reported in
/// `startup` and retried in the background; they never fail bootstrap.
pub async fn bootstrap(config: FileConfig, config_path: Option<PathBuf>) -> Result<CliContext> {
    let emitter: Arc<dyn AppEventEmitter> = Arc::new(TracingEmitter);

    // 1. Built-in tools
    let local = builtins::registry()?;

    // 2. Session manager; local names are reserved so remote duplicates get namespaced
    let manager = Arc::new(
        SessionManager::builder(config.gateway.clone(), Arc::new(DefaultConnectors::new()?))
            .emitter(Arc::clone(&emitter))
            .reserved_names(local.names())
            .build(),
    );
    let startup = manager.initialize(config.servers.clone()).await;

    // 3. Gateway
    let remote: Arc<dyn RemoteToolPort> = manager.clone();
    let gateway = ToolGateway::new(local, remote, policy(&config))
        .with_settings(config.gateway.clone())
        .with_emitter(emitter);

    for collision in gateway.collisions() {
        tracing::warn!(
            name = %collision.name,
            published_as = ?collision.qualified_names,
            "Tool name offered by several owners"
        );
    }

    Ok(CliContext {
        gateway,
        manager,
        startup,
        config,
        config_path,
    })
}
