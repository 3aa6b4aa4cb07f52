//! External tool server configuration types.
//!
//! A `ServerConfig` is loaded once at startup and never mutated afterwards;
//! hot changes arrive as a whole new list handed to `reconcile`.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::tool_name;

/// Owner id used for built-in tools that run in-process.
pub const LOCAL_OWNER: &str = "local";

/// Type of tool server connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerType {
    /// Stdio-based server - toolgate spawns and manages the process
    #[default]
    Stdio,
    /// Streamable HTTP server - external process, toolgate POSTs JSON-RPC messages
    Http,
}

impl ServerType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stdio => "stdio",
            Self::Http => "http",
        }
    }
}

impl std::fmt::Display for ServerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Environment variable entry for stdio servers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvEntry {
    /// Environment variable key
    pub key: String,
    /// Environment variable value
    pub value: String,
}

impl EnvEntry {
    /// Create a new environment variable entry.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Transport configuration for a tool server.
///
/// For stdio servers, `command` is required. For HTTP servers, `url` is required.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    // --- Stdio server fields ---
    /// Command to execute (e.g., "npx" or "/usr/local/bin/uvx").
    /// Flags and arguments belong in `args`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Arguments to pass to the executable
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// Working directory for the process (must be absolute if specified)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,

    /// Additional PATH entries to prepend to the child process PATH.
    /// Useful for nvm/asdf shims or custom tool locations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_extra: Option<String>,

    // --- HTTP server fields ---
    /// Endpoint for streamable HTTP (e.g., `http://localhost:3001/mcp`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Extra request headers (e.g., `Authorization`)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

impl TransportConfig {
    /// Create a stdio transport configuration.
    #[must_use]
    pub fn stdio(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: Some(command.into()),
            args,
            ..Self::default()
        }
    }

    /// Create an HTTP transport configuration.
    #[must_use]
    pub fn http(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Validate configuration based on server type.
    pub fn validate(&self, server_type: ServerType) -> Result<(), String> {
        match server_type {
            ServerType::Stdio => {
                let command = self
                    .command
                    .as_ref()
                    .ok_or_else(|| "Stdio server requires command".to_string())?;

                if command.trim().is_empty() {
                    return Err("Stdio server command cannot be empty".to_string());
                }

                if command.contains(char::is_whitespace) {
                    return Err(
                        "Command must be an executable name/path only (e.g., 'npx'). \
                         Put flags and arguments in the 'args' field."
                            .to_string(),
                    );
                }

                if let Some(ref cwd) = self.working_dir {
                    if !cwd.is_empty() && !std::path::Path::new(cwd).is_absolute() {
                        return Err(format!("Stdio server working_dir must be absolute: {cwd}"));
                    }
                }

                Ok(())
            }
            ServerType::Http => {
                let url = self
                    .url
                    .as_ref()
                    .ok_or_else(|| "HTTP server requires url".to_string())?;

                if url.is_empty() {
                    return Err("HTTP server url cannot be empty".to_string());
                }

                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(format!("HTTP server url must use http or https: {url}"));
                }

                Ok(())
            }
        }
    }
}

/// Reconnect behaviour after a session faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestartPolicy {
    /// Reconnect attempts before the session is permanently faulted (0 = never).
    pub max_attempts: u32,
    /// Delay before the first reconnect attempt.
    pub base_delay_ms: u64,
    /// Upper bound for the exponential delay.
    pub max_delay_ms: u64,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
        }
    }
}

impl RestartPolicy {
    /// A policy that never reconnects.
    #[must_use]
    pub const fn never() -> Self {
        Self {
            max_attempts: 0,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    /// Backoff delay before reconnect attempt `attempt` (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let delay = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(exponent))
            .min(self.max_delay_ms);
        Duration::from_millis(delay)
    }

    /// Whether another reconnect attempt is allowed.
    #[must_use]
    pub const fn allows(&self, attempt: u32) -> bool {
        attempt <= self.max_attempts
    }
}

/// An external tool server the gateway connects to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Unique id; used to namespace colliding tool names.
    pub id: String,

    /// Connection type (stdio or HTTP).
    #[serde(default)]
    pub server_type: ServerType,

    /// Transport configuration (command, args, URL, etc.).
    #[serde(default)]
    pub config: TransportConfig,

    /// Environment variables for the server process.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvEntry>,

    /// Reconnect behaviour after faults.
    #[serde(default)]
    pub restart: RestartPolicy,

    /// Disabled servers are kept in config but never started.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Per-server override of the gateway invocation timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invocation_timeout_ms: Option<u64>,
}

const fn default_enabled() -> bool {
    true
}

impl ServerConfig {
    /// Create a stdio-based server.
    #[must_use]
    pub fn stdio(id: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            id: id.into(),
            server_type: ServerType::Stdio,
            config: TransportConfig::stdio(command, args),
            env: Vec::new(),
            restart: RestartPolicy::default(),
            enabled: true,
            invocation_timeout_ms: None,
        }
    }

    /// Create an HTTP-based server.
    #[must_use]
    pub fn http(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            server_type: ServerType::Http,
            config: TransportConfig::http(url),
            env: Vec::new(),
            restart: RestartPolicy::default(),
            enabled: true,
            invocation_timeout_ms: None,
        }
    }

    /// Add an environment variable.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push(EnvEntry::new(key, value));
        self
    }

    /// Set the working directory.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<String>) -> Self {
        self.config.working_dir = Some(dir.into());
        self
    }

    /// Set the restart policy.
    #[must_use]
    pub const fn with_restart(mut self, restart: RestartPolicy) -> Self {
        self.restart = restart;
        self
    }

    /// Set enabled status.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set a per-server invocation timeout.
    #[must_use]
    pub const fn with_invocation_timeout(mut self, timeout: Duration) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let millis = timeout.as_millis() as u64;
        self.invocation_timeout_ms = Some(millis);
        self
    }

    /// Per-server invocation timeout, if overridden.
    #[must_use]
    pub fn invocation_timeout(&self) -> Option<Duration> {
        self.invocation_timeout_ms.map(Duration::from_millis)
    }

    /// Validate the id and transport configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("Server id cannot be empty".to_string());
        }
        if self.id == LOCAL_OWNER {
            return Err(format!("Server id '{LOCAL_OWNER}' is reserved for built-in tools"));
        }
        if self.id.contains(['.', '_', '/', ':']) || self.id.contains(char::is_whitespace) {
            return Err(format!(
                "Server id must not contain separators or whitespace: {}",
                self.id
            ));
        }
        if tool_name::is_alias_namespace(&self.id) {
            return Err(format!(
                "Server id '{}' would shadow built-in tool aliases ({}.*)",
                self.id, self.id
            ));
        }
        self.config.validate(self.server_type)
    }
}
