//! Core domain, ports, and the tool invocation gateway.
//!
//! This crate has no process or network code. Remote tools are reached
//! through [`RemoteToolPort`], implemented by the session manager in
//! `toolgate-mcp`.

#![deny(unused_crate_dependencies)]

pub mod domain;
pub mod events;
pub mod ports;
pub mod services;
pub mod settings;

// Re-export commonly used types for convenience
pub use domain::{
    CatalogCollision, CatalogEntry, ConfirmationPolicy, ConfirmationRule, DEFAULT_RULES, EnvEntry,
    InputSchema, InvocationRequest, InvocationResult, LOCAL_OWNER, MatchKind, RestartPolicy,
    RiskClass, SchemaError, ServerConfig, ServerStatus, ServerType, SessionState, ToolCatalog,
    ToolInfo, TransportConfig, tool_name,
};
pub use events::AppEvent;
pub use ports::{
    AppEventEmitter, CONFIRMATION_REQUIRED_MESSAGE, ErrorCategory, GatewayError,
    LocalToolHandler, LocalToolRegistry, NoRemoteTools, NoopEmitter, RemoteToolPort,
    ServerErrorInfo,
};
pub use services::{ListedTool, ResolvedTool, ToolGateway, ToolTarget};
pub use settings::{GatewaySettings, SettingsError};
