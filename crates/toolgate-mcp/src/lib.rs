//! MCP protocol sessions and the session manager.
//!
//! This crate owns every process, socket, and JSON-RPC detail. The gateway
//! in `toolgate-core` sees it only through [`RemoteToolPort`], implemented
//! by [`SessionManager`].
//!
//! [`RemoteToolPort`]: toolgate_core::RemoteToolPort

#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

pub mod error;
pub mod manager;
pub(crate) mod path;
pub mod protocol;
pub mod session;
pub mod transport;

pub use error::SessionError;
pub use manager::{InitReport, ReconcileReport, SessionManager, SessionManagerBuilder};
pub use session::ProtocolSession;
pub use transport::{
    Connector, ConnectorFactory, DefaultConnectors, HttpConnector, Link, LinkGuard,
    StdioConnector,
};

// Re-export domain types from core for convenience
pub use toolgate_core::{ServerConfig, ServerStatus, SessionState, ToolCatalog};
