//! Port definitions (trait abstractions) for external systems.
//!
//! Ports define the interfaces the gateway expects from infrastructure. They
//! use only domain types.
//!
//! # Design Rules
//!
//! - No process, socket, or HTTP types in any signature
//! - Adapter errors are converted to [`GatewayError`] before crossing a port

pub mod error;
pub mod event_emitter;
pub mod local_tools;
pub mod remote_tools;

pub use error::{CONFIRMATION_REQUIRED_MESSAGE, ErrorCategory, GatewayError, ServerErrorInfo};
pub use event_emitter::{AppEventEmitter, NoopEmitter};
pub use local_tools::{LocalToolHandler, LocalToolRegistry};
pub use remote_tools::{NoRemoteTools, RemoteToolPort};

#[cfg(test)]
pub use remote_tools::MockRemoteToolPort;
