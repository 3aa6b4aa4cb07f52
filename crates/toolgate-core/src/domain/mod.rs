//! Domain types for the tool gateway.
//!
//! These are pure data types and functions with no process or network
//! dependencies.

pub mod catalog;
pub mod policy;
pub mod schema;
pub mod server;
pub mod session;
pub mod tool;
pub mod tool_name;

pub use catalog::{CatalogCollision, CatalogEntry, ToolCatalog};
pub use policy::{ConfirmationPolicy, ConfirmationRule, DEFAULT_RULES, MatchKind, RiskClass};
pub use schema::{InputSchema, SchemaError};
pub use server::{EnvEntry, LOCAL_OWNER, RestartPolicy, ServerConfig, ServerType, TransportConfig};
pub use session::{ServerStatus, SessionState};
pub use tool::{InvocationRequest, InvocationResult, ToolInfo};
