//! Core services.
//!
//! Services orchestrate between ports and domain logic. They don't know about
//! concrete session or transport implementations.

mod gateway;

pub use gateway::{ListedTool, ResolvedTool, ToolGateway, ToolTarget};
