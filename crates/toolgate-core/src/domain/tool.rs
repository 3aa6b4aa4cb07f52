//! Tool descriptors and invocation envelopes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::schema::InputSchema;
use super::server::LOCAL_OWNER;

/// A callable tool as exposed to the agent loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInfo {
    /// Name the tool is exposed under. For discovered tools this is the
    /// provider's raw name until the catalog assigns a qualified name.
    pub name: String,

    /// Human-readable description.
    #[serde(default)]
    pub description: String,

    /// JSON Schema for input parameters.
    #[serde(default)]
    pub input_schema: InputSchema,

    /// Id of the owning server, or `"local"` for built-ins.
    #[serde(rename = "ownerServerId")]
    pub owner: String,
}

impl ToolInfo {
    /// Create a tool with an empty description and a permissive schema.
    pub fn new(name: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            input_schema: InputSchema::permissive(),
            owner: owner.into(),
        }
    }

    /// Create a built-in tool descriptor.
    pub fn local(name: impl Into<String>) -> Self {
        Self::new(name, LOCAL_OWNER)
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    /// Set the input schema.
    #[must_use]
    pub fn with_input_schema(mut self, schema: InputSchema) -> Self {
        self.input_schema = schema;
        self
    }

    pub fn is_local(&self) -> bool {
        self.owner == LOCAL_OWNER
    }
}

/// A request to run a tool, as received from the agent loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationRequest {
    /// Tool name exactly as the caller spelled it.
    #[serde(rename = "tool")]
    pub raw_tool_name: String,

    #[serde(default)]
    pub arguments: Value,

    /// Whether the user explicitly approved this call.
    #[serde(default)]
    pub confirmed: bool,
}

impl InvocationRequest {
    pub fn new(raw_tool_name: impl Into<String>, arguments: Value) -> Self {
        Self {
            raw_tool_name: raw_tool_name.into(),
            arguments,
            confirmed: false,
        }
    }

    #[must_use]
    pub const fn confirmed(mut self, confirmed: bool) -> Self {
        self.confirmed = confirmed;
        self
    }
}

/// Uniform result of a tool invocation.
///
/// `output` is present iff `success` is true; `error` iff it is false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationResult {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InvocationResult {
    /// Create a success result.
    #[must_use]
    pub const fn success(output: Value) -> Self {
        Self {
            success: true,
            output: Some(output),
            error: None,
        }
    }

    /// Create an error result.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(message.into()),
        }
    }
}

impl<E: std::fmt::Display> From<Result<Value, E>> for InvocationResult {
    fn from(result: Result<Value, E>) -> Self {
        match result {
            Ok(output) => Self::success(output),
            Err(e) => Self::error(e.to_string()),
        }
    }
}
