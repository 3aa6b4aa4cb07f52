//! MCP wire types (JSON-RPC 2.0).
//!
//! Reference: <https://spec.modelcontextprotocol.io/>

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Protocol revision sent in `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC "method not found".
pub const METHOD_NOT_FOUND: i64 = -32601;

/// Implementation-defined server error, used for synthesized transport failures.
pub const TRANSPORT_FAILURE: i64 = -32000;

pub mod method {
    pub const INITIALIZE: &str = "initialize";
    pub const INITIALIZED: &str = "notifications/initialized";
    pub const TOOLS_LIST: &str = "tools/list";
    pub const TOOLS_CALL: &str = "tools/call";
    pub const TOOLS_LIST_CHANGED: &str = "notifications/tools/list_changed";
    pub const PING: &str = "ping";
}

/// JSON-RPC 2.0 request.
#[derive(Debug, Serialize)]
pub struct JsonRpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl<'a> JsonRpcRequest<'a> {
    pub const fn new(id: u64, method: &'a str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method,
            params,
        }
    }
}

/// JSON-RPC 2.0 notification (no id, no response).
#[derive(Debug, Serialize)]
pub struct JsonRpcNotification<'a> {
    pub jsonrpc: &'static str,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl<'a> JsonRpcNotification<'a> {
    pub const fn new(method: &'a str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method,
            params,
        }
    }
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// What an inbound message is, by shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    /// Response to one of our requests.
    Response { id: u64 },
    /// Request from the peer that expects an answer.
    IncomingRequest { id: Value, method: String },
    /// Notification from the peer.
    Notification { method: String },
    /// Anything else (bad ids, missing fields).
    Invalid,
}

/// Classify an inbound JSON-RPC message.
pub fn classify_message(message: &Value) -> MessageKind {
    let method = message.get("method").and_then(Value::as_str);
    let id = message.get("id").filter(|id| !id.is_null());

    match (method, id) {
        (Some(method), Some(id)) => MessageKind::IncomingRequest {
            id: id.clone(),
            method: method.to_string(),
        },
        (Some(method), None) => MessageKind::Notification {
            method: method.to_string(),
        },
        (None, Some(id)) if message.get("result").is_some() || message.get("error").is_some() => {
            id.as_u64()
                .map_or(MessageKind::Invalid, |id| MessageKind::Response { id })
        }
        _ => MessageKind::Invalid,
    }
}

/// Reply to a peer request we do not implement.
pub fn method_not_found(id: &Value, method: &str) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "error": { "code": METHOD_NOT_FOUND, "message": format!("Method not found: {method}") }
    })
}

/// Empty success reply (used for `ping`).
pub fn empty_result(id: &Value) -> Value {
    json!({ "jsonrpc": JSONRPC_VERSION, "id": id, "result": {} })
}

/// Error response standing in for a reply the transport could not deliver.
pub fn synthesized_error(id: u64, message: &str) -> Value {
    json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "error": { "code": TRANSPORT_FAILURE, "message": message }
    })
}

/// Parameters for `initialize`.
pub fn initialize_params(client_name: &str, client_version: &str) -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "clientInfo": {
            "name": client_name,
            "version": client_version
        },
        "capabilities": {}
    })
}

/// MCP initialize result.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    #[serde(default)]
    pub protocol_version: Option<String>,
    #[serde(default)]
    pub server_info: Option<ServerInfo>,
    #[serde(default)]
    pub capabilities: ServerCapabilities,
}

/// Server information from initialize.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
}

/// Server capabilities.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ServerCapabilities {
    #[serde(default)]
    pub tools: Option<ToolsCapability>,
}

/// Tools capability.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ToolsCapability {
    #[serde(default)]
    pub list_changed: Option<bool>,
}

/// One page of `tools/list`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListToolsPage {
    pub tools: Vec<Value>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// Result of `tools/call`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    #[serde(default)]
    pub content: Option<Value>,
    #[serde(default)]
    pub structured_content: Option<Value>,
    #[serde(default)]
    pub is_error: bool,
}

impl CallToolResult {
    /// Provider output: `structuredContent` when present, else `content`.
    pub fn into_output(self) -> Value {
        self.structured_content
            .or(self.content)
            .unwrap_or_else(|| json!([]))
    }

    /// Text of all text content items, for error reporting.
    pub fn error_text(&self) -> String {
        let text: Vec<&str> = self
            .content
            .as_ref()
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.get("text").and_then(Value::as_str))
                    .collect()
            })
            .unwrap_or_default();

        if text.is_empty() {
            "Unknown error".to_string()
        } else {
            text.join("\n")
        }
    }
}
