//! In-process fake MCP server for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::sync::mpsc;
use toolgate_mcp::{Connector, ConnectorFactory, Link, ServerConfig, SessionError};

/// How the fake server behaves.
///
/// Tool calls are dispatched on the tool name:
/// - `echo`: replies with the arguments as `structuredContent`
/// - `hang`: never replies
/// - `slow`: replies after `slow_delay`
/// - `fail`: replies with `isError: true` and text "boom"
/// - `mutate`: adds a tool named `added` and announces `list_changed`
/// - `crash`: drops the connection
#[derive(Clone)]
pub struct Script {
    pub tools: Vec<Value>,
    pub page_size: Option<usize>,
    pub advertise_tools: bool,
    pub answer_initialize: bool,
    pub slow_delay: Duration,
    /// Every request id the server has seen.
    pub seen_ids: Arc<Mutex<Vec<u64>>>,
}

impl Script {
    pub fn with_tools(names: &[&str]) -> Self {
        Self {
            tools: names.iter().map(|name| tool(name)).collect(),
            page_size: None,
            advertise_tools: true,
            answer_initialize: true,
            slow_delay: Duration::from_millis(150),
            seen_ids: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn paged(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn silent(mut self) -> Self {
        self.answer_initialize = false;
        self
    }

    pub fn without_tools_capability(mut self) -> Self {
        self.advertise_tools = false;
        self
    }

    pub fn seen_ids(&self) -> Vec<u64> {
        self.seen_ids.lock().unwrap().clone()
    }
}

pub fn tool(name: &str) -> Value {
    json!({
        "name": name,
        "description": format!("{name} tool"),
        "inputSchema": { "type": "object" }
    })
}

/// Connector that starts a fresh fake server on every connect.
pub struct FakeConnector {
    pub script: Script,
    pub connects: Arc<AtomicUsize>,
}

impl FakeConnector {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            connects: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self) -> Result<Link, SessionError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let (client, server) = tokio::io::duplex(64 * 1024);
        tokio::spawn(serve(server, self.script.clone()));
        let (read_half, write_half) = tokio::io::split(client);
        Ok(Link::from_io(read_half, write_half))
    }
}

/// Connector whose transport can never be opened.
pub struct RefusingConnector;

#[async_trait]
impl Connector for RefusingConnector {
    async fn connect(&self) -> Result<Link, SessionError> {
        Err(SessionError::SpawnFailed("connection refused".to_string()))
    }
}

/// Factory mapping server ids to scripts; unknown ids refuse to connect.
#[derive(Default)]
pub struct FakeFleet {
    scripts: Mutex<HashMap<String, Script>>,
}

impl FakeFleet {
    pub fn with(self, server_id: &str, script: Script) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(server_id.to_string(), script);
        self
    }
}

impl ConnectorFactory for FakeFleet {
    fn connector(&self, config: &ServerConfig) -> Result<Arc<dyn Connector>, SessionError> {
        let script = self.scripts.lock().unwrap().get(&config.id).cloned();
        Ok(match script {
            Some(script) => Arc::new(FakeConnector::new(script)),
            None => Arc::new(RefusingConnector),
        })
    }
}

/// A stdio-style config; the fake fleet ignores the command.
pub fn server(id: &str) -> ServerConfig {
    ServerConfig::stdio(id, "fake-mcp-server", vec![])
}

/// Poll `check` until it holds, failing the test after five seconds.
pub async fn wait_until<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn serve(stream: DuplexStream, mut script: Script) {
    let (read_half, mut write_half) = tokio::io::split(stream);
    let (tx, mut rx) = mpsc::unbounded_channel::<Value>();

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let line = format!("{message}\n");
            if write_half.write_all(line.as_bytes()).await.is_err() {
                return;
            }
        }
    });

    // Servers launched through package runners print banners first
    let _ = tx.send(json!("not a protocol message"));

    let mut lines = BufReader::new(read_half).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let Ok(message) = serde_json::from_str::<Value>(&line) else {
            continue;
        };
        let Some(method) = message.get("method").and_then(Value::as_str) else {
            continue;
        };
        let id = message.get("id").cloned().unwrap_or(Value::Null);
        if let Some(id) = id.as_u64() {
            script.seen_ids.lock().unwrap().push(id);
        }

        match method {
            "initialize" => {
                if !script.answer_initialize {
                    continue;
                }
                let capabilities = if script.advertise_tools {
                    json!({ "tools": { "listChanged": true } })
                } else {
                    json!({})
                };
                let _ = tx.send(json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "result": {
                        "protocolVersion": "2024-11-05",
                        "serverInfo": { "name": "fake", "version": "1.0.0" },
                        "capabilities": capabilities
                    }
                }));
            }
            "tools/list" => {
                let start = message
                    .pointer("/params/cursor")
                    .and_then(Value::as_str)
                    .and_then(|c| c.parse::<usize>().ok())
                    .unwrap_or(0);
                let size = script.page_size.unwrap_or(script.tools.len().max(1));
                let end = (start + size).min(script.tools.len());
                let mut result = json!({ "tools": script.tools[start..end].to_vec() });
                if end < script.tools.len() {
                    result["nextCursor"] = json!(end.to_string());
                }
                let _ = tx.send(json!({ "jsonrpc": "2.0", "id": id, "result": result }));
            }
            "tools/call" => {
                let name = message
                    .pointer("/params/name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let arguments = message
                    .pointer("/params/arguments")
                    .cloned()
                    .unwrap_or_else(|| json!({}));
                match name.as_str() {
                    "hang" => {}
                    "crash" => break,
                    "slow" => {
                        let tx = tx.clone();
                        let delay = script.slow_delay;
                        tokio::spawn(async move {
                            tokio::time::sleep(delay).await;
                            let _ = tx.send(call_result(&id, json!({ "slow": true }), false));
                        });
                    }
                    "fail" => {
                        let _ = tx.send(call_result(&id, Value::Null, true));
                    }
                    "mutate" => {
                        script.tools.push(tool("added"));
                        let _ = tx.send(call_result(&id, json!({ "mutated": true }), false));
                        let _ = tx.send(json!({
                            "jsonrpc": "2.0",
                            "method": "notifications/tools/list_changed"
                        }));
                    }
                    _ => {
                        let _ = tx.send(call_result(&id, arguments, false));
                    }
                }
            }
            "notifications/initialized" => {
                // Exercise the client's handling of server-initiated requests
                let _ = tx.send(json!({ "jsonrpc": "2.0", "id": "srv-1", "method": "ping" }));
            }
            _ => {}
        }
    }

    writer.abort();
}

fn call_result(id: &Value, structured: Value, is_error: bool) -> Value {
    if is_error {
        return json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": { "isError": true, "content": [{ "type": "text", "text": "boom" }] }
        });
    }
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": {
            "content": [{ "type": "text", "text": structured.to_string() }],
            "structuredContent": structured
        }
    })
}
