//! Transports carrying JSON-RPC messages to and from a tool server.
//!
//! A [`Connector`] opens a [`Link`]: an outbound queue of serialized
//! messages, an inbound stream of parsed messages, and a guard owning
//! whatever keeps the transport alive (child process, I/O tasks). The
//! session layer never sees processes or sockets.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use toolgate_core::{EnvEntry, ServerConfig, ServerType};

use crate::error::SessionError;
use crate::path;
use crate::protocol::synthesized_error;

/// Capacity of the per-link send and receive queues.
const QUEUE_CAPACITY: usize = 64;

/// Header carrying the streamable HTTP session id.
const SESSION_HEADER: &str = "Mcp-Session-Id";

/// Opens transports to one tool server.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Link, SessionError>;
}

/// Builds a connector for a server configuration.
pub trait ConnectorFactory: Send + Sync {
    fn connector(&self, config: &ServerConfig) -> Result<Arc<dyn Connector>, SessionError>;
}

/// An open transport.
pub struct Link {
    outbound: mpsc::Sender<String>,
    inbound: mpsc::Receiver<Value>,
    guard: LinkGuard,
}

/// Owns the resources behind a link.
#[derive(Default)]
pub struct LinkGuard {
    child: Option<Child>,
    tasks: Vec<JoinHandle<()>>,
}

impl Link {
    /// Newline-delimited JSON over any byte stream pair.
    ///
    /// Lines that are not JSON objects or arrays are skipped.
    pub fn from_io<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (out_tx, out_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (in_tx, in_rx) = mpsc::channel(QUEUE_CAPACITY);

        let writer_task = tokio::spawn(write_lines(writer, out_rx));
        let reader_task = tokio::spawn(read_lines(reader, in_tx));

        Self {
            outbound: out_tx,
            inbound: in_rx,
            guard: LinkGuard {
                child: None,
                tasks: vec![writer_task, reader_task],
            },
        }
    }

    pub fn into_parts(self) -> (mpsc::Sender<String>, mpsc::Receiver<Value>, LinkGuard) {
        (self.outbound, self.inbound, self.guard)
    }
}

impl LinkGuard {
    /// Release transport resources.
    ///
    /// Waits up to `grace` for a child process to exit on its own (its stdin
    /// closes once every outbound sender is dropped), then kills it.
    pub async fn shutdown(mut self, grace: Duration) {
        if let Some(mut child) = self.child.take() {
            match tokio::time::timeout(grace, child.wait()).await {
                Ok(Ok(status)) => tracing::debug!(%status, "Server process exited"),
                Ok(Err(e)) => tracing::warn!(error = %e, "Failed to wait for server process"),
                Err(_) => {
                    tracing::debug!(
                        grace_ms = grace.as_millis(),
                        "Server process did not exit in time, killing"
                    );
                    if let Err(e) = child.kill().await {
                        tracing::warn!(error = %e, "Failed to kill server process");
                    }
                }
            }
        }

        for task in self.tasks {
            task.abort();
        }
    }
}

async fn write_lines<W>(mut writer: W, mut outbound: mpsc::Receiver<String>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = outbound.recv().await {
        let written = async {
            writer.write_all(message.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await
        }
        .await;
        if let Err(e) = written {
            tracing::debug!(error = %e, "Transport write failed");
            return;
        }
    }
    // All senders gone: signal EOF to the peer
    let _ = writer.shutdown().await;
}

async fn read_lines<R>(reader: R, inbound: mpsc::Sender<Value>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                match serde_json::from_str::<Value>(trimmed) {
                    Ok(value) if value.is_object() || value.is_array() => {
                        if !forward(&inbound, value).await {
                            return;
                        }
                    }
                    _ => {
                        // Package runners print banners on stdout
                        tracing::debug!(line = trimmed, "Skipping non-JSON-RPC output");
                    }
                }
            }
            Ok(None) => return,
            Err(e) => {
                tracing::debug!(error = %e, "Transport read failed");
                return;
            }
        }
    }
}

/// Forward a message (or each element of a batch). Returns false once the
/// receiver is gone.
async fn forward(inbound: &mpsc::Sender<Value>, value: Value) -> bool {
    match value {
        Value::Array(items) => {
            for item in items {
                if inbound.send(item).await.is_err() {
                    return false;
                }
            }
            true
        }
        other => inbound.send(other).await.is_ok(),
    }
}

// ---------------------------------------------------------------------------
// stdio
// ---------------------------------------------------------------------------

/// Spawns the server as a child process and speaks over its stdin/stdout.
#[derive(Debug, Clone)]
pub struct StdioConnector {
    server_id: String,
    command: String,
    args: Vec<String>,
    working_dir: Option<String>,
    path_extra: Option<String>,
    env: Vec<EnvEntry>,
}

impl StdioConnector {
    pub fn from_config(config: &ServerConfig) -> Result<Self, SessionError> {
        let command = config
            .config
            .command
            .clone()
            .ok_or_else(|| SessionError::SpawnFailed("Stdio server requires command".to_string()))?;

        Ok(Self {
            server_id: config.id.clone(),
            command,
            args: config.config.args.clone(),
            working_dir: config
                .config
                .working_dir
                .clone()
                .filter(|dir| !dir.is_empty()),
            path_extra: config.config.path_extra.clone(),
            env: config.env.clone(),
        })
    }
}

#[async_trait]
impl Connector for StdioConnector {
    async fn connect(&self) -> Result<Link, SessionError> {
        if let Some(ref cwd) = self.working_dir {
            path::validate_working_dir(cwd).map_err(SessionError::SpawnFailed)?;
        }

        let effective_path = path::build_effective_path(self.path_extra.as_deref());
        let exe = path::resolve_command(&self.command, &effective_path)
            .map_err(SessionError::SpawnFailed)?;

        let mut command = Command::new(&exe);
        command
            .args(&self.args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .env("PATH", &effective_path)
            .kill_on_drop(true);

        if let Some(ref cwd) = self.working_dir {
            command.current_dir(cwd);
        }

        for entry in &self.env {
            command.env(&entry.key, &entry.value);
        }

        let mut child = command.spawn().map_err(|e| {
            let effective_path_str = effective_path.to_string_lossy();
            SessionError::SpawnFailed(format!(
                "Failed to spawn '{}': {e}\nArgs: {:?}\nCwd: {:?}\nEffective PATH: {effective_path_str}",
                exe.display(),
                self.args,
                self.working_dir
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SessionError::SpawnFailed("Failed to get stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SessionError::SpawnFailed("Failed to get stdout".to_string()))?;
        let stderr = child.stderr.take();

        tracing::debug!(
            server_id = %self.server_id,
            exe = %exe.display(),
            pid = ?child.id(),
            "Spawned stdio server"
        );

        let mut link = Link::from_io(stdout, stdin);
        if let Some(stderr) = stderr {
            let server_id = self.server_id.clone();
            link.guard.tasks.push(tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(server_id = %server_id, line = %line, "server stderr");
                }
            }));
        }
        link.guard.child = Some(child);

        Ok(link)
    }
}

// ---------------------------------------------------------------------------
// streamable HTTP
// ---------------------------------------------------------------------------

/// POSTs each outbound message to the server's endpoint.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    server_id: String,
    url: String,
    headers: BTreeMap<String, String>,
    client: reqwest::Client,
}

impl HttpConnector {
    pub fn from_config(config: &ServerConfig, client: reqwest::Client) -> Result<Self, SessionError> {
        let url = config
            .config
            .url
            .clone()
            .ok_or_else(|| SessionError::Http("HTTP server requires url".to_string()))?;

        Ok(Self {
            server_id: config.id.clone(),
            url,
            headers: config.config.headers.clone(),
            client,
        })
    }
}

#[derive(Clone)]
struct HttpContext {
    server_id: String,
    url: String,
    headers: BTreeMap<String, String>,
    client: reqwest::Client,
    session_id: Arc<RwLock<Option<String>>>,
    inbound: mpsc::Sender<Value>,
}

#[async_trait]
impl Connector for HttpConnector {
    async fn connect(&self) -> Result<Link, SessionError> {
        let (out_tx, mut out_rx) = mpsc::channel::<String>(QUEUE_CAPACITY);
        let (in_tx, in_rx) = mpsc::channel(QUEUE_CAPACITY);

        let ctx = HttpContext {
            server_id: self.server_id.clone(),
            url: self.url.clone(),
            headers: self.headers.clone(),
            client: self.client.clone(),
            session_id: Arc::new(RwLock::new(None)),
            inbound: in_tx,
        };

        let dispatcher = tokio::spawn(async move {
            let mut posts = JoinSet::new();
            loop {
                tokio::select! {
                    message = out_rx.recv() => {
                        let Some(message) = message else { break };
                        let request_id = request_id_of(&message);
                        if request_id.is_some() {
                            let ctx = ctx.clone();
                            posts.spawn(async move { ctx.post(message, request_id).await });
                        } else {
                            // Notifications and replies keep their order
                            ctx.post(message, None).await;
                        }
                    }
                    Some(_) = posts.join_next(), if !posts.is_empty() => {}
                }
            }
            ctx.terminate().await;
        });

        Ok(Link {
            outbound: out_tx,
            inbound: in_rx,
            guard: LinkGuard {
                child: None,
                tasks: vec![dispatcher],
            },
        })
    }
}

impl HttpContext {
    async fn post(&self, message: String, request_id: Option<u64>) {
        let mut request = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(reqwest::header::ACCEPT, "application/json, text/event-stream");
        for (key, value) in &self.headers {
            request = request.header(key.as_str(), value.as_str());
        }
        if let Some(id) = self.current_session_id() {
            request = request.header(SESSION_HEADER, id);
        }

        let response = match request.body(message).send().await {
            Ok(response) => response,
            Err(e) => return self.fail(request_id, &format!("HTTP request failed: {e}")).await,
        };

        if let Some(id) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            *self
                .session_id
                .write()
                .unwrap_or_else(PoisonError::into_inner) = Some(id.to_string());
        }

        let status = response.status();
        if !status.is_success() {
            return self
                .fail(request_id, &format!("HTTP request failed with status {status}"))
                .await;
        }

        let is_event_stream = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return self.fail(request_id, &format!("Failed to read response: {e}")).await,
        };

        for message in parse_http_body(&body, is_event_stream) {
            if !forward(&self.inbound, message).await {
                return;
            }
        }
    }

    async fn fail(&self, request_id: Option<u64>, message: &str) {
        tracing::warn!(server_id = %self.server_id, error = %message, "HTTP transport failure");
        if let Some(id) = request_id {
            let _ = self.inbound.send(synthesized_error(id, message)).await;
        }
    }

    fn current_session_id(&self) -> Option<String> {
        self.session_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Best-effort session termination.
    async fn terminate(&self) {
        let Some(id) = self.current_session_id() else {
            return;
        };
        let mut request = self.client.delete(&self.url).header(SESSION_HEADER, id);
        for (key, value) in &self.headers {
            request = request.header(key.as_str(), value.as_str());
        }
        if let Err(e) = request.send().await {
            tracing::debug!(server_id = %self.server_id, error = %e, "Session DELETE failed");
        }
    }
}

/// Id of an outbound request; `None` for notifications and replies.
fn request_id_of(message: &str) -> Option<u64> {
    let value: Value = serde_json::from_str(message).ok()?;
    value.get("method")?;
    value.get("id").and_then(Value::as_u64)
}

/// Parse a streamable HTTP response body into JSON-RPC messages.
fn parse_http_body(body: &str, is_event_stream: bool) -> Vec<Value> {
    if !is_event_stream {
        let trimmed = body.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }
        return serde_json::from_str::<Value>(trimmed)
            .map(|v| vec![v])
            .unwrap_or_else(|e| {
                tracing::debug!(error = %e, "Discarding non-JSON HTTP response body");
                Vec::new()
            });
    }

    let mut messages = Vec::new();
    let mut data = String::new();
    let flush = |data: &mut String, messages: &mut Vec<Value>| {
        if data.is_empty() {
            return;
        }
        match serde_json::from_str::<Value>(data) {
            Ok(value) => messages.push(value),
            Err(e) => tracing::debug!(error = %e, "Discarding non-JSON event data"),
        }
        data.clear();
    };

    for line in body.lines() {
        if let Some(rest) = line.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(rest.strip_prefix(' ').unwrap_or(rest));
        } else if line.trim().is_empty() {
            flush(&mut data, &mut messages);
        }
    }
    flush(&mut data, &mut messages);

    messages
}

// ---------------------------------------------------------------------------
// factory
// ---------------------------------------------------------------------------

/// Builds stdio and HTTP connectors from configuration.
#[derive(Debug, Clone)]
pub struct DefaultConnectors {
    http: reqwest::Client,
}

impl DefaultConnectors {
    pub fn new() -> Result<Self, SessionError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| SessionError::Http(e.to_string()))?;
        Ok(Self { http })
    }
}

impl ConnectorFactory for DefaultConnectors {
    fn connector(&self, config: &ServerConfig) -> Result<Arc<dyn Connector>, SessionError> {
        Ok(match config.server_type {
            ServerType::Stdio => Arc::new(StdioConnector::from_config(config)?),
            ServerType::Http => Arc::new(HttpConnector::from_config(config, self.http.clone())?),
        })
    }
}
