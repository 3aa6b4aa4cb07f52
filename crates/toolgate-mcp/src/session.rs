//! One managed connection to an external tool server.
//!
//! A [`ProtocolSession`] owns the transport, the handshake, and the map of
//! pending requests. Requests are correlated by locally generated ids, so any
//! number of calls can be outstanding at once and responses may arrive in any
//! order. A background reader task routes responses to their waiters.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::{Notify, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use toolgate_core::{
    AppEvent, AppEventEmitter, GatewaySettings, InputSchema, NoopEmitter, SessionState, ToolInfo,
};

use crate::error::SessionError;
use crate::protocol::{
    CallToolResult, InitializeResult, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    ListToolsPage, MessageKind, classify_message, empty_result, initialize_params, method,
    method_not_found,
};
use crate::transport::{Connector, LinkGuard};

/// Client name announced during the handshake.
pub const CLIENT_NAME: &str = "toolgate";

type Waiter = oneshot::Sender<Result<Value, SessionError>>;

/// Protocol session for one server.
pub struct ProtocolSession {
    shared: Arc<Shared>,
    runtime: tokio::sync::Mutex<Option<Runtime>>,
}

/// Transport resources for the current connection.
struct Runtime {
    reader: JoinHandle<()>,
    guard: LinkGuard,
}

struct Shared {
    server_id: String,
    settings: GatewaySettings,
    emitter: Arc<dyn AppEventEmitter>,
    state: watch::Sender<SessionState>,
    pending: Mutex<HashMap<u64, Waiter>>,
    /// Never reset, so ids stay unique across reconnects.
    next_id: AtomicU64,
    outbound: RwLock<Option<mpsc::Sender<String>>>,
    /// Bumped whenever the transport is replaced or closed.
    generation: AtomicU64,
    tools_changed: Notify,
    tools_capable: AtomicBool,
    in_flight: AtomicUsize,
    consecutive_timeouts: AtomicU32,
}

impl ProtocolSession {
    pub fn new(server_id: impl Into<String>, settings: GatewaySettings) -> Self {
        Self::with_emitter(server_id, settings, Arc::new(NoopEmitter::new()))
    }

    pub fn with_emitter(
        server_id: impl Into<String>,
        settings: GatewaySettings,
        emitter: Arc<dyn AppEventEmitter>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        Self {
            shared: Arc::new(Shared {
                server_id: server_id.into(),
                settings,
                emitter,
                state,
                pending: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                outbound: RwLock::new(None),
                generation: AtomicU64::new(0),
                tools_changed: Notify::new(),
                tools_capable: AtomicBool::new(false),
                in_flight: AtomicUsize::new(0),
                consecutive_timeouts: AtomicU32::new(0),
            }),
            runtime: tokio::sync::Mutex::new(None),
        }
    }

    pub fn server_id(&self) -> &str {
        &self.shared.server_id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.shared.state.borrow().clone()
    }

    /// Watch lifecycle transitions.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    /// Number of requests awaiting a response.
    pub fn pending_requests(&self) -> usize {
        self.shared.pending().len()
    }

    /// Resolves when the server announces that its tool list changed.
    pub async fn tools_changed(&self) {
        self.shared.tools_changed.notified().await;
    }

    /// Open the transport and negotiate capabilities.
    ///
    /// Any previous connection is torn down first. On failure the session is
    /// left `Faulted`.
    pub async fn connect(&self, connector: &dyn Connector) -> Result<(), SessionError> {
        let entered = self.shared.transition(|state| match state {
            SessionState::Closing | SessionState::Closed => None,
            _ => Some(SessionState::Connecting),
        });
        if !entered {
            return Err(SessionError::Closed);
        }

        self.teardown().await;

        let link = match connector.connect().await {
            Ok(link) => link,
            Err(e) => {
                self.shared.fault(e.to_string());
                return Err(e);
            }
        };

        let (outbound, inbound, guard) = link.into_parts();
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self
            .shared
            .outbound
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(outbound);
        let reader = tokio::spawn(read_loop(Arc::clone(&self.shared), inbound, generation));
        *self.runtime.lock().await = Some(Runtime { reader, guard });

        self.shared.transition(|state| {
            matches!(state, SessionState::Connecting).then_some(SessionState::Negotiating)
        });

        if let Err(e) = self.handshake().await {
            self.shared.fault(e.to_string());
            return Err(e);
        }

        self.shared.consecutive_timeouts.store(0, Ordering::SeqCst);
        let ready = self.shared.transition(|state| {
            matches!(state, SessionState::Negotiating).then_some(SessionState::Ready)
        });
        if ready {
            Ok(())
        } else {
            Err(SessionError::NotConnected(self.state().to_string()))
        }
    }

    async fn handshake(&self) -> Result<(), SessionError> {
        let params = initialize_params(CLIENT_NAME, env!("CARGO_PKG_VERSION"));
        let result = self
            .shared
            .request(
                method::INITIALIZE,
                Some(params),
                self.shared.settings.handshake_timeout(),
            )
            .await?;

        let init: InitializeResult = serde_json::from_value(result)
            .map_err(|e| SessionError::ProtocolError(format!("Invalid initialize result: {e}")))?;

        self.shared
            .tools_capable
            .store(init.capabilities.tools.is_some(), Ordering::SeqCst);

        tracing::info!(
            server_id = %self.shared.server_id,
            server_name = init.server_info.as_ref().map_or("unknown", |info| info.name.as_str()),
            protocol_version = init.protocol_version.as_deref().unwrap_or("unknown"),
            "Handshake complete"
        );

        self.shared
            .notify(method::INITIALIZED, None)
            .await
    }

    /// Fetch the server's full tool catalog, following pagination.
    pub async fn list_tools(&self) -> Result<Vec<ToolInfo>, SessionError> {
        let state = self.state();
        if !state.is_available() {
            return Err(SessionError::NotConnected(state.to_string()));
        }

        if !self.shared.tools_capable.load(Ordering::SeqCst) {
            tracing::debug!(
                server_id = %self.shared.server_id,
                "Server does not advertise tools"
            );
            return Ok(Vec::new());
        }

        let timeout = self.shared.settings.discovery_timeout();
        tokio::time::timeout(timeout, self.collect_tools(timeout))
            .await
            .map_err(|_| SessionError::Timeout {
                method: method::TOOLS_LIST.to_string(),
                timeout,
            })?
    }

    async fn collect_tools(&self, timeout: Duration) -> Result<Vec<ToolInfo>, SessionError> {
        let mut tools = Vec::new();
        let mut names = HashSet::new();
        let mut cursors = HashSet::new();
        let mut cursor: Option<String> = None;

        loop {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let result = self
                .shared
                .request(method::TOOLS_LIST, params, timeout)
                .await?;
            let page: ListToolsPage = serde_json::from_value(result)
                .map_err(|e| SessionError::Discovery(format!("Invalid tools/list result: {e}")))?;

            for entry in page.tools {
                let tool = parse_tool(entry, &self.shared.server_id)?;
                if !names.insert(tool.name.clone()) {
                    return Err(SessionError::Discovery(format!(
                        "Duplicate tool name '{}'",
                        tool.name
                    )));
                }
                tools.push(tool);
            }

            match page.next_cursor.filter(|c| !c.is_empty()) {
                Some(next) => {
                    if !cursors.insert(next.clone()) {
                        return Err(SessionError::Discovery(format!(
                            "Pagination cursor '{next}' repeated"
                        )));
                    }
                    cursor = Some(next);
                }
                None => break,
            }
        }

        tracing::debug!(
            server_id = %self.shared.server_id,
            tool_count = tools.len(),
            "Listed tools"
        );
        Ok(tools)
    }

    /// Call a remote tool.
    ///
    /// Output is the server's `structuredContent` when present, otherwise its
    /// `content` array.
    pub async fn invoke(
        &self,
        remote_name: &str,
        arguments: Value,
        timeout: Duration,
    ) -> Result<Value, SessionError> {
        let state = self.state();
        if !state.is_available() {
            return Err(SessionError::NotConnected(state.to_string()));
        }

        let _in_flight = InFlight::enter(&self.shared);
        let params = json!({ "name": remote_name, "arguments": arguments });

        match self
            .shared
            .request(method::TOOLS_CALL, Some(params), timeout)
            .await
        {
            Ok(value) => {
                self.shared.consecutive_timeouts.store(0, Ordering::SeqCst);
                let result: CallToolResult = serde_json::from_value(value).map_err(|e| {
                    SessionError::ProtocolError(format!("Invalid tools/call result: {e}"))
                })?;
                if result.is_error {
                    Err(SessionError::ToolError(result.error_text()))
                } else {
                    Ok(result.into_output())
                }
            }
            Err(e) if e.is_timeout() => {
                let count = self.shared.consecutive_timeouts.fetch_add(1, Ordering::SeqCst) + 1;
                tracing::warn!(
                    server_id = %self.shared.server_id,
                    tool = %remote_name,
                    consecutive = count,
                    "Tool call timed out"
                );
                if count >= self.shared.settings.fault_after_timeouts {
                    self.shared
                        .fault(format!("{count} consecutive invocation timeouts"));
                }
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Mark the session faulted (for example after a failed discovery).
    pub fn fault(&self, reason: impl Into<String>) {
        self.shared.fault(reason.into());
    }

    /// Give up on the session; no further reconnects will be attempted.
    pub fn mark_permanent(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.shared.transition(|state| match state {
            SessionState::Closing | SessionState::Closed => None,
            _ => Some(SessionState::permanently_faulted(reason)),
        });
    }

    /// Shut the session down. Always ends in `Closed`.
    pub async fn close(&self) {
        self.shared.transition(|state| match state {
            SessionState::Closed => None,
            _ => Some(SessionState::Closing),
        });

        // Waiters are released before the transport gets its shutdown grace.
        self.shared.detach();
        self.shared.fail_pending(|| SessionError::Closed);
        self.teardown().await;
        self.shared.fail_pending(|| SessionError::Closed);
        self.shared.force_state(SessionState::Closed);
    }

    /// Drop the current transport, if any.
    async fn teardown(&self) {
        self.shared.detach();

        let runtime = self.runtime.lock().await.take();
        if let Some(runtime) = runtime {
            runtime.reader.abort();
            runtime
                .guard
                .shutdown(self.shared.settings.shutdown_grace())
                .await;
        }
    }
}

impl Shared {
    fn pending(&self) -> MutexGuard<'_, HashMap<u64, Waiter>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sender(&self) -> Result<mpsc::Sender<String>, SessionError> {
        self.outbound
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(SessionError::TransportClosed)
    }

    /// Apply a state change computed from the current state.
    ///
    /// Returns whether the state changed. Nothing leaves `Closed`, and
    /// `Closing` only leads to `Closed`.
    fn transition<F>(&self, next: F) -> bool
    where
        F: FnOnce(&SessionState) -> Option<SessionState>,
    {
        let mut entered = None;
        self.state.send_if_modified(|state| {
            if matches!(state, SessionState::Closed | SessionState::Closing) {
                return false;
            }
            match next(state) {
                Some(new_state) if new_state != *state => {
                    *state = new_state.clone();
                    entered = Some(new_state);
                    true
                }
                _ => false,
            }
        });
        self.announce(entered)
    }

    fn force_state(&self, new_state: SessionState) {
        let mut entered = None;
        self.state.send_if_modified(|state| {
            if *state == new_state {
                return false;
            }
            *state = new_state.clone();
            entered = Some(new_state);
            true
        });
        self.announce(entered);
    }

    fn announce(&self, entered: Option<SessionState>) -> bool {
        let Some(state) = entered else {
            return false;
        };
        tracing::debug!(server_id = %self.server_id, state = %state, "Session state changed");
        self.emitter
            .emit(AppEvent::session_state_changed(&self.server_id, state));
        true
    }

    fn fault(&self, reason: String) {
        let changed = self.transition(|state| match state {
            SessionState::Faulted { .. } => None,
            _ => Some(SessionState::faulted(reason.clone())),
        });
        if changed {
            tracing::warn!(server_id = %self.server_id, reason = %reason, "Session faulted");
        }
    }

    /// Stop accepting outbound messages and disown the current reader.
    fn detach(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.outbound
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    fn fail_pending(&self, error: impl Fn() -> SessionError) {
        let waiters: Vec<Waiter> = self.pending().drain().map(|(_, waiter)| waiter).collect();
        for waiter in waiters {
            let _ = waiter.send(Err(error()));
        }
    }

    /// Send a request and wait for its response.
    ///
    /// The timeout covers queueing as well as waiting. The pending entry is
    /// removed however the call ends, so late responses find no waiter.
    async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value, SessionError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let message = serde_json::to_string(&JsonRpcRequest::new(id, method, params))?;
        let sender = self.sender()?;

        let (tx, rx) = oneshot::channel();
        self.pending().insert(id, tx);
        let _pending = Pending { shared: self, id };

        let exchange = async {
            sender
                .send(message)
                .await
                .map_err(|_| SessionError::TransportClosed)?;
            rx.await.map_err(|_| SessionError::TransportClosed)?
        };

        tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| SessionError::Timeout {
                method: method.to_string(),
                timeout,
            })?
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), SessionError> {
        let message = serde_json::to_string(&JsonRpcNotification::new(method, params))?;
        self.sender()?
            .send(message)
            .await
            .map_err(|_| SessionError::TransportClosed)
    }

    async fn reply(&self, message: Value) {
        let Ok(sender) = self.sender() else {
            return;
        };
        if sender.send(message.to_string()).await.is_err() {
            tracing::debug!(server_id = %self.server_id, "Dropped reply, transport closed");
        }
    }
}

/// Removes a pending entry when the waiting call ends.
struct Pending<'a> {
    shared: &'a Shared,
    id: u64,
}

impl Drop for Pending<'_> {
    fn drop(&mut self) {
        self.shared.pending().remove(&self.id);
    }
}

/// Tracks `Ready` ⇄ `Invoking`.
struct InFlight<'a> {
    shared: &'a Shared,
}

impl<'a> InFlight<'a> {
    fn enter(shared: &'a Shared) -> Self {
        shared.in_flight.fetch_add(1, Ordering::SeqCst);
        shared.transition(|state| {
            matches!(state, SessionState::Ready).then_some(SessionState::Invoking)
        });
        Self { shared }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.shared.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.shared.transition(|state| {
                matches!(state, SessionState::Invoking).then_some(SessionState::Ready)
            });
        }
    }
}

async fn read_loop(shared: Arc<Shared>, mut inbound: mpsc::Receiver<Value>, generation: u64) {
    while let Some(message) = inbound.recv().await {
        match classify_message(&message) {
            MessageKind::Response { id } => {
                let waiter = shared.pending().remove(&id);
                match waiter {
                    Some(waiter) => {
                        let _ = waiter.send(response_outcome(message));
                    }
                    None => {
                        tracing::debug!(
                            server_id = %shared.server_id,
                            id,
                            "Ignoring response with no pending request"
                        );
                    }
                }
            }
            MessageKind::Notification { method } => {
                if method == method::TOOLS_LIST_CHANGED {
                    tracing::debug!(server_id = %shared.server_id, "Tool list changed");
                    shared.tools_changed.notify_one();
                } else {
                    tracing::trace!(server_id = %shared.server_id, method = %method, "Ignoring notification");
                }
            }
            MessageKind::IncomingRequest { id, method } => {
                let reply = if method == method::PING {
                    empty_result(&id)
                } else {
                    method_not_found(&id, &method)
                };
                shared.reply(reply).await;
            }
            MessageKind::Invalid => {
                tracing::debug!(server_id = %shared.server_id, "Ignoring malformed message");
            }
        }
    }

    // A replaced or closed transport is not a fault
    if shared.generation.load(Ordering::SeqCst) == generation {
        shared.fault("Transport closed".to_string());
        shared.fail_pending(|| SessionError::TransportClosed);
    }
}

fn response_outcome(message: Value) -> Result<Value, SessionError> {
    let response: JsonRpcResponse = serde_json::from_value(message)?;
    if let Some(error) = response.error {
        return Err(SessionError::ServerError {
            code: error.code,
            message: error.message,
        });
    }
    Ok(response.result.unwrap_or(Value::Null))
}

fn parse_tool(entry: Value, server_id: &str) -> Result<ToolInfo, SessionError> {
    let Value::Object(mut fields) = entry else {
        return Err(SessionError::Discovery(
            "Tool entry is not an object".to_string(),
        ));
    };

    let name = match fields.remove("name") {
        Some(Value::String(name)) if !name.trim().is_empty() => name,
        _ => {
            return Err(SessionError::Discovery(
                "Tool entry has a missing or empty name".to_string(),
            ));
        }
    };

    let description = match fields.remove("description") {
        Some(Value::String(description)) => description,
        _ => String::new(),
    };

    let schema = InputSchema::from_optional(fields.remove("inputSchema"))
        .map_err(|e| SessionError::Discovery(format!("Tool '{name}': {e}")))?;

    Ok(ToolInfo::new(name, server_id)
        .with_description(description)
        .with_input_schema(schema))
}
