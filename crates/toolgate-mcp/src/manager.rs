//! Tool server fleet management.
//!
//! The [`SessionManager`] owns one [`ProtocolSession`] per configured server,
//! keeps each one alive under a supervisor task, and publishes the aggregated
//! tool catalog as an `Arc` snapshot that is replaced atomically whenever a
//! server's tools appear or disappear.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock as StdRwLock};

use async_trait::async_trait;
use futures_util::future::join_all;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use toolgate_core::{
    AppEvent, AppEventEmitter, ErrorCategory, GatewayError, GatewaySettings, NoopEmitter,
    RemoteToolPort, RestartPolicy, ServerConfig, ServerErrorInfo, ServerStatus, SessionState, ToolCatalog,
    ToolInfo,
};

use crate::error::SessionError;
use crate::protocol::method;
use crate::session::ProtocolSession;
use crate::transport::{Connector, ConnectorFactory};

/// Outcome of [`SessionManager::initialize`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InitReport {
    /// Servers that connected and published their tools.
    pub ready: Vec<String>,
    /// Servers that failed to come up; their supervisors keep retrying.
    pub faulted: Vec<ServerErrorInfo>,
    /// Configurations that were rejected or are disabled.
    pub skipped: Vec<ServerErrorInfo>,
}

/// Outcome of [`SessionManager::reconcile`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub restarted: Vec<String>,
    pub unchanged: Vec<String>,
    pub skipped: Vec<ServerErrorInfo>,
}

struct ManagedSession {
    config: ServerConfig,
    session: Arc<ProtocolSession>,
    cancel: CancellationToken,
    supervisor: JoinHandle<()>,
}

/// State shared between the manager and its supervisors.
struct Fleet {
    settings: GatewaySettings,
    emitter: Arc<dyn AppEventEmitter>,
    reserved: BTreeSet<String>,
    tools: StdRwLock<BTreeMap<String, Vec<ToolInfo>>>,
    catalog: StdRwLock<Arc<ToolCatalog>>,
}

/// Owns every protocol session and the aggregated catalog.
pub struct SessionManager {
    fleet: Arc<Fleet>,
    connectors: Arc<dyn ConnectorFactory>,
    sessions: RwLock<HashMap<String, ManagedSession>>,
}

/// Builder for [`SessionManager`].
pub struct SessionManagerBuilder {
    settings: GatewaySettings,
    connectors: Arc<dyn ConnectorFactory>,
    emitter: Arc<dyn AppEventEmitter>,
    reserved: BTreeSet<String>,
}

impl SessionManagerBuilder {
    #[must_use]
    pub fn emitter(mut self, emitter: Arc<dyn AppEventEmitter>) -> Self {
        self.emitter = emitter;
        self
    }

    /// Names already taken by local tools; remote tools with these canonical
    /// names are published under their qualified name.
    #[must_use]
    pub fn reserved_names(mut self, names: BTreeSet<String>) -> Self {
        self.reserved = names;
        self
    }

    pub fn build(self) -> SessionManager {
        SessionManager {
            fleet: Arc::new(Fleet {
                settings: self.settings,
                emitter: self.emitter,
                reserved: self.reserved,
                tools: StdRwLock::new(BTreeMap::new()),
                catalog: StdRwLock::new(Arc::new(ToolCatalog::empty())),
            }),
            connectors: self.connectors,
            sessions: RwLock::new(HashMap::new()),
        }
    }
}

impl SessionManager {
    pub fn new(settings: GatewaySettings, connectors: Arc<dyn ConnectorFactory>) -> Self {
        Self::builder(settings, connectors).build()
    }

    pub fn builder(
        settings: GatewaySettings,
        connectors: Arc<dyn ConnectorFactory>,
    ) -> SessionManagerBuilder {
        SessionManagerBuilder {
            settings,
            connectors,
            emitter: Arc::new(NoopEmitter::new()),
            reserved: BTreeSet::new(),
        }
    }

    /// Start every enabled server concurrently.
    ///
    /// Never fails: a server that cannot connect is reported as faulted and
    /// left to its supervisor, the rest come up regardless.
    pub async fn initialize(&self, configs: Vec<ServerConfig>) -> InitReport {
        let mut report = InitReport::default();
        let mut seen = HashSet::new();
        let mut accepted = Vec::new();

        {
            let sessions = self.sessions.read().await;
            for config in configs {
                if !config.enabled {
                    tracing::debug!(server_id = %config.id, "Server disabled, skipping");
                    report.skipped.push(ServerErrorInfo::new(
                        &config.id,
                        "Server is disabled",
                        ErrorCategory::Configuration,
                    ));
                    continue;
                }
                if sessions.contains_key(&config.id) || !seen.insert(config.id.clone()) {
                    report.skipped.push(self.fleet.reject(
                        &config.id,
                        format!("Duplicate server id '{}'", config.id),
                    ));
                    continue;
                }
                match self.prepare(&config) {
                    Ok(connector) => accepted.push((config, connector)),
                    Err(info) => report.skipped.push(info),
                }
            }
        }

        for (server_id, outcome) in self.launch(accepted).await {
            match outcome {
                Ok(()) => report.ready.push(server_id),
                Err(e) => report.faulted.push(ServerErrorInfo::from_error(server_id, &e)),
            }
        }

        tracing::info!(
            ready = report.ready.len(),
            faulted = report.faulted.len(),
            skipped = report.skipped.len(),
            "Session manager initialized"
        );
        report
    }

    /// Current catalog snapshot.
    pub fn catalog(&self) -> Arc<ToolCatalog> {
        self.fleet.snapshot()
    }

    /// Invoke a remote tool by its qualified name.
    pub async fn invoke(&self, qualified_name: &str, arguments: Value) -> Result<Value, GatewayError> {
        let (server_id, remote_name) = {
            let catalog = self.catalog();
            let entry = catalog
                .get(qualified_name)
                .ok_or_else(|| GatewayError::ToolNotFound(qualified_name.to_string()))?;
            (entry.owner_server_id.clone(), entry.remote_name.clone())
        };
        self.call(&server_id, &remote_name, qualified_name, arguments)
            .await
    }

    /// Invoke `remote_name` on a specific server.
    ///
    /// Does not consult the catalog; the call goes to exactly this server.
    pub async fn invoke_on(
        &self,
        server_id: &str,
        remote_name: &str,
        arguments: Value,
    ) -> Result<Value, GatewayError> {
        self.call(server_id, remote_name, remote_name, arguments)
            .await
    }

    async fn call(
        &self,
        server_id: &str,
        remote_name: &str,
        label: &str,
        arguments: Value,
    ) -> Result<Value, GatewayError> {
        let (session, timeout) = {
            let sessions = self.sessions.read().await;
            let managed =
                sessions
                    .get(server_id)
                    .ok_or_else(|| GatewayError::ServerUnavailable {
                        server_id: server_id.to_string(),
                        state: SessionState::Closed.to_string(),
                    })?;
            let timeout = managed
                .config
                .invocation_timeout()
                .unwrap_or_else(|| self.fleet.settings.invocation_timeout());
            (Arc::clone(&managed.session), timeout)
        };

        let state = session.state();
        if !state.is_available() {
            return Err(GatewayError::ServerUnavailable {
                server_id: server_id.to_string(),
                state: state.to_string(),
            });
        }

        tracing::debug!(
            server_id = %server_id,
            tool = %remote_name,
            "Dispatching remote tool call"
        );

        session
            .invoke(remote_name, arguments, timeout)
            .await
            .map_err(|e| invocation_error(label, server_id, e))
    }

    /// Apply a new server list.
    ///
    /// Added servers are started, removed (or newly disabled) ones closed,
    /// changed ones restarted. Sessions whose configuration is unchanged keep
    /// running untouched.
    pub async fn reconcile(&self, configs: Vec<ServerConfig>) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let mut desired: BTreeMap<String, ServerConfig> = BTreeMap::new();

        for config in configs {
            if !config.enabled {
                continue;
            }
            if desired.contains_key(&config.id) {
                report.skipped.push(self.fleet.reject(
                    &config.id,
                    format!("Duplicate server id '{}'", config.id),
                ));
                continue;
            }
            if let Err(message) = config.validate() {
                report.skipped.push(self.fleet.reject(&config.id, message));
                continue;
            }
            desired.insert(config.id.clone(), config);
        }

        let mut to_start = Vec::new();
        let stopped = {
            let mut sessions = self.sessions.write().await;

            let removed: Vec<String> = sessions
                .keys()
                .filter(|id| !desired.contains_key(*id))
                .cloned()
                .collect();
            let mut stopped = Vec::new();
            for id in removed {
                if let Some(managed) = sessions.remove(&id) {
                    stopped.push(managed);
                }
                report.removed.push(id);
            }

            for (id, config) in desired {
                let same = sessions.get(&id).map(|managed| managed.config == config);
                match same {
                    Some(true) => report.unchanged.push(id),
                    Some(false) => {
                        if let Some(managed) = sessions.remove(&id) {
                            stopped.push(managed);
                        }
                        report.restarted.push(id);
                        to_start.push(config);
                    }
                    None => {
                        report.added.push(id);
                        to_start.push(config);
                    }
                }
            }
            stopped
        };

        join_all(stopped.into_iter().map(|managed| self.fleet.stop(managed))).await;

        let mut accepted = Vec::new();
        for config in to_start {
            match self.prepare(&config) {
                Ok(connector) => accepted.push((config, connector)),
                Err(info) => {
                    report.added.retain(|id| *id != info.server_id);
                    report.restarted.retain(|id| *id != info.server_id);
                    report.skipped.push(info);
                }
            }
        }
        self.launch(accepted).await;

        tracing::info!(
            added = report.added.len(),
            removed = report.removed.len(),
            restarted = report.restarted.len(),
            unchanged = report.unchanged.len(),
            "Reconciled server configuration"
        );
        report
    }

    /// Per-server diagnostics, sorted by id.
    pub async fn statuses(&self) -> Vec<ServerStatus> {
        let catalog = self.catalog();
        let sessions = self.sessions.read().await;
        let mut statuses: Vec<ServerStatus> = sessions
            .iter()
            .map(|(id, managed)| ServerStatus {
                id: id.clone(),
                state: managed.session.state(),
                tool_count: catalog.tool_count_for(id),
            })
            .collect();
        statuses.sort_by(|a, b| a.id.cmp(&b.id));
        statuses
    }

    /// The live session for a server.
    pub async fn session(&self, server_id: &str) -> Option<Arc<ProtocolSession>> {
        self.sessions
            .read()
            .await
            .get(server_id)
            .map(|managed| Arc::clone(&managed.session))
    }

    /// Close every session and empty the catalog.
    pub async fn shutdown(&self) {
        let drained: Vec<ManagedSession> = {
            let mut sessions = self.sessions.write().await;
            sessions.drain().map(|(_, managed)| managed).collect()
        };
        let count = drained.len();
        join_all(drained.into_iter().map(|managed| self.fleet.stop(managed))).await;
        self.fleet.clear();
        tracing::info!(servers = count, "Session manager shut down");
    }

    /// Validate a configuration and build its connector.
    fn prepare(&self, config: &ServerConfig) -> Result<Arc<dyn Connector>, ServerErrorInfo> {
        config
            .validate()
            .map_err(|message| self.fleet.reject(&config.id, message))?;
        self.connectors
            .connector(config)
            .map_err(|e| self.fleet.reject(&config.id, e.to_string()))
    }

    /// Connect and discover a batch of servers, then hand each to a supervisor.
    async fn launch(
        &self,
        batch: Vec<(ServerConfig, Arc<dyn Connector>)>,
    ) -> Vec<(String, Result<(), GatewayError>)> {
        let semaphore = Arc::new(Semaphore::new(self.fleet.settings.max_parallel_connects.max(1)));

        let started = join_all(batch.into_iter().map(|(config, connector)| {
            let semaphore = Arc::clone(&semaphore);
            let fleet = Arc::clone(&self.fleet);
            async move {
                let _permit = semaphore.acquire().await.ok();
                let session = Arc::new(ProtocolSession::with_emitter(
                    config.id.clone(),
                    fleet.settings.clone(),
                    Arc::clone(&fleet.emitter),
                ));
                let outcome = fleet.bring_up(&session, connector.as_ref()).await;
                (config, connector, session, outcome)
            }
        }))
        .await;

        let mut sessions = self.sessions.write().await;
        let mut results = Vec::with_capacity(started.len());
        for (config, connector, session, outcome) in started {
            let cancel = CancellationToken::new();
            let supervisor = tokio::spawn(supervise(
                Arc::clone(&self.fleet),
                Arc::clone(&session),
                connector,
                config.restart,
                cancel.clone(),
            ));
            results.push((config.id.clone(), outcome));
            if let Some(previous) = sessions.insert(
                config.id.clone(),
                ManagedSession {
                    config,
                    session,
                    cancel,
                    supervisor,
                },
            ) {
                // Raced with another start of the same id
                previous.cancel.cancel();
                previous.supervisor.abort();
            }
        }
        results
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        for managed in self.sessions.get_mut().values() {
            managed.cancel.cancel();
        }
    }
}

#[async_trait]
impl RemoteToolPort for SessionManager {
    fn catalog(&self) -> Arc<ToolCatalog> {
        Self::catalog(self)
    }

    async fn invoke(
        &self,
        server_id: &str,
        remote_name: &str,
        arguments: Value,
    ) -> Result<Value, GatewayError> {
        self.invoke_on(server_id, remote_name, arguments).await
    }
}

impl Fleet {
    fn snapshot(&self) -> Arc<ToolCatalog> {
        Arc::clone(&self.catalog.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Record a rejected configuration.
    fn reject(&self, server_id: &str, message: impl Into<String>) -> ServerErrorInfo {
        let info = ServerErrorInfo::new(server_id, message, ErrorCategory::Configuration);
        tracing::warn!(server_id = %server_id, error = %info.message, "Skipping server");
        self.emitter.emit(AppEvent::server_error(info.clone()));
        info
    }

    fn report(&self, server_id: &str, error: &GatewayError) {
        tracing::warn!(server_id = %server_id, error = %error, "Server error");
        self.emitter
            .emit(AppEvent::server_error(ServerErrorInfo::from_error(server_id, error)));
    }

    /// Connect a session and publish its tools.
    async fn bring_up(
        &self,
        session: &ProtocolSession,
        connector: &dyn Connector,
    ) -> Result<(), GatewayError> {
        let server_id = session.server_id();
        if let Err(e) = session.connect(connector).await {
            let error = connect_error(server_id, e);
            self.report(server_id, &error);
            return Err(error);
        }
        self.discover(session).await
    }

    async fn discover(&self, session: &ProtocolSession) -> Result<(), GatewayError> {
        let server_id = session.server_id();
        match session.list_tools().await {
            Ok(tools) => {
                tracing::info!(server_id = %server_id, tools = tools.len(), "Discovered tools");
                self.publish(session, tools);
                Ok(())
            }
            Err(e) => {
                let error = GatewayError::DiscoveryError {
                    server_id: server_id.to_string(),
                    message: e.to_string(),
                };
                self.report(server_id, &error);
                session.fault(error.to_string());
                self.withdraw(server_id);
                Err(error)
            }
        }
    }

    /// Replace a server's tools. A session that is closing or closed
    /// publishes nothing; `stop` closes before it withdraws.
    fn publish(&self, session: &ProtocolSession, tools: Vec<ToolInfo>) {
        let server_id = session.server_id();
        let mut all = self.tools.write().unwrap_or_else(PoisonError::into_inner);
        if matches!(session.state(), SessionState::Closing | SessionState::Closed) {
            tracing::debug!(server_id = %server_id, "Dropping tools of a stopped server");
            return;
        }
        all.insert(server_id.to_string(), tools);
        self.rebuild(&all);
    }

    fn withdraw(&self, server_id: &str) {
        let mut all = self.tools.write().unwrap_or_else(PoisonError::into_inner);
        if all.remove(server_id).is_some() {
            tracing::debug!(server_id = %server_id, "Removed server tools from catalog");
            self.rebuild(&all);
        }
    }

    fn clear(&self) {
        let mut all = self.tools.write().unwrap_or_else(PoisonError::into_inner);
        all.clear();
        self.rebuild(&all);
    }

    /// Rebuild and swap the catalog. Callers hold the tools write lock so
    /// snapshots are published in mutation order.
    fn rebuild(&self, all: &BTreeMap<String, Vec<ToolInfo>>) {
        let catalog = ToolCatalog::build(
            all.iter().map(|(id, tools)| (id.as_str(), tools.as_slice())),
            &self.reserved,
        );
        let tool_count = catalog.len();
        let collisions = catalog.collisions().len();
        *self.catalog.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(catalog);
        self.emitter
            .emit(AppEvent::catalog_updated(tool_count, collisions));
    }

    async fn stop(&self, managed: ManagedSession) {
        let server_id = managed.config.id.clone();
        managed.cancel.cancel();
        managed.session.close().await;

        let mut supervisor = managed.supervisor;
        if tokio::time::timeout(self.settings.shutdown_grace(), &mut supervisor)
            .await
            .is_err()
        {
            tracing::warn!(server_id = %server_id, "Supervisor did not exit; aborting");
            supervisor.abort();
        }
        self.withdraw(&server_id);
        tracing::info!(server_id = %server_id, "Stopped server");
    }
}

/// Keep one session alive: rediscover on change notifications, reconnect
/// with backoff after faults, give up when the restart policy is exhausted.
async fn supervise(
    fleet: Arc<Fleet>,
    session: Arc<ProtocolSession>,
    connector: Arc<dyn Connector>,
    restart: RestartPolicy,
    cancel: CancellationToken,
) {
    let server_id = session.server_id().to_string();
    let mut states = session.subscribe();
    let mut attempt: u32 = 0;

    loop {
        let state = states.borrow_and_update().clone();
        match state {
            SessionState::Ready | SessionState::Invoking => {
                tokio::select! {
                    () = cancel.cancelled() => return,
                    () = session.tools_changed() => {
                        let _ = fleet.discover(&session).await;
                    }
                    changed = states.changed() => {
                        if changed.is_err() {
                            return;
                        }
                    }
                }
            }
            SessionState::Closed
            | SessionState::Faulted {
                permanent: true, ..
            } => {
                fleet.withdraw(&server_id);
                return;
            }
            SessionState::Faulted { reason, .. } => {
                fleet.withdraw(&server_id);
                attempt += 1;
                if !restart.allows(attempt) {
                    tracing::warn!(
                        server_id = %server_id,
                        attempts = attempt - 1,
                        "Restart attempts exhausted"
                    );
                    session.mark_permanent(reason);
                    continue;
                }

                let delay = restart.delay_for(attempt);
                tracing::info!(
                    server_id = %server_id,
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Reconnecting"
                );
                tokio::select! {
                    () = cancel.cancelled() => return,
                    () = tokio::time::sleep(delay) => {}
                }

                let outcome = tokio::select! {
                    () = cancel.cancelled() => return,
                    outcome = fleet.bring_up(&session, connector.as_ref()) => outcome,
                };
                if outcome.is_ok() {
                    tracing::info!(server_id = %server_id, attempt, "Reconnected");
                    attempt = 0;
                }
            }
            SessionState::Idle
            | SessionState::Connecting
            | SessionState::Negotiating
            | SessionState::Closing => {
                tokio::select! {
                    () = cancel.cancelled() => return,
                    changed = states.changed() => {
                        if changed.is_err() {
                            return;
                        }
                    }
                }
            }
        }
    }
}

/// Map a connect failure onto the gateway taxonomy.
fn connect_error(server_id: &str, error: SessionError) -> GatewayError {
    match error {
        SessionError::Timeout { ref method, timeout } if method == method::INITIALIZE => {
            GatewayError::HandshakeTimeout {
                server_id: server_id.to_string(),
                timeout,
            }
        }
        other => GatewayError::ConnectionError {
            server_id: server_id.to_string(),
            message: other.to_string(),
        },
    }
}

/// Map an invocation failure onto the gateway taxonomy.
fn invocation_error(tool: &str, server_id: &str, error: SessionError) -> GatewayError {
    match error {
        SessionError::Timeout { timeout, .. } => GatewayError::InvocationTimeout {
            tool: tool.to_string(),
            timeout,
        },
        SessionError::ToolError(message) => GatewayError::ToolFailed {
            tool: tool.to_string(),
            message,
        },
        SessionError::ServerError { code, message } => GatewayError::ToolFailed {
            tool: tool.to_string(),
            message: format!("{message} (code {code})"),
        },
        SessionError::NotConnected(state) => GatewayError::ServerUnavailable {
            server_id: server_id.to_string(),
            state,
        },
        SessionError::Closed => GatewayError::ServerUnavailable {
            server_id: server_id.to_string(),
            state: SessionState::Closed.to_string(),
        },
        other => GatewayError::TransportError {
            server_id: server_id.to_string(),
            message: other.to_string(),
        },
    }
}
