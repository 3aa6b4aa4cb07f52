//! Tool invocation gateway.
//!
//! The single entry point for running a tool. Every call goes through the
//! same pipeline:
//!
//! 1. normalize the requested name
//! 2. resolve it (local built-ins first, then the remote catalog)
//! 3. apply the confirmation policy
//! 4. validate arguments against the tool's input schema
//! 5. dispatch and wrap the outcome

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::{
    CatalogCollision, ConfirmationPolicy, InvocationRequest, InvocationResult, LOCAL_OWNER,
    RiskClass, ToolInfo, tool_name,
};
use crate::events::AppEvent;
use crate::ports::{
    AppEventEmitter, GatewayError, LocalToolRegistry, NoopEmitter, RemoteToolPort,
};
use crate::settings::GatewaySettings;

/// Where a resolved tool runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolTarget {
    Local,
    Remote {
        server_id: String,
        remote_name: String,
    },
}

/// Outcome of name resolution, without dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedTool {
    /// The normalized form of the requested name.
    pub canonical_name: String,
    pub target: ToolTarget,
    pub risk: RiskClass,
    pub tool: ToolInfo,
}

impl ResolvedTool {
    pub fn owner(&self) -> &str {
        match &self.target {
            ToolTarget::Local => LOCAL_OWNER,
            ToolTarget::Remote { server_id, .. } => server_id,
        }
    }
}

/// A tool as listed for prompt assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListedTool {
    #[serde(flatten)]
    pub tool: ToolInfo,
    pub risk: RiskClass,
}

/// Normalizes, resolves, gates, validates, and dispatches tool calls.
pub struct ToolGateway {
    local: LocalToolRegistry,
    remote: Arc<dyn RemoteToolPort>,
    policy: ConfirmationPolicy,
    settings: GatewaySettings,
    emitter: Arc<dyn AppEventEmitter>,
}

impl ToolGateway {
    /// Create a gateway over local built-ins and a remote tool port.
    pub fn new(
        local: LocalToolRegistry,
        remote: Arc<dyn RemoteToolPort>,
        policy: ConfirmationPolicy,
    ) -> Self {
        Self {
            local,
            remote,
            policy,
            settings: GatewaySettings::default(),
            emitter: Arc::new(NoopEmitter::new()),
        }
    }

    #[must_use]
    pub fn with_settings(mut self, settings: GatewaySettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn with_emitter(mut self, emitter: Arc<dyn AppEventEmitter>) -> Self {
        self.emitter = emitter;
        self
    }

    pub const fn policy(&self) -> &ConfirmationPolicy {
        &self.policy
    }

    /// Resolve a raw name to its handler and risk class.
    pub fn resolve(&self, raw_tool_name: &str) -> Result<ResolvedTool, GatewayError> {
        let canonical = tool_name::normalize(raw_tool_name)
            .ok_or_else(|| GatewayError::ToolNotFound(raw_tool_name.to_string()))?;

        if let Some((info, _)) = self.local.get(&canonical) {
            return Ok(ResolvedTool {
                risk: self.policy.classify(&canonical),
                target: ToolTarget::Local,
                tool: info.clone(),
                canonical_name: canonical,
            });
        }

        let catalog = self.remote.catalog();
        let entry = catalog
            .get(&canonical)
            .ok_or_else(|| GatewayError::ToolNotFound(canonical.clone()))?;

        Ok(ResolvedTool {
            risk: self.policy.classify_all([
                entry.qualified_name.as_str(),
                entry.canonical_remote_name.as_str(),
            ]),
            target: ToolTarget::Remote {
                server_id: entry.owner_server_id.clone(),
                remote_name: entry.remote_name.clone(),
            },
            tool: entry.tool.clone(),
            canonical_name: canonical,
        })
    }

    /// Run a tool and return its output or a typed error.
    pub async fn try_execute(
        &self,
        raw_tool_name: &str,
        arguments: Value,
        confirmed: bool,
    ) -> Result<Value, GatewayError> {
        let resolved = self.resolve(raw_tool_name)?;
        let name = resolved.canonical_name.as_str();

        if resolved.risk.requires_confirmation() && !confirmed {
            tracing::info!(
                tool = %name,
                requested = %raw_tool_name,
                "Blocked unconfirmed call to side-effecting tool"
            );
            self.emitter.emit(AppEvent::confirmation_required(name));
            return Err(GatewayError::ConfirmationRequired(name.to_string()));
        }

        let arguments = match arguments {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };
        resolved
            .tool
            .input_schema
            .validate_arguments(&arguments)
            .map_err(|errors| GatewayError::InvalidArguments {
                tool: name.to_string(),
                errors,
            })?;

        tracing::debug!(tool = %name, owner = %resolved.owner(), "Dispatching tool call");
        let started = Instant::now();
        let result = self.dispatch(&resolved, arguments).await;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match &result {
            Ok(_) => tracing::debug!(tool = %name, duration_ms, "Tool call succeeded"),
            Err(e) => tracing::warn!(tool = %name, duration_ms, error = %e, "Tool call failed"),
        }
        self.emitter.emit(AppEvent::tool_invoked(
            name,
            resolved.owner(),
            result.is_ok(),
            duration_ms,
        ));

        result
    }

    /// Run a tool, folding every failure into an [`InvocationResult`].
    pub async fn execute(
        &self,
        raw_tool_name: &str,
        arguments: Value,
        confirmed: bool,
    ) -> InvocationResult {
        self.try_execute(raw_tool_name, arguments, confirmed)
            .await
            .into()
    }

    /// [`Self::execute`] for a request envelope.
    pub async fn handle(&self, request: InvocationRequest) -> InvocationResult {
        self.execute(&request.raw_tool_name, request.arguments, request.confirmed)
            .await
    }

    async fn dispatch(
        &self,
        resolved: &ResolvedTool,
        arguments: Value,
    ) -> Result<Value, GatewayError> {
        match &resolved.target {
            ToolTarget::Local => {
                let name = &resolved.canonical_name;
                let (_, handler) = self
                    .local
                    .get(name)
                    .ok_or_else(|| GatewayError::ToolNotFound(name.clone()))?;
                let timeout = self.settings.local_timeout();

                match tokio::time::timeout(timeout, handler.call(arguments)).await {
                    Ok(Ok(output)) => Ok(output),
                    Ok(Err(e)) => Err(GatewayError::ToolFailed {
                        tool: name.clone(),
                        message: format!("{e:#}"),
                    }),
                    Err(_) => Err(GatewayError::InvocationTimeout {
                        tool: name.clone(),
                        timeout,
                    }),
                }
            }
            ToolTarget::Remote {
                server_id,
                remote_name,
            } => {
                self.remote
                    .invoke(server_id, remote_name, arguments)
                    .await
            }
        }
    }

    /// Every reachable tool with its risk class, local built-ins first.
    pub fn tools(&self) -> Vec<ListedTool> {
        let catalog = self.remote.catalog();

        let local = self.local.tools().map(|tool| ListedTool {
            risk: self.policy.classify(&tool.name),
            tool: tool.clone(),
        });
        let remote = catalog
            .entries()
            .filter(|entry| !self.local.contains(&entry.qualified_name))
            .map(|entry| ListedTool {
                risk: self.policy.classify_all([
                    entry.qualified_name.as_str(),
                    entry.canonical_remote_name.as_str(),
                ]),
                tool: entry.tool.clone(),
            });

        local.chain(remote).collect()
    }

    /// Names that were namespaced because several owners offered them.
    pub fn collisions(&self) -> Vec<CatalogCollision> {
        self.remote.catalog().collisions().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeSet, VecDeque};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::domain::{InputSchema, ToolCatalog};
    use crate::ports::{
        CONFIRMATION_REQUIRED_MESSAGE, LocalToolHandler, MockRemoteToolPort, NoRemoteTools,
    };

    /// Local tool that counts its calls.
    struct Counting {
        name: &'static str,
        calls: Arc<AtomicUsize>,
        schema: InputSchema,
    }

    impl Counting {
        fn new(name: &'static str) -> (Arc<dyn LocalToolHandler>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let tool = Arc::new(Self {
                name,
                calls: Arc::clone(&calls),
                schema: InputSchema::permissive(),
            });
            (tool, calls)
        }

        fn with_schema(
            name: &'static str,
            schema: Value,
        ) -> (Arc<dyn LocalToolHandler>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let tool = Arc::new(Self {
                name,
                calls: Arc::clone(&calls),
                schema: InputSchema::parse(schema).unwrap(),
            });
            (tool, calls)
        }
    }

    #[async_trait]
    impl LocalToolHandler for Counting {
        fn info(&self) -> ToolInfo {
            ToolInfo::local(self.name).with_input_schema(self.schema.clone())
        }

        async fn call(&self, arguments: Value) -> anyhow::Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!({ "echo": arguments }))
        }
    }

    struct Failing;

    #[async_trait]
    impl LocalToolHandler for Failing {
        fn info(&self) -> ToolInfo {
            ToolInfo::local("broken.tool")
        }

        async fn call(&self, _arguments: Value) -> anyhow::Result<Value> {
            anyhow::bail!("disk on fire")
        }
    }

    struct Sleepy;

    #[async_trait]
    impl LocalToolHandler for Sleepy {
        fn info(&self) -> ToolInfo {
            ToolInfo::local("slow.report")
        }

        async fn call(&self, _arguments: Value) -> anyhow::Result<Value> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Value::Null)
        }
    }

    #[derive(Default)]
    struct RecordingEmitter(Arc<Mutex<Vec<AppEvent>>>);

    impl AppEventEmitter for RecordingEmitter {
        fn emit(&self, event: AppEvent) {
            self.0.lock().unwrap().push(event);
        }

        fn clone_box(&self) -> Box<dyn AppEventEmitter> {
            Box::new(Self(Arc::clone(&self.0)))
        }
    }

    fn local_gateway(handlers: Vec<Arc<dyn LocalToolHandler>>) -> ToolGateway {
        let mut registry = LocalToolRegistry::new();
        for handler in handlers {
            registry.register(handler).unwrap();
        }
        ToolGateway::new(
            registry,
            Arc::new(NoRemoteTools::new()),
            ConfirmationPolicy::default(),
        )
    }

    fn remote_catalog(server: &str, names: &[&str]) -> Arc<ToolCatalog> {
        let tools: Vec<ToolInfo> = names.iter().map(|n| ToolInfo::new(*n, server)).collect();
        Arc::new(ToolCatalog::build(
            [(server, tools.as_slice())],
            &BTreeSet::new(),
        ))
    }

    #[tokio::test]
    async fn test_unconfirmed_side_effecting_call_never_reaches_handler() {
        let (tool, calls) = Counting::new("fs.writeFile");
        let gateway = local_gateway(vec![tool]);

        for name in ["fs.writeFile", "fs_writeFile", "write_file", "fs/writeFile"] {
            let result = gateway
                .execute(name, json!({ "path": "/tmp/x", "content": "hi" }), false)
                .await;
            assert!(!result.success, "{name} must be blocked");
            assert!(
                result
                    .error
                    .as_deref()
                    .unwrap()
                    .contains(CONFIRMATION_REQUIRED_MESSAGE)
            );
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_confirmed_call_reaches_handler() {
        let (tool, calls) = Counting::new("fs.writeFile");
        let gateway = local_gateway(vec![tool]);

        let result = gateway
            .execute("fs_writeFile", json!({ "path": "/tmp/x" }), true)
            .await;
        assert!(result.success);
        assert_eq!(result.output.unwrap()["echo"]["path"], "/tmp/x");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_alias_spellings_share_policy_outcome() {
        let (tool, _) = Counting::new("fs.writeFile");
        let gateway = local_gateway(vec![tool]);

        let dotted = gateway.execute("fs.writeFile", json!({}), false).await;
        let underscored = gateway.execute("fs_writeFile", json!({}), false).await;
        assert_eq!(dotted, underscored);
    }

    #[tokio::test]
    async fn test_safe_tool_runs_without_confirmation() {
        let (tool, calls) = Counting::new("time.now");
        let gateway = local_gateway(vec![tool]);

        let result = gateway.execute("time_now", Value::Null, false).await;
        assert!(result.success);
        assert_eq!(result.output.unwrap()["echo"], json!({}));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_and_empty_names_are_not_found() {
        let gateway = local_gateway(vec![]);

        let err = gateway
            .try_execute("weather.forecast", json!({}), false)
            .await
            .unwrap_err();
        assert_eq!(err, GatewayError::ToolNotFound("weather.forecast".to_string()));

        let err = gateway.try_execute(" _ ", json!({}), true).await.unwrap_err();
        assert!(matches!(err, GatewayError::ToolNotFound(_)));
    }

    #[tokio::test]
    async fn test_invalid_arguments_are_rejected_before_dispatch() {
        let (tool, calls) = Counting::with_schema(
            "echo",
            json!({
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"]
            }),
        );
        let gateway = local_gateway(vec![tool]);

        let err = gateway
            .try_execute("echo", json!({ "text": 5 }), false)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidArguments { .. }));

        let err = gateway
            .try_execute("echo", json!("text"), false)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidArguments { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_handler_failure_is_wrapped() {
        let gateway = local_gateway(vec![Arc::new(Failing) as Arc<dyn LocalToolHandler>]);
        let result = gateway.execute("broken.tool", json!({}), false).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("disk on fire"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_local_timeout_is_enforced() {
        let gateway = local_gateway(vec![Arc::new(Sleepy) as Arc<dyn LocalToolHandler>]).with_settings(GatewaySettings {
            local_timeout_ms: 50,
            ..GatewaySettings::default()
        });
        let err = gateway
            .try_execute("slow.report", json!({}), false)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvocationTimeout { .. }));
    }

    #[tokio::test]
    async fn test_session_start_example() {
        let (tool, calls) = Counting::new("devo.exec.session.start");
        let gateway = local_gateway(vec![tool]);

        let blocked = gateway
            .execute("devo_exec_session_start", json!({ "command": "npm test" }), false)
            .await;
        assert!(!blocked.success);
        assert!(blocked.error.unwrap().contains(CONFIRMATION_REQUIRED_MESSAGE));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let allowed = gateway
            .execute("devo_exec_session_start", json!({ "command": "npm test" }), true)
            .await;
        assert!(allowed.success);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_remote_tool_dispatches_through_port() {
        let catalog = remote_catalog("github", &["list_issues"]);
        let mut remote = MockRemoteToolPort::new();
        remote
            .expect_catalog()
            .returning(move || Arc::clone(&catalog));
        remote
            .expect_invoke()
            .withf(|server, name, _| server == "github" && name == "list_issues")
            .times(1)
            .returning(|_, _, args| Ok(json!({ "received": args })));

        let gateway = ToolGateway::new(
            LocalToolRegistry::new(),
            Arc::new(remote),
            ConfirmationPolicy::default(),
        );
        let result = gateway
            .execute("list_issues", json!({ "repo": "x" }), false)
            .await;
        assert!(result.success);
        assert_eq!(result.output.unwrap()["received"]["repo"], "x");
    }

    #[tokio::test]
    async fn test_remote_side_effecting_tool_is_gated() {
        let catalog = remote_catalog("github", &["create_issue"]);
        let mut remote = MockRemoteToolPort::new();
        remote
            .expect_catalog()
            .returning(move || Arc::clone(&catalog));
        remote.expect_invoke().times(0);

        let gateway = ToolGateway::new(
            LocalToolRegistry::new(),
            Arc::new(remote),
            ConfirmationPolicy::default(),
        );
        let err = gateway
            .try_execute("create_issue", json!({}), false)
            .await
            .unwrap_err();
        assert!(err.is_confirmation_required());
    }

    #[tokio::test]
    async fn test_remote_alias_cannot_bypass_policy() {
        // A remote tool spelled as a legacy alias is classified by its canonical form
        let catalog = remote_catalog("box", &["bash"]);
        let mut remote = MockRemoteToolPort::new();
        remote
            .expect_catalog()
            .returning(move || Arc::clone(&catalog));
        remote.expect_invoke().times(0);

        let gateway = ToolGateway::new(
            LocalToolRegistry::new(),
            Arc::new(remote),
            ConfirmationPolicy::default(),
        );
        let resolved = gateway.resolve("bash").unwrap();
        assert_eq!(resolved.risk, RiskClass::RequiresConfirmation);
        assert_eq!(
            resolved.target,
            ToolTarget::Remote {
                server_id: "box".to_string(),
                remote_name: "bash".to_string(),
            }
        );
        let result = gateway.execute("sh", json!({}), false).await;
        assert!(!result.success);
    }

    /// Serves one catalog snapshot per read, repeating the last one.
    struct ShiftingCatalog {
        snapshots: Mutex<VecDeque<Arc<ToolCatalog>>>,
        invoked: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl RemoteToolPort for ShiftingCatalog {
        fn catalog(&self) -> Arc<ToolCatalog> {
            let mut snapshots = self.snapshots.lock().unwrap();
            if snapshots.len() > 1 {
                snapshots.pop_front().unwrap()
            } else {
                Arc::clone(snapshots.front().unwrap())
            }
        }

        async fn invoke(
            &self,
            server_id: &str,
            remote_name: &str,
            _arguments: Value,
        ) -> Result<Value, GatewayError> {
            self.invoked
                .lock()
                .unwrap()
                .push((server_id.to_string(), remote_name.to_string()));
            Ok(json!({ "ran": remote_name }))
        }
    }

    #[tokio::test]
    async fn test_dispatch_uses_the_classified_entry_after_catalog_swap() {
        // Before: zeta publishes a safe tool under "beta.git.checkout".
        let before = remote_catalog("zeta", &["beta.git.checkout"]);
        // After: beta's git_checkout is namespaced onto the same name.
        let beta = vec![ToolInfo::new("git_checkout", "beta")];
        let after = Arc::new(ToolCatalog::build(
            [("beta", beta.as_slice())],
            &BTreeSet::from(["git.checkout".to_string()]),
        ));
        assert!(after.contains("beta.git.checkout"));

        let port = Arc::new(ShiftingCatalog {
            snapshots: Mutex::new(VecDeque::from([before, after])),
            invoked: Mutex::new(Vec::new()),
        });
        let gateway = ToolGateway::new(
            LocalToolRegistry::new(),
            Arc::clone(&port) as Arc<dyn RemoteToolPort>,
            ConfirmationPolicy::default(),
        );

        let result = gateway
            .execute("beta.git.checkout", json!({}), false)
            .await;
        assert!(result.success);
        assert_eq!(result.output.unwrap()["ran"], "beta.git.checkout");
        assert_eq!(
            *port.invoked.lock().unwrap(),
            vec![("zeta".to_string(), "beta.git.checkout".to_string())]
        );
    }

    #[tokio::test]
    async fn test_remote_errors_are_wrapped() {
        let catalog = remote_catalog("slow", &["report"]);
        let mut remote = MockRemoteToolPort::new();
        remote
            .expect_catalog()
            .returning(move || Arc::clone(&catalog));
        remote.expect_invoke().returning(|_, name, _| {
            Err(GatewayError::InvocationTimeout {
                tool: name.to_string(),
                timeout: Duration::from_millis(10),
            })
        });

        let gateway = ToolGateway::new(
            LocalToolRegistry::new(),
            Arc::new(remote),
            ConfirmationPolicy::default(),
        );
        let result = gateway.execute("report", json!({}), false).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("timed out"));
    }

    #[test]
    fn test_local_tools_shadow_remote_and_are_listed_first() {
        let catalog = remote_catalog("clock", &["time_now", "weather"]);
        let mut remote = MockRemoteToolPort::new();
        remote
            .expect_catalog()
            .returning(move || Arc::clone(&catalog));

        let (tool, _) = Counting::new("time.now");
        let registry = LocalToolRegistry::new().with(tool).unwrap();
        let gateway = ToolGateway::new(registry, Arc::new(remote), ConfirmationPolicy::default());

        let resolved = gateway.resolve("time.now").unwrap();
        assert_eq!(resolved.target, ToolTarget::Local);
        assert_eq!(resolved.owner(), "local");

        let names: Vec<String> = gateway.tools().into_iter().map(|t| t.tool.name).collect();
        assert_eq!(names, vec!["time.now", "weather"]);
    }

    #[tokio::test]
    async fn test_events_are_emitted() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let (write, _) = Counting::new("fs.writeFile");
        let (now, _) = Counting::new("time.now");
        let gateway = local_gateway(vec![write, now])
            .with_emitter(Arc::new(RecordingEmitter(Arc::clone(&events))));

        gateway.execute("fs.writeFile", json!({}), false).await;
        gateway.execute("time.now", json!({}), false).await;

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], AppEvent::confirmation_required("fs.writeFile"));
        assert!(matches!(
            &events[1],
            AppEvent::ToolInvoked { tool, success: true, .. } if tool == "time.now"
        ));
    }

    #[test]
    fn test_resolve_reports_canonical_name() {
        let (tool, _) = Counting::new("shell.exec");
        let gateway = local_gateway(vec![tool]);
        let resolved = tokio_test::assert_ok!(gateway.resolve("bash"));
        assert_eq!(resolved.canonical_name, "shell.exec");
        assert_eq!(resolved.risk, RiskClass::RequiresConfirmation);
    }
}
