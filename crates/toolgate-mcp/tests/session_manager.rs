mod common;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{FakeFleet, Script, server, wait_until};
use serde_json::json;
use toolgate_core::{GatewayError, GatewaySettings, RemoteToolPort, RestartPolicy};
use toolgate_mcp::{SessionManager, SessionState};

fn manager(fleet: FakeFleet) -> SessionManager {
    SessionManager::new(
        GatewaySettings {
            handshake_timeout_ms: 1_000,
            discovery_timeout_ms: 1_000,
            ..GatewaySettings::default()
        },
        Arc::new(fleet),
    )
}

#[tokio::test]
async fn test_failed_server_does_not_block_others() {
    let manager = manager(FakeFleet::default().with("beta", Script::with_tools(&["search"])));

    let report = manager
        .initialize(vec![
            server("alpha").with_restart(RestartPolicy::never()),
            server("beta"),
        ])
        .await;

    assert_eq!(report.ready, vec!["beta".to_string()]);
    assert_eq!(report.faulted.len(), 1);
    assert_eq!(report.faulted[0].server_id, "alpha");

    let catalog = manager.catalog();
    assert!(catalog.contains("search"));
    assert_eq!(catalog.tool_count_for("alpha"), 0);
    assert_eq!(catalog.get("search").unwrap().owner_server_id, "beta");
}

#[tokio::test]
async fn test_same_remote_name_gets_distinct_qualified_names() {
    let manager = manager(
        FakeFleet::default()
            .with("alpha", Script::with_tools(&["search"]))
            .with("beta", Script::with_tools(&["search"])),
    );
    manager
        .initialize(vec![server("alpha"), server("beta")])
        .await;

    let catalog = manager.catalog();
    assert!(!catalog.contains("search"));
    assert!(catalog.contains("alpha.search"));
    assert!(catalog.contains("beta.search"));
    assert_eq!(catalog.collisions().len(), 1);
}

#[tokio::test]
async fn test_reserved_local_name_is_qualified() {
    let manager = SessionManager::builder(
        GatewaySettings::default(),
        Arc::new(FakeFleet::default().with("alpha", Script::with_tools(&["echo", "grep"]))),
    )
    .reserved_names(BTreeSet::from(["echo".to_string()]))
    .build();
    manager.initialize(vec![server("alpha")]).await;

    let catalog = manager.catalog();
    assert!(!catalog.contains("echo"));
    assert!(catalog.contains("alpha.echo"));
    assert!(catalog.contains("grep"));
}

#[tokio::test]
async fn test_invalid_and_duplicate_configs_are_skipped() {
    let manager = manager(FakeFleet::default().with("alpha", Script::with_tools(&["a"])));

    let report = manager
        .initialize(vec![
            server("alpha"),
            server("alpha"),
            server("local"),
            server("off").with_enabled(false),
        ])
        .await;

    assert_eq!(report.ready, vec!["alpha".to_string()]);
    assert_eq!(report.skipped.len(), 3);
}

#[tokio::test]
async fn test_invoke_routes_to_owner() {
    let manager = manager(FakeFleet::default().with("alpha", Script::with_tools(&["echo"])));
    manager.initialize(vec![server("alpha")]).await;

    let output = RemoteToolPort::invoke(&manager, "alpha", "echo", json!({ "msg": "hi" }))
        .await
        .unwrap();
    assert_eq!(output, json!({ "msg": "hi" }));

    let err = manager.invoke("missing", json!({})).await.unwrap_err();
    assert_eq!(err, GatewayError::ToolNotFound("missing".to_string()));
}

#[tokio::test]
async fn test_invoke_on_never_reroutes() {
    let manager = manager(FakeFleet::default().with("alpha", Script::with_tools(&["echo"])));
    manager.initialize(vec![server("alpha")]).await;

    let err = manager
        .invoke_on("beta", "echo", json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::ServerUnavailable { .. }), "{err}");
}

#[tokio::test]
async fn test_removed_server_stays_out_of_catalog_after_rediscovery() {
    let manager = manager(
        FakeFleet::default()
            .with("alpha", Script::with_tools(&["mutate"]))
            .with("beta", Script::with_tools(&["echo"])),
    );
    manager
        .initialize(vec![server("alpha"), server("beta")])
        .await;

    // The list_changed notification races with the removal below.
    manager.invoke("mutate", json!({})).await.unwrap();
    let report = manager.reconcile(vec![server("beta")]).await;
    assert_eq!(report.removed, vec!["alpha".to_string()]);

    assert_eq!(manager.catalog().tool_count_for("alpha"), 0);
    tokio::time::sleep(Duration::from_millis(100)).await;
    let catalog = manager.catalog();
    assert_eq!(catalog.tool_count_for("alpha"), 0);
    assert!(!catalog.contains("added"));
    assert!(!catalog.contains("mutate"));
    assert!(catalog.contains("echo"));
}

#[tokio::test]
async fn test_invocation_timeout_uses_server_bound() {
    let manager = manager(FakeFleet::default().with("alpha", Script::with_tools(&["hang"])));
    manager
        .initialize(vec![
            server("alpha").with_invocation_timeout(Duration::from_millis(100)),
        ])
        .await;

    let started = Instant::now();
    let err = manager.invoke("hang", json!({})).await.unwrap_err();
    assert!(matches!(err, GatewayError::InvocationTimeout { .. }), "{err}");
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_tool_failure_maps_to_tool_failed() {
    let manager = manager(FakeFleet::default().with("alpha", Script::with_tools(&["fail"])));
    manager.initialize(vec![server("alpha")]).await;

    let err = manager.invoke("fail", json!({})).await.unwrap_err();
    assert_eq!(
        err,
        GatewayError::ToolFailed {
            tool: "fail".to_string(),
            message: "boom".to_string(),
        }
    );
}

#[tokio::test]
async fn test_list_changed_triggers_rediscovery() {
    let manager = manager(FakeFleet::default().with("alpha", Script::with_tools(&["mutate"])));
    manager.initialize(vec![server("alpha")]).await;
    assert!(!manager.catalog().contains("added"));

    manager.invoke("mutate", json!({})).await.unwrap();

    wait_until(|| async { manager.catalog().contains("added") }).await;
}

#[tokio::test]
async fn test_dropped_server_reconnects() {
    let manager = manager(FakeFleet::default().with("alpha", Script::with_tools(&["crash", "echo"])));
    manager
        .initialize(vec![server("alpha").with_restart(RestartPolicy {
            max_attempts: 3,
            base_delay_ms: 10,
            max_delay_ms: 50,
        })])
        .await;

    let _ = manager.invoke("crash", json!({})).await;

    wait_until(|| async {
        manager
            .statuses()
            .await
            .first()
            .is_some_and(|s| s.state == SessionState::Ready && s.tool_count == 2)
    })
    .await;

    let output = manager.invoke("echo", json!({ "ok": 1 })).await.unwrap();
    assert_eq!(output, json!({ "ok": 1 }));
}

#[tokio::test]
async fn test_exhausted_restarts_fault_permanently() {
    let manager = manager(FakeFleet::default());
    manager
        .initialize(vec![server("alpha").with_restart(RestartPolicy {
            max_attempts: 2,
            base_delay_ms: 5,
            max_delay_ms: 10,
        })])
        .await;

    wait_until(|| async {
        manager.statuses().await.first().is_some_and(|s| {
            matches!(s.state, SessionState::Faulted { permanent: true, .. })
        })
    })
    .await;
}

#[tokio::test]
async fn test_reconcile_keeps_unchanged_sessions() {
    let manager = manager(
        FakeFleet::default()
            .with("alpha", Script::with_tools(&["a"]))
            .with("beta", Script::with_tools(&["b"]))
            .with("gamma", Script::with_tools(&["c"])),
    );
    manager
        .initialize(vec![server("alpha"), server("beta")])
        .await;
    let alpha_before = manager.session("alpha").await.unwrap();
    let beta_before = manager.session("beta").await.unwrap();

    let report = manager
        .reconcile(vec![server("alpha"), server("gamma")])
        .await;

    assert_eq!(report.added, vec!["gamma".to_string()]);
    assert_eq!(report.removed, vec!["beta".to_string()]);
    assert_eq!(report.unchanged, vec!["alpha".to_string()]);
    assert!(report.restarted.is_empty());

    let alpha_after = manager.session("alpha").await.unwrap();
    assert!(Arc::ptr_eq(&alpha_before, &alpha_after));
    assert_eq!(beta_before.state(), SessionState::Closed);
    assert!(manager.session("beta").await.is_none());

    let catalog = manager.catalog();
    assert!(catalog.contains("a"));
    assert!(!catalog.contains("b"));
    assert!(catalog.contains("c"));
}

#[tokio::test]
async fn test_reconcile_restarts_changed_config() {
    let manager = manager(FakeFleet::default().with("alpha", Script::with_tools(&["a"])));
    manager.initialize(vec![server("alpha")]).await;
    let before = manager.session("alpha").await.unwrap();

    let report = manager
        .reconcile(vec![server("alpha").with_env("LOG_LEVEL", "debug")])
        .await;

    assert_eq!(report.restarted, vec!["alpha".to_string()]);
    let after = manager.session("alpha").await.unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(after.state(), SessionState::Ready);
    assert!(manager.catalog().contains("a"));
}

#[tokio::test]
async fn test_shutdown_empties_catalog() {
    let manager = manager(FakeFleet::default().with("alpha", Script::with_tools(&["a"])));
    manager.initialize(vec![server("alpha")]).await;
    let session = manager.session("alpha").await.unwrap();

    manager.shutdown().await;

    assert!(manager.catalog().is_empty());
    assert!(manager.statuses().await.is_empty());
    assert_eq!(session.state(), SessionState::Closed);
}
