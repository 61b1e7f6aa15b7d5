//! End-to-end tests against a real (hermetic) child process: the mock MCP
//! server built from `src/bin/mock_mcp_server.rs`, spawned as a
//! `ServerType::Internal` target so no package manager or network access
//! is involved.

use std::time::Duration;

use mcph_bridge::{Bridge, BridgeConfig, StopOptions, ToolMappingConfig};
use mcph_core::{RestartPolicy, ServerConfig, ServerId, ServerStatus, ServerType};

fn mock_server_config(id: &str, capability: &str, restart_policy: RestartPolicy) -> ServerConfig {
    mock_server_config_with_env(id, capability, restart_policy, Default::default())
}

fn mock_server_config_with_env(
    id: &str,
    capability: &str,
    restart_policy: RestartPolicy,
    env: std::collections::HashMap<String, String>,
) -> ServerConfig {
    ServerConfig {
        id: ServerId::from(id),
        name: id.to_string(),
        capability: capability.to_string(),
        server_type: ServerType::Internal {
            command: env!("CARGO_BIN_EXE_mock_mcp_server").to_string(),
            args: Vec::new(),
        },
        restart_policy,
        health_check: None,
        env,
        working_dir: None,
        memory_limit_mb: None,
        max_restarts_within_window: 10,
        restart_window: Duration::from_secs(60),
    }
}

async fn test_bridge() -> Bridge {
    let mut config = BridgeConfig::parse("").unwrap();
    config.resilience.pool_size = 2;
    config.tool_mappings.push(ToolMappingConfig {
        capability: "echo".into(),
        task_type: "echo".into(),
        tool_name: "echo".into(),
    });
    config.tool_mappings.push(ToolMappingConfig {
        capability: "echo".into(),
        task_type: "store".into(),
        tool_name: "store".into(),
    });
    Bridge::new(&config).await
}

/// S1: install + spawn + discover. Starting a server runs `initialize`
/// then `tools/list` against it and populates the capability map before
/// `start_server` returns.
#[tokio::test]
async fn install_spawn_and_discover() {
    let bridge = test_bridge().await;
    let id = bridge
        .start_server(mock_server_config("s1", "echo", RestartPolicy::Transient))
        .await
        .expect("start_server should succeed");

    let status = bridge.get_status(id.clone()).await.unwrap();
    assert_eq!(status, ServerStatus::Running);

    let result = bridge.execute_task("echo", "echo", serde_json::json!({"message": "probe"})).await;
    assert!(result.is_ok(), "capability should already be routable right after start_server: {result:?}");

    bridge.shutdown().await;
}

/// S2: a tool call round trip, replayed repeatedly with no id collisions
/// and no leaked pending-request state.
#[tokio::test]
async fn tool_call_round_trip_replayed() {
    let bridge = test_bridge().await;
    bridge
        .start_server(mock_server_config("s2", "echo", RestartPolicy::Transient))
        .await
        .expect("start_server should succeed");

    for i in 0..100 {
        let message = format!("hi-{i}");
        let result = bridge
            .execute_task("echo", "echo", serde_json::json!({"message": message.clone()}))
            .await
            .expect("echo call should succeed");
        assert_eq!(result, serde_json::json!({"content": [{"type": "text", "text": message}]}));
    }

    bridge.shutdown().await;
}

/// S3: crash + restart under a permanent policy. The child crashes on its
/// own background timer (independent of any in-flight request, so the
/// single-mailbox actor is free to observe the disconnect and schedule a
/// restart as soon as it happens), and is expected back within a couple of
/// seconds with at least one recorded restart.
#[tokio::test]
async fn crash_triggers_restart_under_permanent_policy() {
    let bridge = test_bridge().await;
    let mut env = std::collections::HashMap::new();
    env.insert("MOCK_CRASH_AFTER_MS".to_string(), "100".to_string());
    let id = bridge
        .start_server(mock_server_config_with_env("s3", "echo", RestartPolicy::Permanent, env))
        .await
        .expect("start_server should succeed");

    // Restart is scheduled with a 1s backoff once the crash (at ~100ms) is
    // observed; give it enough headroom.
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let status = bridge.get_status(id.clone()).await.unwrap();
    assert_eq!(status, ServerStatus::Running);

    let metrics = bridge.get_metrics(Some(id.clone())).await.unwrap();
    let (_, server_metrics) = metrics.into_iter().next().expect("metrics for restarted server");
    assert!(server_metrics.restarts_total >= 1);

    bridge.stop_server(id, StopOptions::force()).await.unwrap();
    bridge.shutdown().await;
}

/// S6: retry exhaustion lands an entry in the DLQ, and `dlq_retry` actually
/// replays the stored operation against the live server rather than just
/// bookkeeping the queue — a renewed failure proves the call went out again,
/// since it produces a distinct (fresh) DLQ entry.
#[tokio::test]
async fn dlq_retry_re_invokes_stored_operation() {
    let mut config = BridgeConfig::parse("").unwrap();
    config.resilience.pool_size = 2;
    config.resilience.max_retries = 0;
    let bridge = Bridge::new(&config).await;
    let id = bridge
        .start_server(mock_server_config("s6", "echo", RestartPolicy::Transient))
        .await
        .expect("start_server should succeed");

    let first = bridge
        .send_request(id.clone(), "tools/call", serde_json::json!({"name": "raise", "arguments": {}}))
        .await;
    assert!(first.is_err(), "the mock server's \"raise\" tool always errors");

    let entries = bridge.dlq_list_all().await;
    assert_eq!(entries.len(), 1);
    let dlq_id = entries[0].id.clone();

    let retried = bridge.dlq_retry(&dlq_id).await;
    assert!(retried.is_err(), "re-invoking \"raise\" fails again the same way");

    // The original entry is gone (dlq_retry removes it up front) and a fresh
    // one took its place from the renewed failure — proof the stored
    // operation was actually re-dispatched, not just relabeled.
    let after = bridge.dlq_list_all().await;
    assert_eq!(after.len(), 1);
    assert_ne!(after[0].id, dlq_id);

    bridge.stop_server(id, StopOptions::force()).await.unwrap();
    bridge.shutdown().await;
}
