//! The facade external callers use: wires the spawner, transport, pool,
//! resilience, health, resource, and router crates into one running
//! bridge instance, and exposes the operations spec'd for the Manager and
//! router behind a single type.

use std::sync::Arc;

use mcph_core::{BridgeError, HealthStatus, ServerConfig, ServerId, ServerMetrics, ServerStatus};
use mcph_health::HealthMonitor;
use mcph_manager::{ConfigPatch, Manager, ManagerDeps, StopOptions};
use mcph_resilience::{DeadLetterQueue, DlqEntry, DlqStats};
use mcph_resource::{ResourceGuard, ResourceTracker};
use mcph_router::CapabilityRouter;
use mcph_spawner::{Spawner, SpawnerConfig};
use mcph_transport::Framing;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::caller::ManagerCaller;
use crate::config::BridgeConfig;

pub struct Bridge {
    manager: Manager,
    router: Arc<CapabilityRouter>,
    caller: Arc<ManagerCaller>,
    dlq: Arc<DeadLetterQueue>,
    manager_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Bridge {
    /// Builds every subsystem from `config`, starts the Manager actor, and
    /// registers the declarative tool-mapping table. Does not start any of
    /// `config.servers` itself; call `start_configured_servers` for that, or
    /// `start_server` one at a time.
    pub async fn new(config: &BridgeConfig) -> Self {
        let resource_guard = Arc::new(ResourceGuard::new(config.resource_guard_config()));
        let spawner = Spawner::new(
            SpawnerConfig {
                install_root: config.install_root(),
            },
            resource_guard,
        );

        let (health_monitor, health_events) = HealthMonitor::new();
        let tracker = Arc::new(ResourceTracker::new());
        let sweep_reports = tracker.clone().spawn_sweep_task(config.resource_sweep_interval());
        let dlq = Arc::new(DeadLetterQueue::new(config.dlq_config()));

        let deps = ManagerDeps {
            spawner,
            health_monitor,
            health_events,
            tracker,
            sweep_reports,
            dlq: dlq.clone(),
            retry_config: config.retry_config(),
            breaker_config: config.breaker_config(),
            pool_config: config.pool_config(),
            framing: Framing::Newline,
        };
        let (manager, manager_handle) = Manager::spawn(deps);

        let router = Arc::new(CapabilityRouter::new());
        for mapping in &config.tool_mappings {
            router
                .register_tool_mapping(mapping.capability.clone(), mapping.task_type.clone(), mapping.tool_name.clone())
                .await;
        }

        let caller = Arc::new(ManagerCaller::new(manager.clone()));

        Self {
            manager,
            router,
            caller,
            dlq,
            manager_handle: Mutex::new(Some(manager_handle)),
        }
    }

    /// Starts one server and runs discovery (`initialize` + `tools/list`)
    /// against it, registering its capability in the router.
    pub async fn start_server(&self, config: ServerConfig) -> Result<ServerId, BridgeError> {
        let capability = config.capability.clone();
        let id = self.manager.start_server(config).await?;
        self.router.discover(&id, &[capability], self.caller.as_ref()).await?;
        Ok(id)
    }

    /// Starts every server in `configs`, continuing past individual
    /// failures; the returned vector lines up with `configs` by index.
    pub async fn start_configured_servers(&self, configs: Vec<ServerConfig>) -> Vec<Result<ServerId, BridgeError>> {
        let mut results = Vec::with_capacity(configs.len());
        for config in configs {
            results.push(self.start_server(config).await);
        }
        results
    }

    pub async fn stop_server(&self, id: ServerId, options: StopOptions) -> Result<(), BridgeError> {
        self.router.remove_server(&id).await;
        self.manager.stop_server(id, options).await
    }

    pub async fn restart_server(&self, id: ServerId) -> Result<(), BridgeError> {
        self.manager.restart_server(id).await
    }

    pub async fn update_config(&self, id: ServerId, patch: ConfigPatch) -> Result<(), BridgeError> {
        self.manager.update_config(id, patch).await
    }

    pub async fn get_status(&self, id: ServerId) -> Result<ServerStatus, BridgeError> {
        self.manager.get_status(id).await
    }

    pub async fn get_health(&self, id: ServerId) -> Result<HealthStatus, BridgeError> {
        self.manager.get_health(id).await
    }

    pub async fn get_metrics(&self, id: Option<ServerId>) -> Result<Vec<(ServerId, ServerMetrics)>, BridgeError> {
        self.manager.get_metrics(id).await
    }

    pub async fn get_connection(&self, id: ServerId) -> Result<mcph_manager::ConnectionHandle, BridgeError> {
        self.manager.get_connection(id).await
    }

    /// Routes `(capability, task_type)` to the tool-mapping table, then
    /// dispatches a `tools/call` through the resilient request path.
    pub async fn execute_task(&self, capability: &str, task_type: &str, params: Value) -> Result<Value, BridgeError> {
        self.router.execute_task(capability, task_type, params, self.caller.as_ref()).await
    }

    /// Bypasses the router and sends an arbitrary JSON-RPC method directly
    /// to a known server, still through the resilient path.
    pub async fn send_request(&self, id: ServerId, method: impl Into<String>, params: Value) -> Result<Value, BridgeError> {
        self.manager.send_request(id, method, params).await
    }

    pub fn router(&self) -> &Arc<CapabilityRouter> {
        &self.router
    }

    pub async fn dlq_list_all(&self) -> Vec<DlqEntry> {
        self.dlq.list_all().await
    }

    pub async fn dlq_list_by_error(&self, error_type: &str) -> Vec<DlqEntry> {
        self.dlq.list_by_error(error_type).await
    }

    pub async fn dlq_remove(&self, dlq_id: &str) -> Option<DlqEntry> {
        self.dlq.remove(dlq_id).await
    }

    pub async fn dlq_clear(&self) {
        self.dlq.clear().await
    }

    pub async fn dlq_stats(&self) -> DlqStats {
        self.dlq.stats().await
    }

    /// Re-invokes the stored operation for a dead-lettered entry against its
    /// original server, through the same resilient send path every other
    /// request uses. The entry is removed from the queue first; a renewed
    /// failure lands it back in the DLQ as a fresh entry, same as first-time
    /// exhaustion does.
    pub async fn dlq_retry(&self, dlq_id: &str) -> Result<Value, BridgeError> {
        let entry = self
            .dlq
            .retry(dlq_id)
            .await
            .ok_or_else(|| BridgeError::NotFound(format!("dlq entry {dlq_id}")))?;
        self.manager
            .send_request(
                ServerId::from(entry.payload.server_id.as_str()),
                entry.payload.method,
                entry.payload.params,
            )
            .await
    }

    /// Stops every server gracefully, flushes the DLQ, then waits for the
    /// Manager actor to exit. Safe to call more than once.
    pub async fn shutdown(&self) {
        self.manager.shutdown().await;
        if let Some(handle) = self.manager_handle.lock().await.take() {
            let _ = handle.await;
        }
    }
}
