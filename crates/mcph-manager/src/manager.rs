//! The Server Manager actor: single owner of the server table,
//! mutated only through its mailbox, processed strictly FIFO.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use mcph_core::{
    ids::RequestIdGenerator, BridgeError, HealthCheckType, HealthStatus, ServerConfig, ServerId,
    ServerMetrics, ServerProcess, ServerStatus,
};
use mcph_health::{HealthEvent, HealthMonitor, ProbeSources};
use mcph_pool::{ConnectionPool, PoolConfig};
use mcph_protocol::Message;
use mcph_resilience::{CircuitBreaker, CircuitBreakerConfig, DeadLetterQueue, RetryConfig};
use mcph_resource::{ResourceTracker, SweepReport};
use mcph_spawner::Spawner;
use mcph_transport::{Framing, StdioTransport, TransportEvent};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::command::{Command, ConfigPatch, ConnectionHandle, StopOptions};
use crate::dispatch::send_resilient_request;
use crate::entry::ManagedServer;
use crate::health_sources::{BasicSamplerHandle, StdioPingerHandle};
use crate::permit::PermitFactory;
use crate::restart::{should_restart, CrashReason};

pub struct ManagerDeps {
    pub spawner: Spawner,
    pub health_monitor: Arc<HealthMonitor>,
    pub health_events: mpsc::Receiver<HealthEvent>,
    pub tracker: Arc<ResourceTracker>,
    pub sweep_reports: mpsc::Receiver<SweepReport>,
    pub dlq: Arc<DeadLetterQueue>,
    pub retry_config: RetryConfig,
    pub breaker_config: CircuitBreakerConfig,
    pub pool_config: PoolConfig,
    pub framing: Framing,
}

/// Handle to the running Manager actor. Cloneable; every method is a
/// mailbox round trip.
#[derive(Clone)]
pub struct Manager {
    tx: mpsc::Sender<Command>,
}

impl Manager {
    pub fn spawn(deps: ManagerDeps) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(256);
        let actor = Actor {
            cmd_rx: rx,
            self_tx: tx.clone(),
            servers: HashMap::new(),
            deps,
        };
        let handle = tokio::spawn(actor.run());
        (Self { tx }, handle)
    }

    async fn call<T>(&self, build: impl FnOnce(oneshot::Sender<Result<T, BridgeError>>) -> Command) -> Result<T, BridgeError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(build(tx))
            .await
            .map_err(|_| BridgeError::Internal("manager actor is no longer running".into()))?;
        rx.await.map_err(|_| BridgeError::Internal("manager actor dropped the reply".into()))?
    }

    pub async fn start_server(&self, config: ServerConfig) -> Result<ServerId, BridgeError> {
        self.call(|reply| Command::StartServer { config, reply }).await
    }

    pub async fn stop_server(&self, id: ServerId, options: StopOptions) -> Result<(), BridgeError> {
        self.call(|reply| Command::StopServer { id, options, reply }).await
    }

    pub async fn restart_server(&self, id: ServerId) -> Result<(), BridgeError> {
        self.call(|reply| Command::RestartServer { id, reply }).await
    }

    pub async fn start_servers(&self, configs: Vec<ServerConfig>) -> Vec<Result<ServerId, BridgeError>> {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(Command::StartServers { configs, reply: tx }).await.is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    pub async fn stop_servers(&self, ids: Vec<ServerId>, options: StopOptions) -> Vec<Result<(), BridgeError>> {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(Command::StopServers { ids, options, reply: tx }).await.is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    pub async fn get_status(&self, id: ServerId) -> Result<ServerStatus, BridgeError> {
        self.call(|reply| Command::GetStatus { id, reply }).await
    }

    pub async fn get_health(&self, id: ServerId) -> Result<HealthStatus, BridgeError> {
        self.call(|reply| Command::GetHealth { id, reply }).await
    }

    pub async fn get_metrics(&self, id: Option<ServerId>) -> Result<Vec<(ServerId, ServerMetrics)>, BridgeError> {
        self.call(|reply| Command::GetMetrics { id, reply }).await
    }

    pub async fn update_config(&self, id: ServerId, patch: ConfigPatch) -> Result<(), BridgeError> {
        self.call(|reply| Command::UpdateConfig { id, patch, reply }).await
    }

    pub async fn get_connection(&self, id: ServerId) -> Result<ConnectionHandle, BridgeError> {
        self.call(|reply| Command::GetConnection { id, reply }).await
    }

    pub async fn send_request(&self, id: ServerId, method: impl Into<String>, params: Value) -> Result<Value, BridgeError> {
        self.call(|reply| Command::SendRequest {
            id,
            method: method.into(),
            params,
            reply,
        })
        .await
    }

    /// Graceful shutdown ordering, minus the router-timer step which the
    /// facade crate owns: stop each server, then health monitor, tracker,
    /// and flush the DLQ.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        let _ = self.tx.send(Command::Shutdown { reply: tx }).await;
        let _ = rx.await;
    }
}

struct Actor {
    cmd_rx: mpsc::Receiver<Command>,
    self_tx: mpsc::Sender<Command>,
    servers: HashMap<ServerId, ManagedServer>,
    deps: ManagerDeps,
}

impl Actor {
    async fn run(mut self) {
        let mut health_open = true;
        let mut sweep_open = true;
        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(Command::Shutdown { reply }) => {
                            self.shutdown_all().await;
                            let _ = reply.send(());
                            return;
                        }
                        Some(cmd) => self.handle_command(cmd).await,
                        None => return,
                    }
                }
                event = self.deps.health_events.recv(), if health_open => {
                    match event {
                        Some(event) => self.handle_health_event(event).await,
                        None => health_open = false,
                    }
                }
                report = self.deps.sweep_reports.recv(), if sweep_open => {
                    match report {
                        Some(report) => self.handle_sweep_report(report).await,
                        None => sweep_open = false,
                    }
                }
            }
        }
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::StartServer { config, reply } => {
                let _ = reply.send(self.start_server(config).await);
            }
            Command::StopServer { id, options, reply } => {
                let _ = reply.send(self.stop_server(id, options).await);
            }
            Command::RestartServer { id, reply } => {
                let _ = reply.send(self.restart_server(id).await);
            }
            Command::StartServers { configs, reply } => {
                let mut results = Vec::with_capacity(configs.len());
                for config in configs {
                    results.push(self.start_server(config).await);
                }
                let _ = reply.send(results);
            }
            Command::StopServers { ids, options, reply } => {
                let mut results = Vec::with_capacity(ids.len());
                for id in ids {
                    results.push(self.stop_server(id, options.clone()).await);
                }
                let _ = reply.send(results);
            }
            Command::GetStatus { id, reply } => {
                let result = self
                    .servers
                    .get(&id)
                    .map(|s| s.process.status)
                    .ok_or_else(|| BridgeError::not_found(&id));
                let _ = reply.send(result);
            }
            Command::GetHealth { id, reply } => {
                let result = self
                    .servers
                    .get(&id)
                    .map(|s| s.process.health)
                    .ok_or_else(|| BridgeError::not_found(&id));
                let _ = reply.send(result);
            }
            Command::GetMetrics { id, reply } => {
                let result = match id {
                    Some(id) => self
                        .servers
                        .get(&id)
                        .map(|s| vec![(id.clone(), s.process.metrics.clone())])
                        .ok_or_else(|| BridgeError::not_found(&id)),
                    None => Ok(self
                        .servers
                        .iter()
                        .map(|(id, s)| (id.clone(), s.process.metrics.clone()))
                        .collect()),
                };
                let _ = reply.send(result);
            }
            Command::UpdateConfig { id, patch, reply } => {
                let _ = reply.send(self.update_config(id, patch).await);
            }
            Command::GetConnection { id, reply } => {
                let result = if self.servers.contains_key(&id) {
                    Ok(ConnectionHandle { server_id: id })
                } else {
                    Err(BridgeError::not_found(&id))
                };
                let _ = reply.send(result);
            }
            Command::SendRequest { id, method, params, reply } => {
                let result = match self.servers.get(&id) {
                    Some(server) => {
                        send_resilient_request(server, &self.deps.retry_config, &self.deps.dlq, &method, params).await
                    }
                    None => Err(BridgeError::not_found(&id)),
                };
                if let Some(server) = self.servers.get_mut(&id) {
                    server.process.metrics.record_request(0, result.is_err());
                }
                let _ = reply.send(result);
            }
            Command::OnChildDown { id, reason, detail } => {
                self.on_child_down(id, reason, detail).await;
            }
            Command::OnHealthResult { id, status } => {
                self.on_health_result(id, status).await;
            }
            Command::Shutdown { .. } => unreachable!("handled in run()"),
        }
    }

    async fn start_server(&mut self, mut config: ServerConfig) -> Result<ServerId, BridgeError> {
        config.validate()?;
        if config.id.as_str().is_empty() {
            config.id = ServerId::generate();
        }
        let id = config.id.clone();
        if self.servers.contains_key(&id) {
            return Err(BridgeError::Configuration {
                server: id.to_string(),
                reason: "a server with this id is already registered".into(),
            });
        }

        let spawned = self.deps.spawner.spawn(&config).await?;
        let mut child = spawned.child;

        let stdin = child.stdin.take().ok_or_else(|| BridgeError::SpawnFailed {
            server: id.to_string(),
            source: std::io::Error::other("child has no piped stdin"),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| BridgeError::SpawnFailed {
            server: id.to_string(),
            source: std::io::Error::other("child has no piped stdout"),
        })?;
        let stderr = child.stderr.take();

        let (transport, events_rx) = StdioTransport::spawn(id.clone(), stdin, stdout, stderr, self.deps.framing);
        let transport = Arc::new(transport);
        let pending = Arc::new(Mutex::new(mcph_protocol::PendingTable::new()));
        let request_ids = Arc::new(RequestIdGenerator::new());
        let alive = Arc::new(AtomicBool::new(true));
        let expect_stop = Arc::new(AtomicBool::new(false));

        let reader_task = spawn_reader_task(
            id.clone(),
            events_rx,
            pending.clone(),
            alive.clone(),
            expect_stop.clone(),
            self.self_tx.clone(),
        );

        let pool = Arc::new(ConnectionPool::new(id.to_string(), self.deps.pool_config.clone(), Box::new(PermitFactory)));
        let breaker = Arc::new(CircuitBreaker::new(id.to_string(), self.deps.breaker_config.clone()));

        if let Some(hc) = config.health_check.clone() {
            let sources = match hc.check_type {
                HealthCheckType::Basic => ProbeSources {
                    basic_sampler: Some(Arc::new(BasicSamplerHandle {
                        alive: alive.clone(),
                        pending: pending.clone(),
                    })),
                    ..Default::default()
                },
                HealthCheckType::Stdio => ProbeSources {
                    stdio_pinger: Some(Arc::new(StdioPingerHandle {
                        server_id: id.clone(),
                        transport: transport.clone(),
                        pending: pending.clone(),
                        request_ids: request_ids.clone(),
                    })),
                    ..Default::default()
                },
                _ => ProbeSources::default(),
            };
            self.deps.health_monitor.register(id.clone(), hc.clone(), sources, hc.port).await;
        }
        self.deps.tracker.register(id.clone(), spawned.pid, config.memory_limit_mb).await;

        let mut process = ServerProcess::new(config);
        process.status = ServerStatus::Running;
        process.pid = Some(spawned.pid);
        process.started_at = Some(spawned.started_at);

        self.servers.insert(
            id.clone(),
            ManagedServer {
                process,
                child,
                transport,
                pending,
                request_ids,
                pool,
                breaker,
                alive,
                expect_stop,
                reader_task,
            },
        );

        Ok(id)
    }

    async fn stop_server(&mut self, id: ServerId, options: StopOptions) -> Result<(), BridgeError> {
        let mut server = self.servers.remove(&id).ok_or_else(|| BridgeError::not_found(&id))?;
        server.expect_stop.store(true, Ordering::SeqCst);
        self.deps.health_monitor.unregister(&id).await;
        self.deps.tracker.unregister(&id).await;
        server.pool.stop().await;

        if options.graceful {
            let notice = mcph_protocol::build_notification(mcph_protocol::methods::NOTIFICATION_CANCELLED, Value::Null)
                .expect("non-empty method literal");
            let _ = server.transport.write_message(&Message::Notification(notice)).await;
            if tokio::time::timeout(options.timeout, server.child.wait()).await.is_err() {
                let _ = server.child.kill().await;
            }
        } else {
            let _ = server.child.kill().await;
        }

        server.reader_task.abort();
        let drained = server.pending.lock().await.drain_all();
        for pending in drained {
            let _ = pending.sender.send(Err(BridgeError::Transport {
                server: id.to_string(),
                reason: "connection_error: server stopped".into(),
            }));
        }
        Ok(())
    }

    async fn restart_server(&mut self, id: ServerId) -> Result<(), BridgeError> {
        let config = self
            .servers
            .get(&id)
            .map(|s| s.process.config.clone())
            .ok_or_else(|| BridgeError::not_found(&id))?;
        self.stop_server(id.clone(), StopOptions::graceful(Duration::from_secs(5))).await?;
        let new_id = self.start_server(config).await?;
        if let Some(server) = self.servers.get_mut(&new_id) {
            server.process.record_restart_attempt(Utc::now());
        }
        Ok(())
    }

    async fn update_config(&mut self, id: ServerId, patch: ConfigPatch) -> Result<(), BridgeError> {
        let mut config = self
            .servers
            .get(&id)
            .map(|s| s.process.config.clone())
            .ok_or_else(|| BridgeError::not_found(&id))?;

        let mut needs_restart = false;
        if let Some(rp) = patch.restart_policy {
            config.restart_policy = rp;
        }
        if let Some(mem) = patch.memory_limit_mb {
            config.memory_limit_mb = mem;
            needs_restart = true;
        }
        if let Some(env) = patch.env {
            config.env = env;
            needs_restart = true;
        }
        config.validate()?;

        if patch.restart_on_update && needs_restart {
            self.stop_server(id.clone(), StopOptions::graceful(Duration::from_secs(5))).await?;
            self.start_server(config).await?;
        } else if let Some(server) = self.servers.get_mut(&id) {
            server.process.config = config;
        }
        Ok(())
    }

    async fn on_child_down(&mut self, id: ServerId, reason: CrashReason, detail: String) {
        let Some(mut server) = self.servers.remove(&id) else {
            return;
        };
        self.deps.health_monitor.unregister(&id).await;
        self.deps.tracker.unregister(&id).await;
        server.pool.stop().await;
        server.reader_task.abort();

        let drained = server.pending.lock().await.drain_all();
        for pending in drained {
            let _ = pending.sender.send(Err(BridgeError::Crashed {
                server: id.to_string(),
                reason: detail.clone(),
            }));
        }

        server.process.status = ServerStatus::Crashed;
        let policy = server.process.config.restart_policy;
        let now = Utc::now();

        if reason == CrashReason::Crash && should_restart(policy, reason) && server.process.restart_budget_available(now) {
            let delay = server.restart_backoff();
            let config = server.process.config.clone();
            let self_tx = self.self_tx.clone();
            tracing::warn!(server = %id, delay_ms = delay.as_millis() as u64, %detail, "server_crashed_scheduling_restart");
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let (tx, _rx) = oneshot::channel();
                let _ = self_tx.send(Command::StartServer { config, reply: tx }).await;
            });
        } else {
            server.process.status = ServerStatus::Stopped;
            tracing::info!(server = %id, %detail, "server_down_no_restart");
        }
    }

    async fn on_health_result(&mut self, id: ServerId, status: HealthStatus) {
        let Some(server) = self.servers.get_mut(&id) else {
            return;
        };
        server.process.health = status;

        // The monitor already applies `failure_threshold` before ever
        // reporting `Unhealthy` (consecutive failures below threshold are
        // reported as `Degraded`), so a single `Unhealthy` report here is
        // already confirmed — no need to recount.
        if matches!(status, HealthStatus::Unhealthy) && should_restart(server.process.config.restart_policy, CrashReason::Crash) {
            tracing::warn!(server = %id, "implicit_restart_from_health_monitor");
            let self_tx = self.self_tx.clone();
            tokio::spawn(async move {
                let (tx, _rx) = oneshot::channel();
                let _ = self_tx.send(Command::RestartServer { id, reply: tx }).await;
            });
        }
    }

    async fn handle_health_event(&mut self, event: HealthEvent) {
        self.on_health_result(event.server_id, event.status).await;
    }

    async fn handle_sweep_report(&mut self, report: SweepReport) {
        for id in report.reaped {
            if self.servers.contains_key(&id) {
                self.on_child_down(id, CrashReason::Crash, "process no longer exists".to_string()).await;
            }
        }
        for violation in report.violations {
            tracing::warn!(
                server = %violation.server_id,
                observed_mb = violation.observed_mb,
                limit_mb = violation.limit_mb,
                "resource_limit_exceeded"
            );
        }
    }

    /// Router timers are the facade's responsibility; this stops each
    /// server, then the health monitor, tracker, and flushes the DLQ.
    async fn shutdown_all(&mut self) {
        let ids: Vec<ServerId> = self.servers.keys().cloned().collect();
        for id in ids {
            let _ = self.stop_server(id, StopOptions::graceful(Duration::from_secs(5))).await;
        }
        self.deps.health_monitor.stop_all().await;
        if let Err(e) = self.deps.dlq.persist().await {
            tracing::warn!(error = %e, "dlq_final_persist_failed");
        }
    }
}

fn spawn_reader_task(
    id: ServerId,
    mut events_rx: mpsc::Receiver<TransportEvent>,
    pending: Arc<Mutex<mcph_protocol::PendingTable<crate::entry::PendingReply>>>,
    alive: Arc<AtomicBool>,
    expect_stop: Arc<AtomicBool>,
    self_tx: mpsc::Sender<Command>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            match event {
                TransportEvent::Message(mcph_protocol::ParsedMessage::Response(resp)) => {
                    let mut table = pending.lock().await;
                    if let Ok(p) = table.correlate(&resp) {
                        let result = match &resp.error {
                            Some(err) => Err(BridgeError::Protocol {
                                code: err.code,
                                message: err.message.clone(),
                            }),
                            None => Ok(resp.result.clone().unwrap_or(Value::Null)),
                        };
                        let _ = p.sender.send(result);
                    }
                }
                TransportEvent::Message(_) => {}
                TransportEvent::ProtocolError(err) => {
                    tracing::warn!(server = %id, %err, "transport_protocol_error");
                }
                TransportEvent::Disconnected { reason } => {
                    alive.store(false, Ordering::SeqCst);
                    let crash_reason = if expect_stop.load(Ordering::SeqCst) {
                        CrashReason::Normal
                    } else {
                        CrashReason::Crash
                    };
                    let _ = self_tx
                        .send(Command::OnChildDown {
                            id: id.clone(),
                            reason: crash_reason,
                            detail: reason,
                        })
                        .await;
                    return;
                }
            }
        }
    })
}
