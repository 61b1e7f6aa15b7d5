//! Scheduled per-server health checks. One task per
//! registration; results are posted to the Manager and never acted on here.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use mcph_core::{HealthCheckConfig, HealthCheckType, HealthStatus, ServerId};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::probe::{classify_basic, probe_tcp, probe_websocket, BasicSampler, CustomProbe, StdioPinger};

#[derive(Debug, Clone)]
pub struct HealthEvent {
    pub server_id: ServerId,
    pub status: HealthStatus,
    pub detail: Option<String>,
}

/// Caller-supplied probe sources for one server. Only the field matching
/// `config.check_type` needs to be populated.
#[derive(Default, Clone)]
pub struct ProbeSources {
    pub basic_sampler: Option<Arc<dyn BasicSampler>>,
    pub stdio_pinger: Option<Arc<dyn StdioPinger>>,
    pub custom_probe: Option<Arc<dyn CustomProbe>>,
}

pub struct HealthMonitor {
    tasks: Mutex<HashMap<ServerId, JoinHandle<()>>>,
    events_tx: mpsc::Sender<HealthEvent>,
}

impl HealthMonitor {
    pub fn new() -> (Arc<Self>, mpsc::Receiver<HealthEvent>) {
        let (events_tx, events_rx) = mpsc::channel(256);
        (
            Arc::new(Self {
                tasks: Mutex::new(HashMap::new()),
                events_tx,
            }),
            events_rx,
        )
    }

    pub async fn register(
        &self,
        server_id: ServerId,
        config: HealthCheckConfig,
        sources: ProbeSources,
        port: Option<u16>,
    ) {
        let tx = self.events_tx.clone();
        let id_for_task = server_id.clone();
        let handle = tokio::spawn(run_checks(id_for_task, config, sources, port, tx));

        let mut tasks = self.tasks.lock().await;
        if let Some(old) = tasks.insert(server_id, handle) {
            old.abort();
        }
    }

    pub async fn unregister(&self, server_id: &ServerId) {
        if let Some(handle) = self.tasks.lock().await.remove(server_id) {
            handle.abort();
        }
    }

    pub async fn registered_count(&self) -> usize {
        self.tasks.lock().await.len()
    }

    /// Stops every scheduled check; called during bridge shutdown.
    pub async fn stop_all(&self) {
        let mut tasks = self.tasks.lock().await;
        for (_, handle) in tasks.drain() {
            handle.abort();
        }
    }
}

async fn run_checks(
    server_id: ServerId,
    config: HealthCheckConfig,
    sources: ProbeSources,
    port: Option<u16>,
    tx: mpsc::Sender<HealthEvent>,
) {
    let mut ticker = tokio::time::interval(config.interval);
    let mut consecutive_failures: u32 = 0;

    loop {
        ticker.tick().await;
        let (status, detail) = run_one_check(&config, &sources, port).await;

        if matches!(status, HealthStatus::Unhealthy) {
            consecutive_failures = consecutive_failures.saturating_add(1);
        } else {
            consecutive_failures = 0;
        }

        let reported = if consecutive_failures >= config.failure_threshold && matches!(status, HealthStatus::Unhealthy) {
            HealthStatus::Unhealthy
        } else if matches!(status, HealthStatus::Unhealthy) {
            // Below threshold: don't escalate to unhealthy yet.
            HealthStatus::Degraded
        } else {
            status
        };

        info!(server = %server_id, status = ?reported, "health_check_completed");
        if tx
            .send(HealthEvent {
                server_id: server_id.clone(),
                status: reported,
                detail,
            })
            .await
            .is_err()
        {
            return;
        }
    }
}

async fn run_one_check(
    config: &HealthCheckConfig,
    sources: &ProbeSources,
    port: Option<u16>,
) -> (HealthStatus, Option<String>) {
    match config.check_type {
        HealthCheckType::Basic => match &sources.basic_sampler {
            Some(sampler) => {
                let sample = sampler.sample().await;
                (classify_basic(sample), None)
            }
            None => (HealthStatus::Unknown, Some("no basic sampler registered".into())),
        },
        HealthCheckType::Stdio => match &sources.stdio_pinger {
            Some(pinger) => match pinger.ping(config.timeout).await {
                Ok(()) => (HealthStatus::Healthy, None),
                Err(e) => (HealthStatus::Unhealthy, Some(e.to_string())),
            },
            None => (HealthStatus::Unknown, Some("no stdio pinger registered".into())),
        },
        HealthCheckType::Tcp => match port {
            Some(p) => (probe_tcp(p, config.timeout).await, None),
            None => (HealthStatus::Unknown, Some("no port configured".into())),
        },
        HealthCheckType::Websocket => match port {
            Some(p) => (probe_websocket(p, config.timeout).await, None),
            None => (HealthStatus::Unknown, Some("no port configured".into())),
        },
        HealthCheckType::Custom => match &sources.custom_probe {
            Some(probe) => match probe.check().await {
                Ok(status) => (status, None),
                Err(e) => {
                    warn!(error = %e, "custom_health_probe_failed");
                    (HealthStatus::Unhealthy, Some(e.to_string()))
                }
            },
            None => (HealthStatus::Unknown, Some("no custom probe registered".into())),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::BasicSample;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct AlwaysAlive;
    #[async_trait]
    impl BasicSampler for AlwaysAlive {
        async fn sample(&self) -> BasicSample {
            BasicSample {
                alive: true,
                queue_length: 0,
                memory_mb: 1,
            }
        }
    }

    struct FlakyPinger {
        fail: AtomicBool,
    }
    #[async_trait]
    impl StdioPinger for FlakyPinger {
        async fn ping(&self, _timeout: Duration) -> Result<(), mcph_core::BridgeError> {
            if self.fail.load(Ordering::SeqCst) {
                Err(mcph_core::BridgeError::Timeout { elapsed_ms: 50 })
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn basic_check_reports_healthy() {
        let mut config = HealthCheckConfig::default();
        config.interval = Duration::from_millis(10);
        let sources = ProbeSources {
            basic_sampler: Some(Arc::new(AlwaysAlive)),
            ..Default::default()
        };
        let (status, _) = run_one_check(&config, &sources, None).await;
        assert_eq!(status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn stdio_check_reports_unhealthy_on_failed_ping() {
        let config = HealthCheckConfig {
            check_type: HealthCheckType::Stdio,
            ..Default::default()
        };
        let sources = ProbeSources {
            stdio_pinger: Some(Arc::new(FlakyPinger {
                fail: AtomicBool::new(true),
            })),
            ..Default::default()
        };
        let (status, _) = run_one_check(&config, &sources, None).await;
        assert_eq!(status, HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn unregistered_server_produces_no_panic() {
        let (monitor, _rx) = HealthMonitor::new();
        monitor.unregister(&ServerId::from("nonexistent")).await;
        assert_eq!(monitor.registered_count().await, 0);
    }

    #[tokio::test]
    async fn register_then_unregister_tracks_count() {
        let (monitor, _rx) = HealthMonitor::new();
        let id = ServerId::from("demo");
        let config = HealthCheckConfig {
            interval: Duration::from_secs(30),
            ..Default::default()
        };
        monitor
            .register(id.clone(), config, ProbeSources::default(), None)
            .await;
        assert_eq!(monitor.registered_count().await, 1);
        monitor.unregister(&id).await;
        assert_eq!(monitor.registered_count().await, 0);
    }

    #[tokio::test]
    async fn events_flow_after_interval_elapses() {
        let (monitor, mut rx) = HealthMonitor::new();
        let id = ServerId::from("demo-events");
        let config = HealthCheckConfig {
            interval: Duration::from_millis(5),
            ..Default::default()
        };
        let sources = ProbeSources {
            basic_sampler: Some(Arc::new(AlwaysAlive)),
            ..Default::default()
        };
        monitor.register(id.clone(), config, sources, None).await;
        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("event should arrive")
            .expect("channel should be open");
        assert_eq!(event.server_id, id);
        assert_eq!(event.status, HealthStatus::Healthy);
    }
}
