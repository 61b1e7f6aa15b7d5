//! Runtime state for a supervised server: lifecycle status, health, metrics,
//! and the `ServerProcess` record the Manager's table holds per entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ServerConfig;
use crate::ids::ServerId;

/// Lifecycle state of a supervised server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerStatus {
    Starting,
    Running,
    Stopping,
    Stopped,
    Crashed,
}

/// Health-check-derived status, reported by the Health Monitor and read by
/// the Manager; distinct from `ServerStatus`, which is lifecycle-owned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    /// No health check has completed yet.
    Unknown,
}

/// Rolling metrics tracked per server. Latency percentile uses the same
/// fixed-window-sample approach as the resource tracker's usage stats:
/// last 20 observations, sorted on read.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerMetrics {
    pub requests_total: u64,
    pub requests_failed: u64,
    pub restarts_total: u32,
    pub last_restart_at: Option<DateTime<Utc>>,
    pub peak_rss_mb: Option<u64>,
    latency_samples_ms: Vec<u64>,
}

const LATENCY_SAMPLE_WINDOW: usize = 20;

impl ServerMetrics {
    pub fn record_request(&mut self, latency_ms: u64, failed: bool) {
        self.requests_total += 1;
        if failed {
            self.requests_failed += 1;
        }
        self.latency_samples_ms.push(latency_ms);
        if self.latency_samples_ms.len() > LATENCY_SAMPLE_WINDOW {
            self.latency_samples_ms.remove(0);
        }
    }

    pub fn record_restart(&mut self, at: DateTime<Utc>) {
        self.restarts_total += 1;
        self.last_restart_at = Some(at);
    }

    /// P95 latency over the current sample window, or `None` if empty.
    pub fn p95_latency_ms(&self) -> Option<u64> {
        if self.latency_samples_ms.is_empty() {
            return None;
        }
        let mut sorted = self.latency_samples_ms.clone();
        sorted.sort_unstable();
        let idx = ((sorted.len() as f64) * 0.95).ceil() as usize;
        let idx = idx.saturating_sub(1).min(sorted.len() - 1);
        Some(sorted[idx])
    }

    pub fn failure_rate(&self) -> f64 {
        if self.requests_total == 0 {
            return 0.0;
        }
        self.requests_failed as f64 / self.requests_total as f64
    }
}

/// One entry in the Manager's server table: the static config plus all
/// runtime-mutable state the Manager owns behind its single mailbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerProcess {
    pub config: ServerConfig,
    pub status: ServerStatus,
    pub health: HealthStatus,
    pub pid: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
    pub metrics: ServerMetrics,
    /// Timestamps of restarts within the trailing `restart_window`, used to
    /// enforce `max_restarts_within_window`.
    pub recent_restarts: Vec<DateTime<Utc>>,
}

impl ServerProcess {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            status: ServerStatus::Starting,
            health: HealthStatus::Unknown,
            pid: None,
            started_at: None,
            metrics: ServerMetrics::default(),
            recent_restarts: Vec::new(),
        }
    }

    pub fn id(&self) -> &ServerId {
        &self.config.id
    }

    /// Whether another automatic restart is allowed right now, i.e. fewer
    /// than `max_restarts_within_window` restarts fall inside the trailing
    /// window as of `now`.
    pub fn restart_budget_available(&self, now: DateTime<Utc>) -> bool {
        let window_start = now - self.config.restart_window;
        let count = self
            .recent_restarts
            .iter()
            .filter(|t| **t >= window_start)
            .count();
        (count as u32) < self.config.max_restarts_within_window
    }

    pub fn record_restart_attempt(&mut self, now: DateTime<Utc>) {
        self.recent_restarts.push(now);
        self.metrics.record_restart(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RestartPolicy, ServerType};
    use std::collections::HashMap;
    use std::time::Duration;

    fn config() -> ServerConfig {
        ServerConfig {
            id: ServerId::generate(),
            name: "echo".into(),
            capability: "echo.text".into(),
            server_type: ServerType::External {
                command: "npx".into(),
                args: vec![],
                package: None,
            },
            restart_policy: RestartPolicy::Permanent,
            health_check: None,
            env: HashMap::new(),
            working_dir: None,
            memory_limit_mb: None,
            max_restarts_within_window: 2,
            restart_window: Duration::from_secs(60),
        }
    }

    #[test]
    fn p95_latency_empty_is_none() {
        let metrics = ServerMetrics::default();
        assert_eq!(metrics.p95_latency_ms(), None);
    }

    #[test]
    fn p95_latency_picks_high_tail() {
        let mut metrics = ServerMetrics::default();
        for ms in [10, 20, 30, 40, 1000] {
            metrics.record_request(ms, false);
        }
        assert_eq!(metrics.p95_latency_ms(), Some(1000));
    }

    #[test]
    fn failure_rate_tracks_ratio() {
        let mut metrics = ServerMetrics::default();
        metrics.record_request(5, false);
        metrics.record_request(5, true);
        assert_eq!(metrics.failure_rate(), 0.5);
    }

    #[test]
    fn restart_budget_respects_window() {
        let mut proc = ServerProcess::new(config());
        let now = Utc::now();
        assert!(proc.restart_budget_available(now));
        proc.record_restart_attempt(now);
        proc.record_restart_attempt(now);
        assert!(!proc.restart_budget_available(now));
    }

    #[test]
    fn restart_budget_ignores_old_entries() {
        let mut proc = ServerProcess::new(config());
        let old = Utc::now() - chrono::Duration::seconds(120);
        proc.record_restart_attempt(old);
        proc.record_restart_attempt(old);
        assert!(proc.restart_budget_available(Utc::now()));
    }
}
