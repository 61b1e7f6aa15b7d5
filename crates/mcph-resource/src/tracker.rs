//! Resource Tracker: per-process memory accounting and zombie
//! reaping. Holds only weak references (id + pid) — it reports to the
//! Manager, it never decides lifecycle itself.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use mcph_core::ServerId;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tokio::sync::{mpsc, Mutex};
use tracing::info;

#[derive(Debug, Clone)]
struct TrackedProcess {
    pid: u32,
    memory_limit_mb: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ResourceViolation {
    pub server_id: ServerId,
    pub observed_mb: u64,
    pub limit_mb: u64,
}

#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    /// Servers whose process no longer exists; the Manager decides whether
    /// this is an expected stop or a crash.
    pub reaped: Vec<ServerId>,
    pub violations: Vec<ResourceViolation>,
}

pub struct ResourceTracker {
    sys: Mutex<System>,
    tracked: Mutex<HashMap<ServerId, TrackedProcess>>,
}

impl Default for ResourceTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceTracker {
    pub fn new() -> Self {
        Self {
            sys: Mutex::new(System::new()),
            tracked: Mutex::new(HashMap::new()),
        }
    }

    pub async fn register(&self, server_id: ServerId, pid: u32, memory_limit_mb: Option<u64>) {
        self.tracked.lock().await.insert(
            server_id,
            TrackedProcess {
                pid,
                memory_limit_mb,
            },
        );
    }

    pub async fn unregister(&self, server_id: &ServerId) {
        self.tracked.lock().await.remove(server_id);
    }

    pub async fn tracked_count(&self) -> usize {
        self.tracked.lock().await.len()
    }

    /// One sweep: sample memory for every tracked pid, report any
    /// `memory_limit_mb` overshoot, and reap entries whose process is gone.
    pub async fn sweep(&self) -> SweepReport {
        let snapshot: Vec<(ServerId, TrackedProcess)> = self
            .tracked
            .lock()
            .await
            .iter()
            .map(|(id, p)| (id.clone(), p.clone()))
            .collect();

        let pids: Vec<Pid> = snapshot.iter().map(|(_, p)| Pid::from_u32(p.pid)).collect();
        let mut sys = self.sys.lock().await;
        sys.refresh_processes(ProcessesToUpdate::Some(&pids), true);

        let mut report = SweepReport::default();
        let mut dead = Vec::new();

        for (id, proc) in &snapshot {
            match sys.process(Pid::from_u32(proc.pid)) {
                Some(process) => {
                    let mem_mb = process.memory() / 1024 / 1024;
                    if let Some(limit) = proc.memory_limit_mb {
                        if mem_mb > limit {
                            report.violations.push(ResourceViolation {
                                server_id: id.clone(),
                                observed_mb: mem_mb,
                                limit_mb: limit,
                            });
                        }
                    }
                }
                None => dead.push(id.clone()),
            }
        }
        drop(sys);

        if !dead.is_empty() {
            let mut tracked = self.tracked.lock().await;
            for id in &dead {
                tracked.remove(id);
            }
        }
        report.reaped = dead;
        report
    }

    /// Spawn a background task running `sweep` on `interval`, forwarding
    /// non-empty reports to the returned channel.
    pub fn spawn_sweep_task(self: Arc<Self>, interval: Duration) -> mpsc::Receiver<SweepReport> {
        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let report = self.sweep().await;
                if !report.reaped.is_empty() || !report.violations.is_empty() {
                    info!(
                        reaped = report.reaped.len(),
                        violations = report.violations.len(),
                        "resource_tracker_sweep"
                    );
                    if tx.send(report).await.is_err() {
                        break;
                    }
                }
            }
        });
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sweep_reaps_nonexistent_pid() {
        let tracker = ResourceTracker::new();
        tracker
            .register(ServerId::from("demo"), u32::MAX - 1, None)
            .await;
        let report = tracker.sweep().await;
        assert_eq!(report.reaped, vec![ServerId::from("demo")]);
        assert_eq!(tracker.tracked_count().await, 0);
    }

    #[tokio::test]
    async fn register_and_unregister_round_trip() {
        let tracker = ResourceTracker::new();
        let id = ServerId::from("demo");
        tracker.register(id.clone(), std::process::id(), None).await;
        assert_eq!(tracker.tracked_count().await, 1);
        tracker.unregister(&id).await;
        assert_eq!(tracker.tracked_count().await, 0);
    }

    #[tokio::test]
    async fn sweep_flags_memory_limit_violation() {
        let tracker = ResourceTracker::new();
        let id = ServerId::from("self");
        // own pid is always alive during the test and reports nonzero RSS;
        // a limit of 0 MB guarantees a violation without depending on the
        // exact memory figure.
        tracker.register(id.clone(), std::process::id(), Some(0)).await;
        let report = tracker.sweep().await;
        assert!(report.violations.iter().any(|v| v.server_id == id));
    }
}
