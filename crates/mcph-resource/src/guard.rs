//! Pre-spawn resource check: the spawner consults this before creating a
//! child, and refuses under memory pressure instead of spawning into an
//! OOM. Combined physical+swap accounting.

use std::collections::HashMap;

use mcph_core::BridgeError;
use sysinfo::System;
use tokio::sync::Mutex;

use crate::stats::UsageStats;

#[derive(Debug, Clone)]
pub struct ResourceGuardConfig {
    /// Minimum combined physical+swap free memory to preserve, in MB.
    pub min_free_memory_mb: u64,
    pub initial_estimates: HashMap<String, u64>,
    /// Used when neither history nor an initial estimate exists.
    pub default_estimate_mb: u64,
}

impl Default for ResourceGuardConfig {
    fn default() -> Self {
        Self {
            min_free_memory_mb: 512,
            initial_estimates: HashMap::new(),
            default_estimate_mb: 256,
        }
    }
}

pub struct ResourceGuard {
    config: ResourceGuardConfig,
    sys: Mutex<System>,
    stats: Mutex<UsageStats>,
}

impl ResourceGuard {
    pub fn new(config: ResourceGuardConfig) -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        Self {
            config,
            sys: Mutex::new(sys),
            stats: Mutex::new(UsageStats::default()),
        }
    }

    /// Refuses with `InsufficientResources` if the combined free memory
    /// would drop below `min_free_memory_mb` after accounting for the
    /// capability's estimated footprint.
    pub async fn check_availability(&self, capability: &str) -> Result<(), BridgeError> {
        let mut sys = self.sys.lock().await;
        sys.refresh_memory();
        let available_phys_mb = sys.available_memory() / 1024 / 1024;
        let available_swap_mb = sys.free_swap() / 1024 / 1024;
        let available_total_mb = available_phys_mb.saturating_add(available_swap_mb);
        drop(sys);

        let stats = self.stats.lock().await;
        let estimated_mb = stats.p95_estimate(capability).unwrap_or_else(|| {
            *self
                .config
                .initial_estimates
                .get(capability)
                .unwrap_or(&self.config.default_estimate_mb)
        });
        drop(stats);

        let required_mb = self.config.min_free_memory_mb.saturating_add(estimated_mb);
        if available_total_mb < required_mb {
            return Err(BridgeError::InsufficientResources {
                server: capability.to_string(),
                detail: format!(
                    "available {available_total_mb} MB (phys+swap) < required {required_mb} MB (min buffer {} + estimate {estimated_mb})",
                    self.config.min_free_memory_mb
                ),
            });
        }
        Ok(())
    }

    pub async fn record_usage(&self, capability: &str, peak_mb: u64) {
        self.stats.lock().await.record(capability, peak_mb);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn permissive_limits_pass() {
        let guard = ResourceGuard::new(ResourceGuardConfig {
            min_free_memory_mb: 1,
            initial_estimates: HashMap::from([("echo".to_string(), 1)]),
            default_estimate_mb: 1,
        });
        assert!(guard.check_availability("echo").await.is_ok());
    }

    #[tokio::test]
    async fn impossible_limits_fail() {
        let guard = ResourceGuard::new(ResourceGuardConfig {
            min_free_memory_mb: u64::MAX / 2,
            initial_estimates: HashMap::new(),
            default_estimate_mb: 1,
        });
        let err = guard.check_availability("echo").await.unwrap_err();
        assert!(matches!(err, BridgeError::InsufficientResources { .. }));
    }

    #[tokio::test]
    async fn recorded_usage_feeds_future_estimate() {
        let guard = ResourceGuard::new(ResourceGuardConfig {
            min_free_memory_mb: 1,
            initial_estimates: HashMap::new(),
            default_estimate_mb: 1,
        });
        guard.record_usage("echo", u64::MAX / 4).await;
        let err = guard.check_availability("echo").await.unwrap_err();
        assert!(matches!(err, BridgeError::InsufficientResources { .. }));
    }
}
