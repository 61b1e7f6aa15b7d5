//! Loads a `BridgeConfig` from TOML, translating the wire-friendly shapes
//! on disk into the runtime config types each subsystem crate expects.
//! Defaults are baked in via `#[serde(default)]`, overridden by whatever
//! the file supplies.

use std::path::{Path, PathBuf};
use std::time::Duration;

use mcph_core::{BridgeError, ServerConfig};
use mcph_pool::{CheckoutStrategy, PoolConfig};
use mcph_resilience::{CircuitBreakerConfig, DeadLetterQueueConfig, RetryConfig};
use mcph_resource::ResourceGuardConfig;
use serde::Deserialize;

fn default_install_root() -> PathBuf {
    directories::ProjectDirs::from("", "", "mcph-bridge")
        .map(|dirs| dirs.data_dir().join("servers"))
        .unwrap_or_else(|| std::env::temp_dir().join("mcp_servers"))
}

/// Resilience knobs applied to every supervised server. A single bridge
/// instance applies one set of defaults across all of its servers;
/// per-server overrides are not part of this surface (see DESIGN.md).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResilienceFileConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub circuit_timeout_secs: u64,
    pub pool_size: usize,
    pub pool_max_overflow: usize,
    pub pool_strategy: PoolStrategyToml,
    pub pool_checkout_timeout_secs: u64,
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_secs: u64,
    pub backoff_factor: f64,
    pub jitter: bool,
    pub retry_on: Vec<String>,
}

impl Default for ResilienceFileConfig {
    fn default() -> Self {
        let retry = RetryConfig::default();
        let breaker = CircuitBreakerConfig::default();
        let pool = PoolConfig::default();
        Self {
            failure_threshold: breaker.failure_threshold,
            success_threshold: breaker.success_threshold,
            circuit_timeout_secs: breaker.timeout.as_secs(),
            pool_size: pool.size,
            pool_max_overflow: pool.max_overflow,
            pool_strategy: PoolStrategyToml::Fifo,
            pool_checkout_timeout_secs: pool.checkout_timeout.as_secs(),
            max_retries: retry.max_retries,
            initial_delay_ms: retry.initial_delay.as_millis() as u64,
            max_delay_secs: retry.max_delay.as_secs(),
            backoff_factor: retry.backoff_factor,
            jitter: retry.jitter,
            retry_on: retry.retry_on,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolStrategyToml {
    #[default]
    Fifo,
    Lifo,
    Random,
}

impl From<PoolStrategyToml> for CheckoutStrategy {
    fn from(value: PoolStrategyToml) -> Self {
        match value {
            PoolStrategyToml::Fifo => CheckoutStrategy::Fifo,
            PoolStrategyToml::Lifo => CheckoutStrategy::Lifo,
            PoolStrategyToml::Random => CheckoutStrategy::Random,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DlqFileConfig {
    pub max_size: usize,
    pub persist_file: Option<PathBuf>,
    pub persist_interval_secs: u64,
}

impl Default for DlqFileConfig {
    fn default() -> Self {
        let dlq = DeadLetterQueueConfig::default();
        Self {
            max_size: dlq.max_size,
            persist_file: dlq.persist_file,
            persist_interval_secs: dlq.persist_interval.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResourceFileConfig {
    pub min_free_memory_mb: u64,
    pub default_estimate_mb: u64,
}

impl Default for ResourceFileConfig {
    fn default() -> Self {
        let guard = ResourceGuardConfig::default();
        Self {
            min_free_memory_mb: guard.min_free_memory_mb,
            default_estimate_mb: guard.default_estimate_mb,
        }
    }
}

/// One `(capability, task_type) -> tool name` entry in the router's
/// declarative dispatch table.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolMappingConfig {
    pub capability: String,
    pub task_type: String,
    pub tool_name: String,
}

/// The full configuration surface: installation root, resilience knobs,
/// DLQ persistence, health-check and resource-sweep intervals, the
/// declarative tool-mapping table, and the servers to supervise on startup.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    #[serde(skip)]
    pub install_root: Option<PathBuf>,
    /// Applied to any server whose own `health_check` is absent.
    pub default_health_check_interval_secs: u64,
    /// Reserved: the bridge has no hot-reloaded config layer, so this is
    /// currently read but never acted on. Kept so a future watcher has
    /// somewhere to read its tick rate from without a config-format break.
    pub config_check_interval_secs: u64,
    pub resilience: ResilienceFileConfig,
    pub dlq: DlqFileConfig,
    pub resource: ResourceFileConfig,
    pub resource_sweep_interval_secs: u64,
    pub tool_mappings: Vec<ToolMappingConfig>,
    pub servers: Vec<ServerConfig>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            install_root: None,
            default_health_check_interval_secs: 30,
            config_check_interval_secs: 60,
            resilience: ResilienceFileConfig::default(),
            dlq: DlqFileConfig::default(),
            resource: ResourceFileConfig::default(),
            resource_sweep_interval_secs: 30,
            tool_mappings: Vec::new(),
            servers: Vec::new(),
        }
    }
}

impl BridgeConfig {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, BridgeError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| BridgeError::Configuration {
            server: path.display().to_string(),
            reason: format!("failed to read config file: {e}"),
        })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, BridgeError> {
        let mut config: Self = toml::from_str(raw).map_err(|e| BridgeError::Configuration {
            server: "bridge".into(),
            reason: format!("invalid config: {e}"),
        })?;
        if config.install_root.is_none() {
            config.install_root = Some(default_install_root());
        }
        Ok(config)
    }

    pub fn install_root(&self) -> PathBuf {
        self.install_root.clone().unwrap_or_else(default_install_root)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.resilience.max_retries,
            initial_delay: Duration::from_millis(self.resilience.initial_delay_ms),
            max_delay: Duration::from_secs(self.resilience.max_delay_secs),
            backoff_factor: self.resilience.backoff_factor,
            jitter: self.resilience.jitter,
            retry_on: self.resilience.retry_on.clone(),
        }
    }

    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.resilience.failure_threshold,
            success_threshold: self.resilience.success_threshold,
            timeout: Duration::from_secs(self.resilience.circuit_timeout_secs),
            error_types: Vec::new(),
        }
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            size: self.resilience.pool_size,
            max_overflow: self.resilience.pool_max_overflow,
            strategy: self.resilience.pool_strategy.into(),
            checkout_timeout: Duration::from_secs(self.resilience.pool_checkout_timeout_secs),
            validation_interval: Duration::from_secs(30),
        }
    }

    pub fn dlq_config(&self) -> DeadLetterQueueConfig {
        DeadLetterQueueConfig {
            max_size: self.dlq.max_size,
            persist_file: self.dlq.persist_file.clone(),
            persist_interval: Duration::from_secs(self.dlq.persist_interval_secs),
        }
    }

    pub fn resource_guard_config(&self) -> ResourceGuardConfig {
        ResourceGuardConfig {
            min_free_memory_mb: self.resource.min_free_memory_mb,
            initial_estimates: std::collections::HashMap::new(),
            default_estimate_mb: self.resource.default_estimate_mb,
        }
    }

    pub fn resource_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.resource_sweep_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_fills_in_defaults() {
        let config = BridgeConfig::parse("").unwrap();
        assert_eq!(config.resilience.max_retries, RetryConfig::default().max_retries);
        assert!(config.servers.is_empty());
        assert!(config.install_root.is_some());
    }

    #[test]
    fn parses_servers_and_overrides() {
        let raw = r#"
            resource_sweep_interval_secs = 10

            [resilience]
            max_retries = 5
            pool_size = 8

            [[servers]]
            id = "echo-1"
            name = "echo"
            capability = "echo"
            restart_policy = "permanent"
            max_restarts_within_window = 5
            restart_window = 60

            [servers.server_type]
            kind = "external"
            command = "npx"
            args = ["echo-mcp"]
        "#;
        let config = BridgeConfig::parse(raw).unwrap();
        assert_eq!(config.resilience.max_retries, 5);
        assert_eq!(config.resilience.pool_size, 8);
        assert_eq!(config.resource_sweep_interval_secs, 10);
        assert_eq!(config.servers.len(), 1);
        assert_eq!(config.servers[0].name, "echo");
    }

    #[test]
    fn malformed_toml_is_reported_as_configuration_error() {
        let err = BridgeConfig::parse("not valid toml [[[").unwrap_err();
        assert!(matches!(err, BridgeError::Configuration { .. }));
    }
}
