//! `ServerConfig` and the restart/health-check policy types that hang off it.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::BridgeError;
use crate::ids::ServerId;

/// How a server's process is obtained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServerType {
    /// Package resolved and installed via an external package manager, then
    /// spawned as a subprocess communicating over stdio.
    External {
        command: String,
        args: Vec<String>,
        #[serde(default)]
        package: Option<String>,
    },
    /// Spawned in-process against a pre-resolved executable path, skipping
    /// package resolution.
    Internal { command: String, args: Vec<String> },
    /// Reserved for a future caller-registered start hook; no such registry
    /// exists yet, so every `Custom` config is rejected at validation time
    /// rather than accepted and then failing unconditionally at spawn time.
    Custom { start_fn: String },
}

/// What to do when a supervised server's process exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartPolicy {
    /// Always restart, regardless of exit reason.
    Permanent,
    /// Restart only on abnormal exit (crash), not on a deliberate stop.
    Transient,
    /// Never restart automatically.
    Temporary,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self::Transient
    }
}

/// How a health check probes a running server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthCheckType {
    /// Process-alive check only; no protocol traffic.
    Basic,
    /// Round-trip a lightweight JSON-RPC request over the server's stdio
    /// transport.
    Stdio,
    /// Open a TCP connection to the configured port.
    Tcp,
    /// Open a websocket connection and expect a handshake response.
    Websocket,
    /// Invoke a caller-registered probe function.
    Custom,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    pub check_type: HealthCheckType,
    #[serde(with = "duration_secs")]
    pub interval: Duration,
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
    /// Consecutive failures before the server is marked unhealthy.
    pub failure_threshold: u32,
    /// TCP/websocket port; required when `check_type` needs one.
    #[serde(default)]
    pub port: Option<u16>,
    /// Name of the registered probe; required when `check_type` is `Custom`.
    #[serde(default)]
    pub probe_name: Option<String>,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            check_type: HealthCheckType::Basic,
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(5),
            failure_threshold: 3,
            port: None,
            probe_name: None,
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

/// Full configuration for one supervised server, as held by the Manager's
/// server table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub id: ServerId,
    pub name: String,
    pub capability: String,
    pub server_type: ServerType,
    pub restart_policy: RestartPolicy,
    #[serde(default)]
    pub health_check: Option<HealthCheckConfig>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub working_dir: Option<String>,
    /// Soft RSS ceiling in megabytes; reported on breach, not enforced.
    #[serde(default)]
    pub memory_limit_mb: Option<u64>,
    pub max_restarts_within_window: u32,
    #[serde(with = "duration_secs")]
    pub restart_window: Duration,
}

impl ServerConfig {
    /// Construction-time validation, run once when a config is loaded (from
    /// TOML or built directly): every `ServerConfig` must be internally
    /// consistent the moment it's built; there is no hot-reloaded config
    /// layer that re-validates later.
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.name.trim().is_empty() {
            return Err(BridgeError::Configuration {
                server: self.id.to_string(),
                reason: "name must not be empty".into(),
            });
        }
        if self.capability.trim().is_empty() {
            return Err(BridgeError::Configuration {
                server: self.name.clone(),
                reason: "capability must not be empty".into(),
            });
        }
        match &self.server_type {
            ServerType::External { command, .. } | ServerType::Internal { command, .. } => {
                if command.trim().is_empty() {
                    return Err(BridgeError::Configuration {
                        server: self.name.clone(),
                        reason: "command must not be empty".into(),
                    });
                }
            }
            ServerType::Custom { start_fn } => {
                // No start-function registry exists for the Spawner to
                // dispatch `start_fn` to; reject here rather than let a
                // config pass validation only to fail unconditionally when
                // the Manager tries to start it.
                return Err(BridgeError::Configuration {
                    server: self.name.clone(),
                    reason: format!("custom server type is not supported (start_fn: {start_fn:?})"),
                });
            }
        }
        if let Some(hc) = &self.health_check {
            self.validate_health_check(hc)?;
        }
        if self.max_restarts_within_window == 0 {
            return Err(BridgeError::Configuration {
                server: self.name.clone(),
                reason: "max_restarts_within_window must be at least 1".into(),
            });
        }
        Ok(())
    }

    fn validate_health_check(&self, hc: &HealthCheckConfig) -> Result<(), BridgeError> {
        match hc.check_type {
            HealthCheckType::Tcp | HealthCheckType::Websocket if hc.port.is_none() => {
                Err(BridgeError::Configuration {
                    server: self.name.clone(),
                    reason: format!("{:?} health check requires a port", hc.check_type),
                })
            }
            HealthCheckType::Custom if hc.probe_name.is_none() => {
                Err(BridgeError::Configuration {
                    server: self.name.clone(),
                    reason: "custom health check requires a probe_name".into(),
                })
            }
            _ => {
                if hc.failure_threshold == 0 {
                    return Err(BridgeError::Configuration {
                        server: self.name.clone(),
                        reason: "failure_threshold must be at least 1".into(),
                    });
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> ServerConfig {
        ServerConfig {
            id: ServerId::generate(),
            name: "echo".into(),
            capability: "echo.text".into(),
            server_type: ServerType::External {
                command: "npx".into(),
                args: vec!["echo-mcp".into()],
                package: Some("echo-mcp".into()),
            },
            restart_policy: RestartPolicy::Transient,
            health_check: None,
            env: HashMap::new(),
            working_dir: None,
            memory_limit_mb: Some(256),
            max_restarts_within_window: 5,
            restart_window: Duration::from_secs(60),
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn external_requires_command() {
        let mut cfg = base_config();
        cfg.server_type = ServerType::External {
            command: String::new(),
            args: vec![],
            package: None,
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn custom_server_type_is_always_rejected() {
        let mut cfg = base_config();
        cfg.server_type = ServerType::Custom {
            start_fn: String::new(),
        };
        assert!(cfg.validate().is_err());

        // Even a populated `start_fn` doesn't help — there's no registry to
        // dispatch it to.
        cfg.server_type = ServerType::Custom {
            start_fn: "my_start_fn".into(),
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn tcp_health_check_requires_port() {
        let mut cfg = base_config();
        cfg.health_check = Some(HealthCheckConfig {
            check_type: HealthCheckType::Tcp,
            port: None,
            ..Default::default()
        });
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn custom_health_check_requires_probe_name() {
        let mut cfg = base_config();
        cfg.health_check = Some(HealthCheckConfig {
            check_type: HealthCheckType::Custom,
            probe_name: None,
            ..Default::default()
        });
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_max_restarts_is_rejected() {
        let mut cfg = base_config();
        cfg.max_restarts_within_window = 0;
        assert!(cfg.validate().is_err());
    }
}
