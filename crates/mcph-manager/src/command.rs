//! The Manager's mailbox: every public operation and internal subscription
//! is a variant here, processed FIFO by the single actor task.

use mcph_core::{BridgeError, HealthStatus, ServerConfig, ServerId, ServerMetrics, ServerStatus};
use serde_json::Value;
use tokio::sync::oneshot;

use crate::restart::CrashReason;

pub type Reply<T> = oneshot::Sender<Result<T, BridgeError>>;

#[derive(Debug, Clone, Default)]
pub struct StopOptions {
    pub graceful: bool,
    pub timeout: std::time::Duration,
}

impl StopOptions {
    pub fn graceful(timeout: std::time::Duration) -> Self {
        Self {
            graceful: true,
            timeout,
        }
    }

    pub fn force() -> Self {
        Self {
            graceful: false,
            timeout: std::time::Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfigPatch {
    pub restart_policy: Option<mcph_core::RestartPolicy>,
    pub memory_limit_mb: Option<Option<u64>>,
    pub env: Option<std::collections::HashMap<String, String>>,
    pub restart_on_update: bool,
}

#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub server_id: ServerId,
}

pub enum Command {
    StartServer {
        config: ServerConfig,
        reply: Reply<ServerId>,
    },
    StopServer {
        id: ServerId,
        options: StopOptions,
        reply: Reply<()>,
    },
    RestartServer {
        id: ServerId,
        reply: Reply<()>,
    },
    StartServers {
        configs: Vec<ServerConfig>,
        reply: oneshot::Sender<Vec<Result<ServerId, BridgeError>>>,
    },
    StopServers {
        ids: Vec<ServerId>,
        options: StopOptions,
        reply: oneshot::Sender<Vec<Result<(), BridgeError>>>,
    },
    GetStatus {
        id: ServerId,
        reply: Reply<ServerStatus>,
    },
    GetHealth {
        id: ServerId,
        reply: Reply<HealthStatus>,
    },
    GetMetrics {
        id: Option<ServerId>,
        reply: Reply<Vec<(ServerId, ServerMetrics)>>,
    },
    UpdateConfig {
        id: ServerId,
        patch: ConfigPatch,
        reply: Reply<()>,
    },
    GetConnection {
        id: ServerId,
        reply: Reply<ConnectionHandle>,
    },
    SendRequest {
        id: ServerId,
        method: String,
        params: Value,
        reply: Reply<Value>,
    },
    /// Internal: a registered server's process exited.
    OnChildDown {
        id: ServerId,
        reason: CrashReason,
        detail: String,
    },
    /// Internal: a health-monitor result arrived for a registered server.
    OnHealthResult {
        id: ServerId,
        status: HealthStatus,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}
