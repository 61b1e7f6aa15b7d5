//! The Manager's per-server bookkeeping: everything needed to route a
//! request, restart a crashed process, and report status, kept in one
//! place the mailbox loop is the sole mutator of.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use mcph_core::ServerProcess;
use mcph_pool::ConnectionPool;
use mcph_protocol::PendingTable;
use mcph_resilience::CircuitBreaker;
use mcph_transport::StdioTransport;
use serde_json::Value;
use tokio::process::Child;
use tokio::sync::{oneshot, Mutex};

pub type PendingReply = oneshot::Sender<Result<Value, mcph_core::BridgeError>>;

pub struct ManagedServer {
    /// Config, status, health, metrics, pid, and restart history — the
    /// serializable half of a server record.
    pub process: ServerProcess,
    pub child: Child,
    pub transport: Arc<StdioTransport>,
    pub pending: Arc<Mutex<PendingTable<PendingReply>>>,
    pub request_ids: Arc<mcph_core::ids::RequestIdGenerator>,
    pub pool: Arc<ConnectionPool<()>>,
    pub breaker: Arc<CircuitBreaker>,
    /// Flipped false the moment a crash is observed; read by the basic
    /// health probe without touching the actor-owned `Child`.
    pub alive: Arc<AtomicBool>,
    /// Set before a deliberate stop/kill so the reader task reports the
    /// resulting disconnect as a normal exit, not a crash.
    pub expect_stop: Arc<AtomicBool>,
    /// Background task draining the transport's event stream; aborted on stop.
    pub reader_task: tokio::task::JoinHandle<()>,
}

impl ManagedServer {
    pub fn restart_backoff(&self) -> Duration {
        crate::restart::backoff_delay(self.process.recent_restarts.len() as u32)
    }
}
