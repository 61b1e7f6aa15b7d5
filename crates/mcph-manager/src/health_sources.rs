//! Adapts a registered server's transport and pending-request table into
//! the probe sources `mcph-health` needs, without handing the monitor
//! anything beyond those weak references.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use mcph_core::{ids::RequestIdGenerator, BridgeError, ServerId};
use mcph_health::{BasicSample, BasicSampler, StdioPinger};
use mcph_protocol::{Message, PendingRequest};
use mcph_transport::StdioTransport;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::entry::PendingReply;

pub struct BasicSamplerHandle {
    pub alive: Arc<AtomicBool>,
    pub pending: Arc<Mutex<mcph_protocol::PendingTable<PendingReply>>>,
}

#[async_trait]
impl BasicSampler for BasicSamplerHandle {
    async fn sample(&self) -> BasicSample {
        BasicSample {
            alive: self.alive.load(Ordering::SeqCst),
            queue_length: self.pending.lock().await.len(),
            // Per-process memory is ResourceTracker's job; the basic probe
            // only ever sees it via a Manager-provided limit breach, not here.
            memory_mb: 0,
        }
    }
}

pub struct StdioPingerHandle {
    pub server_id: ServerId,
    pub transport: Arc<StdioTransport>,
    pub pending: Arc<Mutex<mcph_protocol::PendingTable<PendingReply>>>,
    pub request_ids: Arc<RequestIdGenerator>,
}

#[async_trait]
impl StdioPinger for StdioPingerHandle {
    async fn ping(&self, timeout: Duration) -> Result<(), BridgeError> {
        let id = self.request_ids.next();
        let request = mcph_protocol::build_request(mcph_protocol::methods::PING, Value::Null, id.clone())
            .map_err(|e| BridgeError::Protocol {
                code: -32600,
                message: e.to_string(),
            })?;

        let (tx, rx) = tokio::sync::oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            pending.insert(PendingRequest {
                id: id.clone(),
                method: mcph_protocol::methods::PING.to_string(),
                sender: tx,
                deadline: Some(Instant::now() + timeout),
            });
        }

        self.transport.write_message(&Message::Request(request)).await?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Ok(_))) => Ok(()),
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(_)) => Err(BridgeError::Transport {
                server: self.server_id.to_string(),
                reason: "ping reply channel dropped".into(),
            }),
            Err(_) => {
                self.pending.lock().await.remove_expired(Instant::now());
                Err(BridgeError::Timeout {
                    elapsed_ms: timeout.as_millis() as u64,
                })
            }
        }
    }
}
