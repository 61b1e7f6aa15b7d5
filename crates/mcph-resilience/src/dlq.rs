//! Dead-letter queue: bounded, FIFO-eviction storage for
//! operations that exhausted retry, with periodic binary persistence.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use mcph_core::BridgeError;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};
use ulid::Ulid;

/// A serialized operation, stored in place of the original callable so the
/// table is persistable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub server_id: String,
    pub method: String,
    pub params: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub error_type: String,
    pub retries: u32,
    pub payload: Operation,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DlqStats {
    pub total: usize,
    pub by_error_type: HashMap<String, usize>,
}

#[derive(Debug, Clone)]
pub struct DeadLetterQueueConfig {
    pub max_size: usize,
    pub persist_file: Option<PathBuf>,
    pub persist_interval: Duration,
}

impl Default for DeadLetterQueueConfig {
    fn default() -> Self {
        Self {
            max_size: 1000,
            persist_file: None,
            persist_interval: Duration::from_secs(60),
        }
    }
}

pub struct DeadLetterQueue {
    config: DeadLetterQueueConfig,
    entries: Mutex<VecDeque<DlqEntry>>,
}

impl DeadLetterQueue {
    pub fn new(config: DeadLetterQueueConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(VecDeque::new()),
        }
    }

    /// Load persisted entries from `persist_file`, if configured. A missing
    /// file is normal on first run and not an error.
    pub async fn load(&self) -> Result<(), BridgeError> {
        let Some(path) = &self.config.persist_file else {
            return Ok(());
        };
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(BridgeError::Internal(format!(
                    "failed to read DLQ file {path:?}: {e}"
                )))
            }
        };
        let loaded: VecDeque<DlqEntry> = bincode::deserialize(&bytes)
            .map_err(|e| BridgeError::Internal(format!("failed to decode DLQ file: {e}")))?;
        *self.entries.lock().await = loaded;
        Ok(())
    }

    /// Persist the full table to `persist_file` in one shot, if configured.
    pub async fn persist(&self) -> Result<(), BridgeError> {
        let Some(path) = &self.config.persist_file else {
            return Ok(());
        };
        let entries = self.entries.lock().await;
        let bytes = bincode::serialize(&*entries)
            .map_err(|e| BridgeError::Internal(format!("failed to encode DLQ table: {e}")))?;
        drop(entries);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.ok();
        }
        tokio::fs::write(path, bytes)
            .await
            .map_err(|e| BridgeError::Internal(format!("failed to write DLQ file {path:?}: {e}")))
    }

    /// Spawn a background task that persists on `persist_interval` until
    /// the returned handle is dropped or aborted.
    pub fn spawn_persist_task(self: std::sync::Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.persist_interval);
            loop {
                ticker.tick().await;
                if let Err(e) = self.persist().await {
                    warn!(error = %e, "dlq_persist_failed");
                }
            }
        })
    }

    pub async fn add(&self, error_type: impl Into<String>, payload: Operation) -> String {
        let id = Ulid::new().to_string();
        let entry = DlqEntry {
            id: id.clone(),
            timestamp: Utc::now(),
            error_type: error_type.into(),
            retries: 0,
            payload,
        };
        let mut entries = self.entries.lock().await;
        if entries.len() >= self.config.max_size {
            entries.pop_front();
        }
        info!(dlq_id = %id, "dlq_add");
        entries.push_back(entry);
        id
    }

    pub async fn list_all(&self) -> Vec<DlqEntry> {
        self.entries.lock().await.iter().cloned().collect()
    }

    pub async fn list_by_error(&self, error_type: &str) -> Vec<DlqEntry> {
        self.entries
            .lock()
            .await
            .iter()
            .filter(|e| e.error_type == error_type)
            .cloned()
            .collect()
    }

    /// Remove and return the entry for re-execution by the caller. The
    /// caller decides whether to `remove` it permanently on success or
    /// re-`add` it (with an incremented retry count) on repeated failure.
    pub async fn retry(&self, id: &str) -> Option<DlqEntry> {
        let mut entries = self.entries.lock().await;
        let idx = entries.iter().position(|e| e.id == id)?;
        let mut entry = entries.remove(idx)?;
        entry.retries += 1;
        info!(dlq_id = %id, retries = entry.retries, "dlq_retry");
        Some(entry)
    }

    pub async fn remove(&self, id: &str) -> Option<DlqEntry> {
        let mut entries = self.entries.lock().await;
        let idx = entries.iter().position(|e| e.id == id)?;
        info!(dlq_id = %id, "dlq_remove");
        entries.remove(idx)
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }

    pub async fn stats(&self) -> DlqStats {
        let entries = self.entries.lock().await;
        let mut by_error_type = HashMap::new();
        for entry in entries.iter() {
            *by_error_type.entry(entry.error_type.clone()).or_insert(0) += 1;
        }
        DlqStats {
            total: entries.len(),
            by_error_type,
        }
    }
}
