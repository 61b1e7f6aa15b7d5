//! Request/response correlation.
//! One `PendingTable` is owned per transport's reader task — never shared
//! across tasks without going through that task's mailbox.

use std::collections::HashMap;
use std::time::Instant;

use mcph_core::RequestId;

use crate::error::ProtocolError;
use crate::message::Response;

/// A request awaiting its response. Generic over the reply channel so the
/// transport crate can plug in whatever sender type it uses (a oneshot, a
/// tokio mpsc, etc.) without this crate depending on tokio.
#[derive(Debug)]
pub struct PendingRequest<T> {
    pub id: RequestId,
    pub method: String,
    pub sender: T,
    pub deadline: Option<Instant>,
}

#[derive(Debug, Default)]
pub struct PendingTable<T> {
    entries: HashMap<RequestId, PendingRequest<T>>,
}

impl<T> PendingTable<T> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn insert(&mut self, pending: PendingRequest<T>) {
        self.entries.insert(pending.id.clone(), pending);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Match a response by id and remove the pending entry. Exactly one
    /// caller is resolved per id, per the correlation invariant.
    pub fn correlate(&mut self, response: &Response) -> Result<PendingRequest<T>, ProtocolError> {
        self.entries
            .remove(&response.id)
            .ok_or_else(|| ProtocolError::UnknownRequest(response.id.to_string()))
    }

    /// Remove and return every entry whose deadline has passed as of `now`,
    /// so the caller can fail them with a timeout error.
    pub fn remove_expired(&mut self, now: Instant) -> Vec<PendingRequest<T>> {
        let expired_ids: Vec<RequestId> = self
            .entries
            .iter()
            .filter(|(_, p)| p.deadline.is_some_and(|d| d <= now))
            .map(|(id, _)| id.clone())
            .collect();
        expired_ids
            .into_iter()
            .filter_map(|id| self.entries.remove(&id))
            .collect()
    }

    /// Drop every pending entry, returning them so the caller can fail them
    /// with `connection_error`.
    pub fn drain_all(&mut self) -> Vec<PendingRequest<T>> {
        self.entries.drain().map(|(_, p)| p).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Response;
    use std::time::Duration;

    fn response(id: RequestId) -> Response {
        Response {
            id,
            result: Some(serde_json::json!(null)),
            error: None,
        }
    }

    #[test]
    fn correlate_removes_matched_entry() {
        let mut table: PendingTable<()> = PendingTable::new();
        table.insert(PendingRequest {
            id: RequestId::Number(1),
            method: "ping".into(),
            sender: (),
            deadline: None,
        });
        assert_eq!(table.len(), 1);
        let pending = table.correlate(&response(RequestId::Number(1))).unwrap();
        assert_eq!(pending.method, "ping");
        assert!(table.is_empty());
    }

    #[test]
    fn correlate_unknown_id_errors() {
        let mut table: PendingTable<()> = PendingTable::new();
        let err = table.correlate(&response(RequestId::Number(99))).unwrap_err();
        assert_eq!(err, ProtocolError::UnknownRequest("99".into()));
    }

    #[test]
    fn expired_entries_are_removed_and_returned() {
        let mut table: PendingTable<()> = PendingTable::new();
        let now = Instant::now();
        table.insert(PendingRequest {
            id: RequestId::Number(1),
            method: "ping".into(),
            sender: (),
            deadline: Some(now - Duration::from_secs(1)),
        });
        table.insert(PendingRequest {
            id: RequestId::Number(2),
            method: "ping".into(),
            sender: (),
            deadline: Some(now + Duration::from_secs(60)),
        });
        let expired = table.remove_expired(now);
        assert_eq!(expired.len(), 1);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn drain_all_empties_table() {
        let mut table: PendingTable<()> = PendingTable::new();
        table.insert(PendingRequest {
            id: RequestId::Number(1),
            method: "ping".into(),
            sender: (),
            deadline: None,
        });
        let drained = table.drain_all();
        assert_eq!(drained.len(), 1);
        assert!(table.is_empty());
    }
}
