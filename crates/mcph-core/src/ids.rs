//! Identifiers used across the bridge: server ids and JSON-RPC request ids.

use std::fmt;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unique identifier for a managed server. Generated as a ULID when a
/// `ServerConfig` omits one, but caller-supplied ids are accepted verbatim
/// as long as they are unique within the Manager's table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServerId(String);

impl ServerId {
    /// Generate a fresh, time-sortable id.
    pub fn generate() -> Self {
        Self(Ulid::new().to_string())
    }

    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ServerId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ServerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A JSON-RPC 2.0 id: integer, string, or `null`. `null` is only valid on
/// error responses to requests that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
    Null,
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
            Self::Null => write!(f, "null"),
        }
    }
}

/// Monotonically-unique id generator for outbound requests, used when a
/// caller doesn't supply its own id.
#[derive(Debug, Default)]
pub struct RequestIdGenerator {
    next: std::sync::atomic::AtomicI64,
}

impl RequestIdGenerator {
    pub fn new() -> Self {
        Self {
            next: std::sync::atomic::AtomicI64::new(1),
        }
    }

    pub fn next(&self) -> RequestId {
        let id = self.next.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        RequestId::Number(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_id_generate_is_unique() {
        let a = ServerId::generate();
        let b = ServerId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn server_id_display_roundtrip() {
        let id = ServerId::from("demo-server");
        assert_eq!(id.to_string(), "demo-server");
        assert_eq!(id.as_str(), "demo-server");
    }

    #[test]
    fn request_id_generator_is_monotonic() {
        let gen = RequestIdGenerator::new();
        let ids: Vec<_> = (0..5).map(|_| gen.next()).collect();
        let mut seen = std::collections::HashSet::new();
        for id in ids {
            assert!(seen.insert(id));
        }
    }

    #[test]
    fn request_id_serializes_untagged() {
        let num = serde_json::to_value(RequestId::Number(7)).unwrap();
        assert_eq!(num, serde_json::json!(7));
        let s = serde_json::to_value(RequestId::String("abc".into())).unwrap();
        assert_eq!(s, serde_json::json!("abc"));
        let n = serde_json::to_value(RequestId::Null).unwrap();
        assert_eq!(n, serde_json::Value::Null);
    }
}
