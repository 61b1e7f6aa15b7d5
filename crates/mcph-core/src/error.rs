//! The bridge's error taxonomy: one variant family per failure
//! category, with typed fields so callers can branch on reason rather than
//! string-matching a message.

use crate::ids::ServerId;

#[derive(thiserror::Error, Debug)]
pub enum BridgeError {
    /// Synchronous validation failure on a `ServerConfig` before any process
    /// or resource is touched.
    #[error("invalid server config for '{server}': {reason}")]
    Configuration { server: String, reason: String },

    /// Package-manager `init`/`install` invocation failed.
    #[error("installation failed for '{server}' (exit {exit_code:?}): {stderr}")]
    InstallationFailed {
        server: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    /// The resolved package has no usable executable.
    #[error("no executable found for server '{server}'")]
    ExecutableNotFound { server: String },

    /// OS-level failure creating the child process.
    #[error("failed to spawn server '{server}': {source}")]
    SpawnFailed {
        server: String,
        #[source]
        source: std::io::Error,
    },

    /// A resource guard rejected the spawn before the child was created.
    #[error("refusing to spawn '{server}': insufficient resources ({detail})")]
    InsufficientResources { server: String, detail: String },

    /// JSON-RPC framing/parsing/validation failure.
    #[error("protocol error ({code}): {message}")]
    Protocol { code: i64, message: String },

    /// Transport-level disconnect (broken pipe, child exit mid-request).
    #[error("transport error on '{server}': {reason}")]
    Transport { server: String, reason: String },

    /// A caller-specified or default deadline elapsed.
    #[error("operation timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    /// Upstream responded 429 with an optional `Retry-After` hint.
    #[error("rate limited, retry after {retry_after_secs:?}s")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Child process exited unexpectedly.
    #[error("server '{server}' crashed: {reason}")]
    Crashed { server: String, reason: String },

    /// Memory/queue threshold exceeded; reported, never enforced by itself.
    #[error("resource limit exceeded for '{server}': {detail}")]
    ResourceLimitExceeded { server: String, detail: String },

    /// Circuit breaker short-circuited the call without invoking it.
    #[error("circuit open for '{name}'")]
    CircuitOpen { name: String },

    /// No server record, capability mapping, or DLQ entry exists for the id.
    #[error("not found: {0}")]
    NotFound(String),

    /// Capability has no server registered to serve it.
    #[error("capability not found: {0}")]
    CapabilityNotFound(String),

    /// `(capability, task_type)` has no entry in the tool-mapping table.
    #[error("unknown task type '{task_type}' for capability '{capability}'")]
    UnknownTaskType {
        capability: String,
        task_type: String,
    },

    /// Catch-all for invariant violations / unexpected internal states.
    #[error("internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    pub fn not_found(id: &ServerId) -> Self {
        Self::NotFound(id.to_string())
    }

    /// Whether this category is eligible for the generic retry layer at all,
    /// independent of any configured `retry_on` whitelist. Configuration and
    /// spawn errors are never retried.
    pub fn is_inherently_non_retryable(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. }
                | Self::InstallationFailed { .. }
                | Self::ExecutableNotFound { .. }
                | Self::SpawnFailed { .. }
                | Self::InsufficientResources { .. }
                | Self::NotFound(_)
                | Self::CapabilityNotFound(_)
                | Self::UnknownTaskType { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_error_is_never_retryable() {
        let err = BridgeError::Configuration {
            server: "demo".into(),
            reason: "missing command".into(),
        };
        assert!(err.is_inherently_non_retryable());
    }

    #[test]
    fn timeout_is_retryable() {
        let err = BridgeError::Timeout { elapsed_ms: 500 };
        assert!(!err.is_inherently_non_retryable());
    }

    #[test]
    fn display_includes_server_name() {
        let err = BridgeError::Crashed {
            server: "echo".into(),
            reason: "sigkill".into(),
        };
        assert_eq!(err.to_string(), "server 'echo' crashed: sigkill");
    }

    #[test]
    fn not_found_helper_formats_id() {
        let id = ServerId::from("abc123");
        let err = BridgeError::not_found(&id);
        assert_eq!(err.to_string(), "not found: abc123");
    }
}
