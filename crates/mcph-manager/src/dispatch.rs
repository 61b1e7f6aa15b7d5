//! Sends one JSON-RPC request over a registered server's transport and
//! waits for its correlated reply, wrapped in the standard
//! `breaker(retry(raw_call))` composition.

use std::time::{Duration, Instant};

use mcph_core::BridgeError;
use mcph_protocol::{Message, PendingRequest};
use mcph_resilience::{with_resilience_and_dlq, DeadLetterQueue, Operation, RetryConfig};
use serde_json::Value;

use crate::entry::ManagedServer;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

async fn send_request_once(server: &ManagedServer, method: &str, params: Value) -> Result<Value, BridgeError> {
    let permit = server.pool.checkout().await?;

    let id = server.request_ids.next();
    let request = mcph_protocol::build_request(method, params, id.clone()).map_err(|e| BridgeError::Protocol {
        code: -32600,
        message: e.to_string(),
    })?;

    let (tx, rx) = tokio::sync::oneshot::channel();
    {
        let mut pending = server.pending.lock().await;
        pending.insert(PendingRequest {
            id: id.clone(),
            method: method.to_string(),
            sender: tx,
            deadline: Some(Instant::now() + DEFAULT_REQUEST_TIMEOUT),
        });
    }

    if let Err(e) = server.transport.write_message(&Message::Request(request)).await {
        server.pending.lock().await.remove_expired(Instant::now());
        server.pool.checkin(permit).await;
        return Err(e);
    }

    let outcome = tokio::time::timeout(DEFAULT_REQUEST_TIMEOUT, rx).await;
    server.pool.checkin(permit).await;

    match outcome {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => Err(BridgeError::Transport {
            server: server.process.config.id.to_string(),
            reason: "reply channel dropped before a response arrived".into(),
        }),
        Err(_) => {
            server.pending.lock().await.remove_expired(Instant::now());
            Err(BridgeError::Timeout {
                elapsed_ms: DEFAULT_REQUEST_TIMEOUT.as_millis() as u64,
            })
        }
    }
}

/// Dispatches through `breaker(retry(raw_call))` and, on total exhaustion,
/// deposits the operation in the dead-letter queue instead of only
/// returning the error.
pub async fn send_resilient_request(
    server: &ManagedServer,
    retry_config: &RetryConfig,
    dlq: &DeadLetterQueue,
    method: &str,
    params: Value,
) -> Result<Value, BridgeError> {
    let operation = Operation {
        server_id: server.process.config.id.to_string(),
        method: method.to_string(),
        params: params.clone(),
    };
    with_resilience_and_dlq(&server.breaker, retry_config, dlq, operation, || {
        send_request_once(server, method, params.clone())
    })
    .await
}
