//! The standard composition: `breaker(retry(raw_call))`. The
//! breaker wraps the whole retry sequence, so a half-open probe consumes
//! exactly one retry budget and one breaker verdict.

use std::future::Future;

use mcph_core::BridgeError;

use crate::breaker::CircuitBreaker;
use crate::dlq::{DeadLetterQueue, Operation};
use crate::retry::RetryConfig;

pub async fn with_resilience<F, Fut, T>(
    breaker: &CircuitBreaker,
    retry_config: &RetryConfig,
    mut f: F,
) -> Result<T, BridgeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BridgeError>>,
{
    breaker
        .call(|| crate::retry::retry(retry_config, &mut f, |_, _, _| {}))
        .await
}

/// Resilient call that, on total exhaustion (retry and breaker both give
/// up), enqueues the operation to the DLQ instead of only returning the
/// error.
pub async fn with_resilience_and_dlq<F, Fut, T>(
    breaker: &CircuitBreaker,
    retry_config: &RetryConfig,
    dlq: &DeadLetterQueue,
    operation: Operation,
    f: F,
) -> Result<T, BridgeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BridgeError>>,
{
    match with_resilience(breaker, retry_config, f).await {
        Ok(value) => Ok(value),
        Err(err) => {
            if !matches!(err, BridgeError::CircuitOpen { .. }) {
                dlq.add(err.to_string(), operation).await;
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::CircuitBreakerConfig;
    use crate::dlq::DeadLetterQueueConfig;
    use std::time::Duration;

    #[tokio::test]
    async fn exhausted_retry_lands_in_dlq() {
        let breaker = CircuitBreaker::new("demo", CircuitBreakerConfig::default());
        let retry_config = RetryConfig {
            max_retries: 1,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            backoff_factor: 2.0,
            jitter: false,
            retry_on: Vec::new(),
        };
        let dlq = DeadLetterQueue::new(DeadLetterQueueConfig::default());
        let operation = Operation {
            server_id: "demo".into(),
            method: "tools/call".into(),
            params: serde_json::json!({}),
        };

        let result: Result<(), _> = with_resilience_and_dlq(&breaker, &retry_config, &dlq, operation, || async {
            Err(BridgeError::Timeout { elapsed_ms: 1 })
        })
        .await;

        assert!(result.is_err());
        assert_eq!(dlq.stats().await.total, 1);
    }
}
