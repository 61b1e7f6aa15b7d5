//! Exponential-backoff retry. Retries only errors that match
//! `retry_on` (and are inherently retryable per their category); delays
//! follow `initial_delay * backoff_factor^attempt`, capped, with optional
//! jitter, and honor a rate-limit `Retry-After` hint when present.

use std::future::Future;
use std::time::Duration;

use mcph_core::BridgeError;
use rand::Rng;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
    pub jitter: bool,
    /// Substrings an error's `Display` must contain to be retried. Empty
    /// means every retryable-category error qualifies.
    pub retry_on: Vec<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
            jitter: true,
            retry_on: Vec::new(),
        }
    }
}

fn is_retryable(config: &RetryConfig, err: &BridgeError) -> bool {
    if err.is_inherently_non_retryable() {
        return false;
    }
    if config.retry_on.is_empty() {
        return true;
    }
    let message = err.to_string();
    config.retry_on.iter().any(|t| message.contains(t.as_str()))
}

fn base_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let scaled = config.initial_delay.as_secs_f64() * config.backoff_factor.powi(attempt as i32);
    let capped = scaled.min(config.max_delay.as_secs_f64()).max(0.0);
    let jittered = if config.jitter {
        capped * rand::thread_rng().gen_range(0.75..=1.25)
    } else {
        capped
    };
    Duration::from_secs_f64(jittered.max(0.0))
}

/// `max(computed_delay, retry_after)` when the failing error carries a
/// `Retry-After` hint, per the rate-limit/retry interaction.
fn delay_for(config: &RetryConfig, attempt: u32, err: &BridgeError) -> Duration {
    let computed = base_delay(config, attempt);
    if let BridgeError::RateLimited {
        retry_after_secs: Some(secs),
    } = err
    {
        computed.max(Duration::from_secs(*secs))
    } else {
        computed
    }
}

/// Retry `f` up to `config.max_retries` additional times. `f` is invoked at
/// least once and at most `max_retries + 1` times. `on_retry` fires before
/// each sleep with the attempt number (1-based), the error that triggered
/// it, and the delay about to be slept.
pub async fn retry<F, Fut, T>(
    config: &RetryConfig,
    mut f: F,
    mut on_retry: impl FnMut(u32, &BridgeError, Duration),
) -> Result<T, BridgeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BridgeError>>,
{
    let mut attempt = 0u32;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retryable(config, &err) || attempt >= config.max_retries {
                    return Err(err);
                }
                let delay = delay_for(config, attempt, &err);
                attempt += 1;
                on_retry(attempt, &err, delay);
                tokio::time::sleep(delay).await;
            }
        }
    }
}
