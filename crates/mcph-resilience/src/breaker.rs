//! Circuit breaker: per-named-upstream state machine that
//! shields an unreliable callable behind closed/open/half_open states.

use std::collections::VecDeque;
use std::future::Future;
use std::time::{Duration, Instant};

use mcph_core::BridgeError;
use tokio::sync::Mutex;
use tracing::info;

const TRANSITION_RING_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub timeout: Duration,
    /// Substrings an error's `Display` must contain to count as a failure.
    /// Empty means every error counts.
    pub error_types: Vec<String>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout: Duration::from_secs(30),
            error_types: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Transition {
    pub from: CircuitState,
    pub to: CircuitState,
    pub at: Instant,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CircuitBreakerStats {
    pub state: Option<CircuitState>,
    pub failure_count: u32,
    pub success_count: u32,
}

struct Inner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure_at: Option<Instant>,
    transitions: VecDeque<Transition>,
}

/// One breaker per named upstream (e.g. a server id, or a provider name).
/// Owns its own state; never a global static.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure_at: None,
                transitions: VecDeque::with_capacity(TRANSITION_RING_SIZE),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn state(&self) -> CircuitState {
        self.inner.lock().await.state
    }

    pub async fn stats(&self) -> CircuitBreakerStats {
        let inner = self.inner.lock().await;
        CircuitBreakerStats {
            state: Some(inner.state),
            failure_count: inner.failure_count,
            success_count: inner.success_count,
        }
    }

    pub async fn transitions(&self) -> Vec<Transition> {
        self.inner.lock().await.transitions.iter().copied().collect()
    }

    /// Run `f` through the breaker. If open and still inside `timeout`,
    /// rejects with `circuit_open` without invoking `f` at all.
    pub async fn call<F, Fut, T>(&self, f: F) -> Result<T, BridgeError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, BridgeError>>,
    {
        self.admit().await?;
        match f().await {
            Ok(value) => {
                self.on_success().await;
                Ok(value)
            }
            Err(err) => {
                self.on_failure(&err).await;
                Err(err)
            }
        }
    }

    async fn admit(&self) -> Result<(), BridgeError> {
        let mut inner = self.inner.lock().await;
        if inner.state == CircuitState::Open {
            let elapsed = inner
                .last_failure_at
                .map(|t| t.elapsed())
                .unwrap_or(Duration::MAX);
            if elapsed >= self.config.timeout {
                self.transition(&mut inner, CircuitState::HalfOpen);
            } else {
                return Err(BridgeError::CircuitOpen {
                    name: self.name.clone(),
                });
            }
        }
        Ok(())
    }

    async fn on_success(&self) {
        let mut inner = self.inner.lock().await;
        match inner.state {
            CircuitState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    inner.failure_count = 0;
                    self.transition(&mut inner, CircuitState::Closed);
                }
            }
            CircuitState::Closed => inner.failure_count = 0,
            CircuitState::Open => {}
        }
    }

    async fn on_failure(&self, err: &BridgeError) {
        if !self.matches_error_types(err) {
            return;
        }
        let mut inner = self.inner.lock().await;
        inner.last_failure_at = Some(Instant::now());
        match inner.state {
            CircuitState::HalfOpen => {
                inner.success_count = 0;
                self.transition(&mut inner, CircuitState::Open);
            }
            CircuitState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            CircuitState::Open => {}
        }
    }

    fn matches_error_types(&self, err: &BridgeError) -> bool {
        if self.config.error_types.is_empty() {
            return true;
        }
        let message = err.to_string();
        self.config
            .error_types
            .iter()
            .any(|t| message.contains(t.as_str()))
    }

    fn transition(&self, inner: &mut Inner, to: CircuitState) {
        let from = inner.state;
        inner.state = to;
        if to == CircuitState::HalfOpen {
            inner.success_count = 0;
        }
        info!(breaker = %self.name, ?from, ?to, "circuit_breaker_transition");
        inner.transitions.push_back(Transition {
            from,
            to,
            at: Instant::now(),
        });
        if inner.transitions.len() > TRANSITION_RING_SIZE {
            inner.transitions.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(failure_threshold: u32) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold,
            success_threshold: 2,
            timeout: Duration::from_millis(50),
            error_types: Vec::new(),
        }
    }

    async fn failing_call() -> Result<(), BridgeError> {
        Err(BridgeError::Transport {
            server: "demo".into(),
            reason: "broken pipe".into(),
        })
    }

    #[tokio::test]
    async fn opens_exactly_on_nth_failure() {
        let breaker = CircuitBreaker::new("demo", config(3));
        for _ in 0..2 {
            let _ = breaker.call(failing_call).await;
            assert_eq!(breaker.state().await, CircuitState::Closed);
        }
        let _ = breaker.call(failing_call).await;
        assert_eq!(breaker.state().await, CircuitState::Open);
    }

    #[tokio::test]
    async fn open_circuit_rejects_without_invoking_callable() {
        let breaker = CircuitBreaker::new("demo", config(1));
        let _ = breaker.call(failing_call).await;
        assert_eq!(breaker.state().await, CircuitState::Open);

        let invoked = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let invoked_clone = invoked.clone();
        let result = breaker
            .call(|| async move {
                invoked_clone.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok::<(), BridgeError>(())
            })
            .await;
        assert!(matches!(result, Err(BridgeError::CircuitOpen { .. })));
        assert!(!invoked.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn half_open_closes_after_success_threshold() {
        let breaker = CircuitBreaker::new("demo", config(1));
        let _ = breaker.call(failing_call).await;
        assert_eq!(breaker.state().await, CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(60)).await;
        let _ = breaker.call(|| async { Ok::<(), BridgeError>(()) }).await;
        assert_eq!(breaker.state().await, CircuitState::HalfOpen);
        let _ = breaker.call(|| async { Ok::<(), BridgeError>(()) }).await;
        assert_eq!(breaker.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_failure_reopens() {
        let breaker = CircuitBreaker::new("demo", config(1));
        let _ = breaker.call(failing_call).await;
        tokio::time::sleep(Duration::from_millis(60)).await;
        let _ = breaker.call(failing_call).await;
        assert_eq!(breaker.state().await, CircuitState::Open);
    }
}
