//! Circuit breaker, retry, and dead-letter queue: the primitives that
//! shield callers of unreliable server connections.

pub mod breaker;
pub mod compose;
pub mod dlq;
pub mod retry;

pub use breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState, Transition};
pub use compose::{with_resilience, with_resilience_and_dlq};
pub use dlq::{DeadLetterQueue, DeadLetterQueueConfig, DlqEntry, DlqStats, Operation};
pub use retry::{retry, RetryConfig};
