//! Bounded connection pool: FIFO/LIFO/random checkout, overflow
//! connections beyond `size`, and a waiter queue for blocked checkouts.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use mcph_core::BridgeError;
use rand::Rng;
use tokio::sync::{oneshot, Mutex};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutStrategy {
    Fifo,
    Lifo,
    Random,
}

/// Creates and validates the handles a pool manages. One implementation per
/// server connection type.
#[async_trait]
pub trait ConnectionFactory<C>: Send + Sync {
    async fn create(&self) -> Result<C, BridgeError>;
    async fn validate(&self, conn: &C) -> bool;
}

pub struct PooledConnection<C> {
    pub handle: C,
    pub created_at: Instant,
    pub last_used: Instant,
    pub use_count: u64,
    pub is_overflow: bool,
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub size: usize,
    pub max_overflow: usize,
    pub strategy: CheckoutStrategy,
    pub checkout_timeout: Duration,
    pub validation_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: 4,
            max_overflow: 0,
            strategy: CheckoutStrategy::Fifo,
            checkout_timeout: Duration::from_secs(5),
            validation_interval: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PoolStats {
    pub available: usize,
    pub regular_in_use: usize,
    pub overflow_in_use: usize,
    pub waiters: usize,
}

struct Inner<C> {
    available: Vec<PooledConnection<C>>,
    regular_in_use: usize,
    overflow_in_use: usize,
    waiters: std::collections::VecDeque<oneshot::Sender<PooledConnection<C>>>,
    stopped: bool,
}

/// One pool per server. Holds only weak references to what it hands out —
/// lifecycle decisions belong to the Manager, never to the pool itself.
pub struct ConnectionPool<C> {
    name: String,
    config: PoolConfig,
    factory: Box<dyn ConnectionFactory<C> + Send + Sync>,
    inner: Mutex<Inner<C>>,
}

impl<C: Send + 'static> ConnectionPool<C> {
    pub fn new(name: impl Into<String>, config: PoolConfig, factory: Box<dyn ConnectionFactory<C> + Send + Sync>) -> Self {
        Self {
            name: name.into(),
            config,
            factory,
            inner: Mutex::new(Inner {
                available: Vec::new(),
                regular_in_use: 0,
                overflow_in_use: 0,
                waiters: std::collections::VecDeque::new(),
                stopped: false,
            }),
        }
    }

    pub async fn stats(&self) -> PoolStats {
        let inner = self.inner.lock().await;
        PoolStats {
            available: inner.available.len(),
            regular_in_use: inner.regular_in_use,
            overflow_in_use: inner.overflow_in_use,
            waiters: inner.waiters.len(),
        }
    }

    pub async fn checkout(&self) -> Result<PooledConnection<C>, BridgeError> {
        let deadline = Instant::now() + self.config.checkout_timeout;
        loop {
            let mut inner = self.inner.lock().await;
            if inner.stopped {
                return Err(BridgeError::Internal(format!("pool '{}' is stopped", self.name)));
            }

            if let Some(conn) = self.take_available(&mut inner) {
                inner.regular_in_use += 1;
                drop(inner);
                if self.factory.validate(&conn.handle).await {
                    return Ok(conn);
                }
                let mut inner = self.inner.lock().await;
                inner.regular_in_use -= 1;
                drop(inner);
                continue;
            }

            if inner.regular_in_use < self.config.size {
                inner.regular_in_use += 1;
                drop(inner);
                return self.create(false).await;
            }

            if inner.overflow_in_use < self.config.max_overflow {
                inner.overflow_in_use += 1;
                drop(inner);
                return self.create(true).await;
            }

            let (tx, rx) = oneshot::channel();
            inner.waiters.push_back(tx);
            drop(inner);

            let remaining = deadline.saturating_duration_since(Instant::now());
            return match tokio::time::timeout(remaining, rx).await {
                Ok(Ok(conn)) => Ok(conn),
                Ok(Err(_)) => Err(BridgeError::Internal(format!("pool '{}' closed", self.name))),
                Err(_) => Err(BridgeError::Timeout {
                    elapsed_ms: self.config.checkout_timeout.as_millis() as u64,
                }),
            };
        }
    }

    pub async fn checkin(&self, mut conn: PooledConnection<C>) {
        conn.last_used = Instant::now();
        conn.use_count += 1;
        let mut inner = self.inner.lock().await;

        let was_overflow = conn.is_overflow;
        if was_overflow {
            inner.overflow_in_use -= 1;
        } else {
            inner.regular_in_use -= 1;
        }

        while let Some(tx) = inner.waiters.pop_front() {
            match tx.send(conn) {
                Ok(()) => {
                    if was_overflow {
                        inner.overflow_in_use += 1;
                    } else {
                        inner.regular_in_use += 1;
                    }
                    return;
                }
                Err(returned) => {
                    conn = returned;
                    continue;
                }
            }
        }

        if was_overflow {
            info!(pool = %self.name, "pool_overflow_connection_destroyed");
            return;
        }
        inner.available.push(conn);
    }

    pub async fn stop(&self) {
        let mut inner = self.inner.lock().await;
        inner.stopped = true;
        inner.available.clear();
        inner.waiters.clear();
    }

    /// Validate every idle connection, destroying any that fail. Intended
    /// to run on a 30s periodic sweep.
    pub async fn validate_idle(&self) {
        let mut inner = self.inner.lock().await;
        let candidates = std::mem::take(&mut inner.available);
        drop(inner);

        let mut kept = Vec::with_capacity(candidates.len());
        for conn in candidates {
            if self.factory.validate(&conn.handle).await {
                kept.push(conn);
            } else {
                info!(pool = %self.name, "pool_idle_connection_invalidated");
            }
        }

        let mut inner = self.inner.lock().await;
        inner.available.extend(kept);
    }

    pub fn validation_interval(&self) -> Duration {
        self.config.validation_interval
    }

    async fn create(&self, is_overflow: bool) -> Result<PooledConnection<C>, BridgeError> {
        match self.factory.create().await {
            Ok(handle) => {
                let now = Instant::now();
                Ok(PooledConnection {
                    handle,
                    created_at: now,
                    last_used: now,
                    use_count: 0,
                    is_overflow,
                })
            }
            Err(e) => {
                let mut inner = self.inner.lock().await;
                if is_overflow {
                    inner.overflow_in_use -= 1;
                } else {
                    inner.regular_in_use -= 1;
                }
                Err(e)
            }
        }
    }

    /// Index-swap-remove for `random` (O(1)); `fifo`/`lifo` pop from the
    /// opposite ends of the same backing `Vec`.
    fn take_available(&self, inner: &mut Inner<C>) -> Option<PooledConnection<C>> {
        if inner.available.is_empty() {
            return None;
        }
        match self.config.strategy {
            CheckoutStrategy::Fifo => Some(inner.available.remove(0)),
            CheckoutStrategy::Lifo => inner.available.pop(),
            CheckoutStrategy::Random => {
                let idx = rand::thread_rng().gen_range(0..inner.available.len());
                Some(inner.available.swap_remove(idx))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct CountingFactory {
        next_id: AtomicU32,
        valid: std::sync::atomic::AtomicBool,
    }

    impl CountingFactory {
        fn new() -> Self {
            Self {
                next_id: AtomicU32::new(0),
                valid: std::sync::atomic::AtomicBool::new(true),
            }
        }
    }

    #[async_trait]
    impl ConnectionFactory<u32> for CountingFactory {
        async fn create(&self) -> Result<u32, BridgeError> {
            Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
        }

        async fn validate(&self, _conn: &u32) -> bool {
            self.valid.load(Ordering::SeqCst)
        }
    }

    fn pool(size: usize, overflow: usize, strategy: CheckoutStrategy) -> ConnectionPool<u32> {
        ConnectionPool::new(
            "demo",
            PoolConfig {
                size,
                max_overflow: overflow,
                strategy,
                checkout_timeout: Duration::from_millis(100),
                validation_interval: Duration::from_secs(30),
            },
            Box::new(CountingFactory::new()),
        )
    }

    #[tokio::test]
    async fn checkout_within_size_succeeds() {
        let pool = pool(2, 0, CheckoutStrategy::Fifo);
        let a = pool.checkout().await.unwrap();
        let b = pool.checkout().await.unwrap();
        assert_ne!(a.handle, b.handle);
    }

    #[tokio::test]
    async fn blocks_past_size_with_no_overflow_until_timeout() {
        let pool = pool(1, 0, CheckoutStrategy::Fifo);
        let _held = pool.checkout().await.unwrap();
        let err = pool.checkout().await.unwrap_err();
        assert!(matches!(err, BridgeError::Timeout { .. }));
    }

    #[tokio::test]
    async fn checkin_wakes_a_waiter() {
        let pool = Arc::new(pool(1, 0, CheckoutStrategy::Fifo));
        let held = pool.checkout().await.unwrap();

        let waiter_pool = pool.clone();
        let waiter = tokio::spawn(async move { waiter_pool.checkout().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        pool.checkin(held).await;

        let result = waiter.await.unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn overflow_connection_created_past_size() {
        let pool = pool(1, 1, CheckoutStrategy::Fifo);
        let _a = pool.checkout().await.unwrap();
        let b = pool.checkout().await.unwrap();
        assert!(b.is_overflow);
        let stats = pool.stats().await;
        assert_eq!(stats.regular_in_use, 1);
        assert_eq!(stats.overflow_in_use, 1);
    }

    #[tokio::test]
    async fn overflow_connection_destroyed_on_checkin() {
        let pool = pool(1, 1, CheckoutStrategy::Fifo);
        let _a = pool.checkout().await.unwrap();
        let b = pool.checkout().await.unwrap();
        pool.checkin(b).await;
        let stats = pool.stats().await;
        assert_eq!(stats.overflow_in_use, 0);
        assert_eq!(stats.available, 0);
    }

    #[tokio::test]
    async fn invariant_in_use_plus_available_never_exceeds_capacity() {
        let pool = pool(2, 1, CheckoutStrategy::Random);
        let a = pool.checkout().await.unwrap();
        let b = pool.checkout().await.unwrap();
        let c = pool.checkout().await.unwrap();
        let stats = pool.stats().await;
        assert!(stats.regular_in_use + stats.overflow_in_use + stats.available <= 2 + 1);
        pool.checkin(a).await;
        pool.checkin(b).await;
        pool.checkin(c).await;
    }

    #[tokio::test]
    async fn stop_rejects_further_checkouts() {
        let pool = pool(2, 0, CheckoutStrategy::Fifo);
        pool.stop().await;
        let err = pool.checkout().await.unwrap_err();
        assert!(matches!(err, BridgeError::Internal(_)));
    }

    #[tokio::test]
    async fn validate_idle_destroys_invalid_connections() {
        let factory = Arc::new(CountingFactory::new());
        let pool = ConnectionPool::new(
            "demo",
            PoolConfig {
                size: 1,
                max_overflow: 0,
                strategy: CheckoutStrategy::Fifo,
                checkout_timeout: Duration::from_millis(50),
                validation_interval: Duration::from_secs(30),
            },
            Box::new(ProxyFactory(factory.clone())),
        );
        let conn = pool.checkout().await.unwrap();
        pool.checkin(conn).await;
        factory.valid.store(false, Ordering::SeqCst);
        pool.validate_idle().await;
        assert_eq!(pool.stats().await.available, 0);
    }

    struct ProxyFactory(Arc<CountingFactory>);

    #[async_trait]
    impl ConnectionFactory<u32> for ProxyFactory {
        async fn create(&self) -> Result<u32, BridgeError> {
            self.0.create().await
        }

        async fn validate(&self, conn: &u32) -> bool {
            self.0.validate(conn).await
        }
    }
}
