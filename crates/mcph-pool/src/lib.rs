//! Bounded, reusable connection handles to a single server.

pub mod pool;

pub use pool::{CheckoutStrategy, ConnectionFactory, ConnectionPool, PoolConfig, PoolStats, PooledConnection};
