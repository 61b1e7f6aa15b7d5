//! A connection pool over stdio doesn't hand out separate OS connections —
//! there is exactly one transport per child. `ConnectionPool<()>` is reused
//! here purely as a bounded concurrency limiter: a "connection" is a permit
//! to have one in-flight request outstanding against the shared transport.

use async_trait::async_trait;
use mcph_core::BridgeError;
use mcph_pool::ConnectionFactory;

pub struct PermitFactory;

#[async_trait]
impl ConnectionFactory<()> for PermitFactory {
    async fn create(&self) -> Result<(), BridgeError> {
        Ok(())
    }

    async fn validate(&self, _conn: &()) -> bool {
        true
    }
}
