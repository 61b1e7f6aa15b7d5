//! The seam between the router and the resilient JSON-RPC path it dispatches
//! through. The router never touches a transport or connection pool
//! directly — it asks a `JsonRpcCaller` to make the round trip.

use async_trait::async_trait;
use mcph_core::{BridgeError, ServerId};
use serde_json::Value;

#[async_trait]
pub trait JsonRpcCaller: Send + Sync {
    async fn call(&self, server_id: &ServerId, method: &str, params: Value) -> Result<Value, BridgeError>;
}
