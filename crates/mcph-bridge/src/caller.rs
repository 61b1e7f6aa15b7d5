//! Adapts the Manager's resilient `send_request` into the narrow
//! `JsonRpcCaller` seam the router dispatches through, so the router never
//! has to know about the Manager's mailbox, breaker, or pool.

use async_trait::async_trait;
use mcph_core::{BridgeError, ServerId};
use mcph_manager::Manager;
use mcph_router::JsonRpcCaller;
use serde_json::Value;

pub struct ManagerCaller {
    manager: Manager,
}

impl ManagerCaller {
    pub fn new(manager: Manager) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl JsonRpcCaller for ManagerCaller {
    async fn call(&self, server_id: &ServerId, method: &str, params: Value) -> Result<Value, BridgeError> {
        self.manager.send_request(server_id.clone(), method, params).await
    }
}
