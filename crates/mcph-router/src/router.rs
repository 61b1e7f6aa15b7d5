//! Capability table and task dispatch: `capability -> [server]`
//! mapping built from discovery, tie-broken deterministically, and a
//! declarative `(capability, task_type) -> tool name` mapping table.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use mcph_core::{BridgeError, RequestId, ServerId};
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::info;

use crate::caller::JsonRpcCaller;
use crate::tools::{ToolDescriptor, ToolsListResult};

#[derive(Debug, Clone)]
pub struct CapabilityEntry {
    pub server_id: ServerId,
    pub discovered_at: DateTime<Utc>,
    pub tools: Vec<ToolDescriptor>,
}

/// Fields only meaningful to routing, stripped before the call reaches the
/// downstream server.
const ROUTING_ONLY_FIELDS: &[&str] = &["_capability", "_task_type"];

#[derive(Default)]
pub struct CapabilityRouter {
    capabilities: RwLock<HashMap<String, Vec<CapabilityEntry>>>,
    /// `(capability, task_type) -> tool name`.
    tool_mapping: RwLock<HashMap<(String, String), String>>,
    /// `package name -> capability list`, for config-based capability
    /// derivation (the declarative alternative to the naming convention).
    package_capabilities: RwLock<HashMap<String, Vec<String>>>,
}

impl CapabilityRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register_tool_mapping(&self, capability: impl Into<String>, task_type: impl Into<String>, tool_name: impl Into<String>) {
        self.tool_mapping
            .write()
            .await
            .insert((capability.into(), task_type.into()), tool_name.into());
    }

    pub async fn register_package_capabilities(&self, package: impl Into<String>, capabilities: Vec<String>) {
        self.package_capabilities.write().await.insert(package.into(), capabilities);
    }

    /// Capability derivation option (b): a declarative name convention,
    /// applied when no config-based mapping exists for `package`. Takes the
    /// segment before the first `.` as the capability name, matching the
    /// dotted `capability.action` tool-naming convention MCP servers use.
    pub async fn derive_capabilities(&self, package: &str, server_metadata_name: &str) -> Vec<String> {
        if let Some(caps) = self.package_capabilities.read().await.get(package) {
            return caps.clone();
        }
        let convention = server_metadata_name
            .split('.')
            .next()
            .unwrap_or(server_metadata_name)
            .to_string();
        vec![convention]
    }

    /// Runs `initialize` then `tools/list` against a running, uninitialized
    /// server and caches the result under each of its capabilities.
    pub async fn discover(
        &self,
        server_id: &ServerId,
        capabilities: &[String],
        caller: &dyn JsonRpcCaller,
    ) -> Result<Vec<ToolDescriptor>, BridgeError> {
        caller
            .call(server_id, mcph_protocol::methods::INITIALIZE, initialize_params())
            .await?;

        let result = caller
            .call(server_id, mcph_protocol::methods::TOOLS_LIST, Value::Object(Map::new()))
            .await?;
        let parsed: ToolsListResult = serde_json::from_value(result).map_err(|e| BridgeError::Protocol {
            code: -32700,
            message: format!("malformed tools/list result: {e}"),
        })?;

        let entry = CapabilityEntry {
            server_id: server_id.clone(),
            discovered_at: Utc::now(),
            tools: parsed.tools.clone(),
        };

        let mut table = self.capabilities.write().await;
        for capability in capabilities {
            let bucket = table.entry(capability.clone()).or_default();
            bucket.retain(|e| e.server_id != *server_id);
            bucket.push(entry.clone());
        }
        info!(server = %server_id, capabilities = ?capabilities, tools = parsed.tools.len(), "router_discovery_completed");
        Ok(parsed.tools)
    }

    pub async fn remove_server(&self, server_id: &ServerId) {
        let mut table = self.capabilities.write().await;
        for bucket in table.values_mut() {
            bucket.retain(|e| e.server_id != *server_id);
        }
    }

    /// Most-recently-discovered first, then lowest id lexically.
    async fn pick_server(&self, capability: &str) -> Result<ServerId, BridgeError> {
        let table = self.capabilities.read().await;
        let bucket = table
            .get(capability)
            .filter(|b| !b.is_empty())
            .ok_or_else(|| BridgeError::CapabilityNotFound(capability.to_string()))?;

        let winner = bucket
            .iter()
            .max_by(|a, b| {
                a.discovered_at
                    .cmp(&b.discovered_at)
                    .then_with(|| b.server_id.cmp(&a.server_id))
            })
            .expect("bucket checked non-empty above");
        Ok(winner.server_id.clone())
    }

    pub async fn execute_task(
        &self,
        capability: &str,
        task_type: &str,
        params: Value,
        caller: &dyn JsonRpcCaller,
    ) -> Result<Value, BridgeError> {
        let server_id = self.pick_server(capability).await?;

        let tool_name = self
            .tool_mapping
            .read()
            .await
            .get(&(capability.to_string(), task_type.to_string()))
            .cloned()
            .ok_or_else(|| BridgeError::UnknownTaskType {
                capability: capability.to_string(),
                task_type: task_type.to_string(),
            })?;

        let sanitized = strip_routing_fields(params);
        let call_params = serde_json::json!({
            "name": tool_name,
            "arguments": sanitized,
        });

        caller.call(&server_id, mcph_protocol::methods::TOOLS_CALL, call_params).await
    }
}

fn strip_routing_fields(params: Value) -> Value {
    match params {
        Value::Object(mut map) => {
            for field in ROUTING_ONLY_FIELDS {
                map.remove(*field);
            }
            Value::Object(map)
        }
        other => other,
    }
}

fn initialize_params() -> Value {
    serde_json::to_value(mcph_protocol::InitializeParams::new("mcph-bridge", env!("CARGO_PKG_VERSION")))
        .expect("InitializeParams always serializes")
}
