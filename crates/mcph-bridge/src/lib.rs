//! Top-level facade over the whole process bridge: spawner, transport,
//! pool, resilience, health, resource tracking, the capability router, and
//! the Manager that owns every running server. `Bridge` is the one type a
//! caller needs.

mod bridge;
mod caller;
mod config;

pub use bridge::Bridge;
pub use caller::ManagerCaller;
pub use config::{BridgeConfig, DlqFileConfig, PoolStrategyToml, ResilienceFileConfig, ResourceFileConfig, ToolMappingConfig};

pub use mcph_core::BridgeError;
pub use mcph_manager::{ConfigPatch, ConnectionHandle, StopOptions};
pub use mcph_resilience::{DlqEntry, DlqStats};
pub use mcph_router::{CapabilityEntry, CapabilityRouter, ToolDescriptor};
