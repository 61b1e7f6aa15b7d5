//! Shared types for the MCP process bridge: ids, the error taxonomy, and the
//! data-model structs every other crate in the workspace builds on.

pub mod config;
pub mod error;
pub mod ids;
pub mod install;
pub mod process;

pub use config::{HealthCheckConfig, HealthCheckType, RestartPolicy, ServerConfig, ServerType};
pub use error::BridgeError;
pub use ids::{RequestId, ServerId};
pub use install::InstallRecord;
pub use process::{HealthStatus, ServerMetrics, ServerProcess, ServerStatus};
