//! Capability routing and task dispatch: maintains
//! `capability -> [server]` plus per-server tool caches, and translates
//! `(capability, task_type)` calls into `tools/call` invocations.

pub mod caller;
pub mod router;
pub mod tools;

pub use caller::JsonRpcCaller;
pub use router::{CapabilityEntry, CapabilityRouter};
pub use tools::{ToolDescriptor, ToolsListResult};
