//! The Server Manager: single owner of the server table,
//! mutated only through its mailbox. Wires together the spawner, transport,
//! pool, resilience, health, and resource crates per managed server.

pub mod command;
pub mod dispatch;
pub mod entry;
pub mod health_sources;
pub mod manager;
pub mod permit;
pub mod restart;

pub use command::{Command, ConfigPatch, ConnectionHandle, StopOptions};
pub use entry::ManagedServer;
pub use manager::{Manager, ManagerDeps};
pub use restart::CrashReason;
