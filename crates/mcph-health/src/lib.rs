//! Per-server scheduled health checks: basic liveness, stdio
//! ping, TCP, websocket, and custom probes, reported to the Manager.

pub mod monitor;
pub mod probe;

pub use monitor::{HealthEvent, HealthMonitor, ProbeSources};
pub use probe::{BasicSample, BasicSampler, CustomProbe, StdioPinger};
