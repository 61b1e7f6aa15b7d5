//! Per-process memory accounting, pre-spawn availability checks, and
//! zombie reaping.

pub mod guard;
pub mod monitor;
pub mod stats;
pub mod tracker;

pub use guard::{ResourceGuard, ResourceGuardConfig};
pub use monitor::MemoryMonitor;
pub use stats::UsageStats;
pub use tracker::{ResourceTracker, ResourceViolation, SweepReport};
