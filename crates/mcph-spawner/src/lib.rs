//! Turns a `ServerConfig` into a running OS process: package resolution,
//! command-line assembly, and the actual `spawn()`.

pub mod resolve;
pub mod spawn;

pub use resolve::{resolve_package, ResolvedPackage};
pub use spawn::{SpawnedServer, Spawner, SpawnerConfig};
