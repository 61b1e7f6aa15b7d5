//! Spawns a configured server as an OS process: runs the
//! resource guard, resolves the command line, and hands back piped stdio.

use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use mcph_core::{BridgeError, ServerConfig, ServerType};
use mcph_resource::ResourceGuard;
use tokio::process::{Child, Command};
use tracing::info;

use crate::resolve::resolve_package;

pub struct SpawnedServer {
    pub child: Child,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
}

pub struct SpawnerConfig {
    pub install_root: PathBuf,
}

impl Default for SpawnerConfig {
    fn default() -> Self {
        Self {
            install_root: std::env::temp_dir().join("mcp_servers"),
        }
    }
}

pub struct Spawner {
    config: SpawnerConfig,
    resource_guard: Arc<ResourceGuard>,
}

impl Spawner {
    pub fn new(config: SpawnerConfig, resource_guard: Arc<ResourceGuard>) -> Self {
        Self {
            config,
            resource_guard,
        }
    }

    pub async fn spawn(&self, config: &ServerConfig) -> Result<SpawnedServer, BridgeError> {
        self.resource_guard.check_availability(&config.capability).await?;

        let (program, full_args) = self.resolve_command_line(config).await?;

        let mut cmd = Command::new(&program);
        cmd.args(&full_args)
            .envs(config.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &config.working_dir {
            cmd.current_dir(dir);
        }

        // Detach into its own session so killing the bridge doesn't orphan
        // the child into our own process group.
        unsafe {
            cmd.pre_exec(|| {
                libc::setsid();
                Ok(())
            });
        }

        let mut child = cmd.spawn().map_err(|source| BridgeError::SpawnFailed {
            server: config.id.to_string(),
            source,
        })?;

        let pid = child.id().ok_or_else(|| BridgeError::SpawnFailed {
            server: config.id.to_string(),
            source: std::io::Error::other("child exited before pid could be read"),
        })?;

        info!(server = %config.id, %pid, program = %program, "spawner_process_started");

        Ok(SpawnedServer {
            child,
            pid,
            started_at: Utc::now(),
        })
    }

    async fn resolve_command_line(&self, config: &ServerConfig) -> Result<(String, Vec<String>), BridgeError> {
        match &config.server_type {
            ServerType::Internal { command, args } => Ok((command.clone(), args.clone())),
            ServerType::External {
                command,
                args,
                package: None,
            } => Ok((command.clone(), args.clone())),
            ServerType::External {
                command: _,
                args,
                package: Some(package),
            } => {
                // Once a package is resolved to a concrete executable, the
                // configured `command` (e.g. "npx") is superseded by either
                // the executable itself or its interpreter.
                let resolved = resolve_package(&self.config.install_root, package).await?;
                let executable = resolved.executable.to_string_lossy().into_owned();
                let (program, mut full_args) = match resolved.interpreter_prefix.split_first() {
                    Some((interpreter, rest)) => {
                        let mut a = rest.to_vec();
                        a.push(executable);
                        (interpreter.clone(), a)
                    }
                    None => (executable, Vec::new()),
                };
                full_args.extend(args.iter().cloned());
                Ok((program, full_args))
            }
            ServerType::Custom { .. } => Err(BridgeError::Configuration {
                server: config.id.to_string(),
                reason: "custom start functions have no external process to spawn".into(),
            }),
        }
    }
}
