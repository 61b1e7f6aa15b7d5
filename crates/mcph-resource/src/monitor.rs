//! Peak-memory sampling for a single process: poll every 500ms, track the
//! high-water mark, stop when the process exits.

use std::time::Duration;

use sysinfo::{Pid, ProcessesToUpdate, System};

const POLL_INTERVAL: Duration = Duration::from_millis(500);

pub struct MemoryMonitor {
    handle: tokio::task::JoinHandle<u64>,
}

impl MemoryMonitor {
    pub fn start(pid: u32) -> Self {
        let handle = tokio::spawn(async move {
            let mut sys = System::new();
            let sysinfo_pid = Pid::from_u32(pid);
            let mut peak_mb: u64 = 0;

            loop {
                tokio::time::sleep(POLL_INTERVAL).await;
                sys.refresh_processes(ProcessesToUpdate::Some(&[sysinfo_pid]), true);
                match sys.process(sysinfo_pid) {
                    Some(process) => {
                        let mem_mb = process.memory() / 1024 / 1024;
                        peak_mb = peak_mb.max(mem_mb);
                    }
                    None => break,
                }
            }
            peak_mb
        });

        Self { handle }
    }

    /// Cancel monitoring early (e.g. the Manager is force-killing the
    /// server); the peak observed so far is discarded.
    pub fn abort(self) {
        self.handle.abort();
    }

    /// Await the monitor's own termination (the process exited) and return
    /// the peak it observed.
    pub async fn join(self) -> u64 {
        self.handle.await.unwrap_or(0)
    }
}
