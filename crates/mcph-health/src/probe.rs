//! Per-server-type probe traits and the `tcp`/`websocket` probes that need no
//! caller-supplied source.

use std::time::Duration;

use async_trait::async_trait;
use mcph_core::{BridgeError, HealthStatus};

/// Snapshot the `basic` check reasons about: process liveness plus the two
/// quantities that demote a live process to `degraded`.
#[derive(Debug, Clone, Copy)]
pub struct BasicSample {
    pub alive: bool,
    pub queue_length: usize,
    pub memory_mb: u64,
}

/// Supplies a `basic` sample for one registered server. Implemented by
/// whatever owns the real process/pool/tracker state; the monitor only
/// classifies, it never collects on its own.
#[async_trait]
pub trait BasicSampler: Send + Sync {
    async fn sample(&self) -> BasicSample;
}

/// Round-trips a `ping` JSON-RPC call over a server's live transport.
#[async_trait]
pub trait StdioPinger: Send + Sync {
    async fn ping(&self, timeout: Duration) -> Result<(), BridgeError>;
}

/// A caller-registered probe function for `health_check.type = custom`.
#[async_trait]
pub trait CustomProbe: Send + Sync {
    async fn check(&self) -> Result<HealthStatus, BridgeError>;
}

pub fn classify_basic(sample: BasicSample) -> HealthStatus {
    if !sample.alive {
        return HealthStatus::Unhealthy;
    }
    if sample.queue_length > 1000 || sample.memory_mb > 100 {
        return HealthStatus::Degraded;
    }
    HealthStatus::Healthy
}

pub async fn probe_tcp(port: u16, timeout: Duration) -> HealthStatus {
    match tokio::time::timeout(timeout, tokio::net::TcpStream::connect(("127.0.0.1", port))).await {
        Ok(Ok(_stream)) => HealthStatus::Healthy,
        _ => HealthStatus::Unhealthy,
    }
}

pub async fn probe_websocket(port: u16, timeout: Duration) -> HealthStatus {
    let url = format!("ws://127.0.0.1:{port}/");
    match tokio::time::timeout(timeout, tokio_tungstenite::connect_async(url)).await {
        Ok(Ok(_)) => HealthStatus::Healthy,
        _ => HealthStatus::Unhealthy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dead_process_is_unhealthy_regardless_of_load() {
        let sample = BasicSample {
            alive: false,
            queue_length: 0,
            memory_mb: 0,
        };
        assert_eq!(classify_basic(sample), HealthStatus::Unhealthy);
    }

    #[test]
    fn overloaded_queue_is_degraded() {
        let sample = BasicSample {
            alive: true,
            queue_length: 1001,
            memory_mb: 1,
        };
        assert_eq!(classify_basic(sample), HealthStatus::Degraded);
    }

    #[test]
    fn high_memory_is_degraded() {
        let sample = BasicSample {
            alive: true,
            queue_length: 0,
            memory_mb: 101,
        };
        assert_eq!(classify_basic(sample), HealthStatus::Degraded);
    }

    #[test]
    fn quiet_live_process_is_healthy() {
        let sample = BasicSample {
            alive: true,
            queue_length: 3,
            memory_mb: 40,
        };
        assert_eq!(classify_basic(sample), HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn tcp_probe_fails_against_closed_port() {
        // Port 1 is a reserved low port almost never bound in test sandboxes.
        let status = probe_tcp(1, Duration::from_millis(200)).await;
        assert_eq!(status, HealthStatus::Unhealthy);
    }
}
