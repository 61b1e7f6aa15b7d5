//! Rolling per-capability memory usage history, used to estimate a new
//! spawn's footprint before resources are committed. A fixed-size sample
//! window scoped to capability name rather than tool name.

use std::collections::HashMap;

const SAMPLE_WINDOW: usize = 20;

#[derive(Debug, Default, Clone)]
pub struct UsageStats {
    samples: HashMap<String, Vec<u64>>,
}

impl UsageStats {
    pub fn record(&mut self, capability: &str, peak_mb: u64) {
        let entry = self.samples.entry(capability.to_string()).or_default();
        entry.push(peak_mb);
        if entry.len() > SAMPLE_WINDOW {
            entry.remove(0);
        }
    }

    pub fn p95_estimate(&self, capability: &str) -> Option<u64> {
        let samples = self.samples.get(capability)?;
        if samples.is_empty() {
            return None;
        }
        let mut sorted = samples.clone();
        sorted.sort_unstable();
        let idx = ((sorted.len() as f64) * 0.95).ceil() as usize;
        let idx = idx.saturating_sub(1).min(sorted.len() - 1);
        Some(sorted[idx])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_history_returns_none() {
        let stats = UsageStats::default();
        assert_eq!(stats.p95_estimate("echo"), None);
    }

    #[test]
    fn p95_tracks_high_tail_over_window() {
        let mut stats = UsageStats::default();
        for mb in [100, 120, 110, 130, 900] {
            stats.record("echo", mb);
        }
        assert_eq!(stats.p95_estimate("echo"), Some(900));
    }

    #[test]
    fn window_drops_oldest_sample() {
        let mut stats = UsageStats::default();
        for _ in 0..SAMPLE_WINDOW {
            stats.record("echo", 10);
        }
        stats.record("echo", 10_000);
        // still 20 samples, oldest 10 evicted, tail dominated by the spike
        assert_eq!(stats.p95_estimate("echo"), Some(10_000));
    }
}
