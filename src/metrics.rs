//! Per-worker request metrics used by the classifier multiplexer to compute
//! success rates and weighted-round-robin weights.

use std::time::Instant;

const MAX_LATENCY_SECONDS: f64 = 120.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct MetricSnapshot {
    pub requests: u64,
    pub success: u64,
    pub failure: u64,
    pub latency_ms: f64,
}

impl MetricSnapshot {
    pub fn success_rate(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.success as f64 / self.requests as f64
        }
    }

    pub fn avg_latency_ms(&self) -> f64 {
        if self.success == 0 {
            0.0
        } else {
            self.latency_ms / self.success as f64
        }
    }
}

#[derive(Debug, Default)]
pub struct Metric {
    success: u64,
    failure: u64,
    latency_ms: f64,
}

impl Metric {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one completed call. `duration` is clamped to
    /// `MAX_LATENCY_SECONDS` so a single pathological hang can't skew the
    /// rolling average used for worker weighting.
    pub fn record(&mut self, started_at: Instant, success: bool) {
        let duration = started_at.elapsed().as_secs_f64().min(MAX_LATENCY_SECONDS);
        if success {
            self.success += 1;
            self.latency_ms += duration * 1000.0;
        } else {
            self.failure += 1;
        }
    }

    pub fn snapshot(&self) -> MetricSnapshot {
        MetricSnapshot {
            requests: self.success + self.failure,
            success: self.success,
            failure: self.failure,
            latency_ms: self.latency_ms,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn snapshot_computes_success_rate_and_avg_latency() {
        let mut m = Metric::new();
        let start = Instant::now();
        sleep(Duration::from_millis(5));
        m.record(start, true);
        m.record(Instant::now(), false);
        let snap = m.snapshot();
        assert_eq!(snap.requests, 2);
        assert!((snap.success_rate() - 0.5).abs() < 1e-9);
        assert!(snap.avg_latency_ms() > 0.0);
    }
}
