//! Lifetime latency histogram for inbound aggregation requests.
//! Complements the windowed per-key store with tail percentiles.

use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;

/// Shared latency stats. The timing middleware records, the API reads.
/// Values stored in microseconds.
pub struct LatencyStats {
    inner: Mutex<hdrhistogram::Histogram<u64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencyPercentiles {
    pub samples: u64,
    pub p50_ms: Option<f64>,
    pub p95_ms: Option<f64>,
    pub p99_ms: Option<f64>,
}

impl LatencyStats {
    /// Create a new histogram. Tracks 1us to 100s, 3 significant figures.
    pub fn new() -> Self {
        let histogram = hdrhistogram::Histogram::new_with_bounds(1, 100_000_000, 3)
            .expect("valid histogram bounds");
        Self {
            inner: Mutex::new(histogram),
        }
    }

    pub fn record(&self, d: Duration) {
        let us = d.as_micros().clamp(1, 100_000_000) as u64;
        if let Ok(mut h) = self.inner.lock() {
            let _ = h.record(us);
        }
    }

    pub fn percentiles(&self) -> LatencyPercentiles {
        let empty = LatencyPercentiles { samples: 0, p50_ms: None, p95_ms: None, p99_ms: None };
        let Ok(h) = self.inner.lock() else {
            return empty;
        };
        if h.len() == 0 {
            return empty;
        }
        let ms = |q: f64| Some(h.value_at_quantile(q) as f64 / 1_000.0);
        LatencyPercentiles {
            samples: h.len(),
            p50_ms: ms(0.5),
            p95_ms: ms(0.95),
            p99_ms: ms(0.99),
        }
    }
}

impl Default for LatencyStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_histogram_reports_no_percentiles() {
        let stats = LatencyStats::new();
        let p = stats.percentiles();
        assert_eq!(p.samples, 0);
        assert!(p.p50_ms.is_none());
    }

    #[test]
    fn percentiles_are_reported_in_milliseconds() {
        let stats = LatencyStats::new();
        for ms in 1..=100u64 {
            stats.record(Duration::from_millis(ms));
        }
        let p = stats.percentiles();
        assert_eq!(p.samples, 100);
        let p50 = p.p50_ms.unwrap();
        let p99 = p.p99_ms.unwrap();
        assert!((49.0..=51.0).contains(&p50), "p50={p50}");
        assert!((98.0..=100.5).contains(&p99), "p99={p99}");
    }
}
