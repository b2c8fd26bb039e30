//! Shared health state for the /health endpoint.
//! Updated by the retention sweeper and the anomaly monitor.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Background-loop counters. Written by the loops, read by the API.
#[derive(Default)]
pub struct HealthState {
    sweeps_completed: AtomicU64,
    samples_trimmed: AtomicU64,
    /// Nanosecond timestamp of the last finished sweep (0 = none).
    last_sweep_at_ns: AtomicU64,
    analyses_completed: AtomicU64,
    anomalies_detected: AtomicU64,
    /// Nanosecond timestamp of the last finished analysis (0 = none).
    last_analysis_at_ns: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub sweeps_completed: u64,
    pub samples_trimmed: u64,
    pub last_sweep_at_ns: u64,
    pub analyses_completed: u64,
    pub anomalies_detected: u64,
    pub last_analysis_at_ns: u64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sweep(&self, trimmed: usize, at: DateTime<Utc>) {
        self.sweeps_completed.fetch_add(1, Ordering::Relaxed);
        self.samples_trimmed.fetch_add(trimmed as u64, Ordering::Relaxed);
        self.last_sweep_at_ns.store(unix_ns(at), Ordering::Relaxed);
    }

    pub fn record_analysis(&self, anomalies: usize, at: DateTime<Utc>) {
        self.analyses_completed.fetch_add(1, Ordering::Relaxed);
        self.anomalies_detected.fetch_add(anomalies as u64, Ordering::Relaxed);
        self.last_analysis_at_ns.store(unix_ns(at), Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            sweeps_completed: self.sweeps_completed.load(Ordering::Relaxed),
            samples_trimmed: self.samples_trimmed.load(Ordering::Relaxed),
            last_sweep_at_ns: self.last_sweep_at_ns.load(Ordering::Relaxed),
            analyses_completed: self.analyses_completed.load(Ordering::Relaxed),
            anomalies_detected: self.anomalies_detected.load(Ordering::Relaxed),
            last_analysis_at_ns: self.last_analysis_at_ns.load(Ordering::Relaxed),
        }
    }
}

/// Outside the i64 nanosecond range (or before 1970) reads as 0 = none.
fn unix_ns(at: DateTime<Utc>) -> u64 {
    at.timestamp_nanos_opt()
        .and_then(|ns| u64::try_from(ns).ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamps_come_from_the_caller() {
        let health = HealthState::new();
        let at = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        health.record_sweep(3, at);
        health.record_analysis(1, at);

        let snapshot = health.snapshot();
        assert_eq!(snapshot.samples_trimmed, 3);
        assert_eq!(snapshot.last_sweep_at_ns, 1_735_732_800_000_000_000);
        assert_eq!(snapshot.last_analysis_at_ns, snapshot.last_sweep_at_ns);
    }

    #[test]
    fn pre_epoch_timestamp_reads_as_none() {
        let health = HealthState::new();
        health.record_sweep(0, Utc.with_ymd_and_hms(1969, 12, 31, 0, 0, 0).unwrap());
        assert_eq!(health.snapshot().last_sweep_at_ns, 0);
    }
}
