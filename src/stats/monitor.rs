use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::health::HealthState;
use crate::config::ANOMALY_RATIO;
use crate::error::{AppError, Result};
use crate::state::PerformanceStore;
use crate::stats::periodic::run_periodic;
use crate::types::mean_elapsed_ms;

/// An upstream whose recent average latency is disproportionately high
/// compared to the aggregator's own.
#[derive(Debug, Clone, PartialEq)]
pub struct LatencyAnomaly {
    pub key: String,
    pub upstream_avg_ms: f64,
    pub aggregator_avg_ms: f64,
}

/// Background task comparing each upstream's windowed latency to the
/// aggregator's windowed latency. Log-only: nothing is remediated.
pub struct AnomalyMonitor {
    store: Arc<PerformanceStore>,
    health: Arc<HealthState>,
    aggregator_name: String,
    analysis_period: Duration,
    check_interval: Duration,
}

impl AnomalyMonitor {
    pub fn new(
        store: Arc<PerformanceStore>,
        health: Arc<HealthState>,
        aggregator_name: String,
        analysis_period: Duration,
        check_interval: Duration,
    ) -> Self {
        Self { store, health, aggregator_name, analysis_period, check_interval }
    }

    pub async fn run(self, cancel: CancellationToken) {
        let this = &self;
        run_periodic("anomaly monitor", self.check_interval, true, cancel, move || async move {
            for anomaly in this.analyze()? {
                warn!(
                    key = %anomaly.key,
                    upstream_avg_ms = anomaly.upstream_avg_ms,
                    aggregator_avg_ms = anomaly.aggregator_avg_ms,
                    "Performance anomaly for {}: average {:.1}ms exceeds aggregator average {:.1}ms by over 50%",
                    anomaly.key, anomaly.upstream_avg_ms, anomaly.aggregator_avg_ms,
                );
            }
            Ok(())
        })
        .await;
    }

    fn window_start(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let period = chrono::Duration::from_std(self.analysis_period).map_err(|e| {
            AppError::TimeRange(format!("analysis period {:?}: {e}", self.analysis_period))
        })?;
        now.checked_sub_signed(period).ok_or_else(|| {
            AppError::TimeRange(format!("analysis period {:?} reaches before the epoch range", self.analysis_period))
        })
    }

    fn is_aggregator(&self, key: &str) -> bool {
        key.eq_ignore_ascii_case(&self.aggregator_name)
    }

    /// One analysis pass. Returns no anomalies when the aggregator has no
    /// positive baseline inside the window.
    pub fn analyze(&self) -> Result<Vec<LatencyAnomaly>> {
        let now = self.store.now();
        let since = self.window_start(now)?;

        let baseline = mean_elapsed_ms(&self.store.records_since(&self.aggregator_name, since));
        let aggregator_avg_ms = match baseline {
            Some(avg) if avg > 0.0 => avg,
            _ => {
                debug!(
                    aggregator = %self.aggregator_name,
                    "Aggregator baseline is insufficient to compare, skipping analysis"
                );
                return Ok(Vec::new());
            }
        };

        let mut anomalies = Vec::new();
        for key in self.store.all_keys() {
            if self.is_aggregator(&key) {
                continue;
            }
            let Some(upstream_avg_ms) = mean_elapsed_ms(&self.store.records_since(&key, since)) else {
                debug!(key = %key, "No recent data for upstream {key}");
                continue;
            };

            info!(
                key = %key,
                upstream_avg_ms,
                aggregator_avg_ms,
                "Analysis for {key}: aggregator avg = {aggregator_avg_ms:.1}ms, upstream avg = {upstream_avg_ms:.1}ms",
            );

            if upstream_avg_ms > aggregator_avg_ms * ANOMALY_RATIO {
                anomalies.push(LatencyAnomaly { key, upstream_avg_ms, aggregator_avg_ms });
            }
        }

        self.health.record_analysis(anomalies.len(), now);
        Ok(anomalies)
    }
}
