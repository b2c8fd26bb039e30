use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::clock::Clock;
use crate::config::TierThresholds;
use crate::state::PerformanceStore;
use crate::stats::cache::ExpiringCell;
use crate::types::{ApiStatistics, PerformanceTier, TieredStatistics};

/// Read side of the performance store: per-key summaries bucketed by tier.
///
/// Results are memoised for `cache_ttl`; new samples do not invalidate the
/// cached view, so readers may see data up to one TTL old.
pub struct StatisticsService {
    store: Arc<PerformanceStore>,
    thresholds: TierThresholds,
    cached: ExpiringCell<TieredStatistics>,
}

impl StatisticsService {
    pub fn new(
        store: Arc<PerformanceStore>,
        thresholds: TierThresholds,
        cache_ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            thresholds,
            cached: ExpiringCell::new(cache_ttl, clock),
        }
    }

    pub fn get_statistics(&self) -> Arc<TieredStatistics> {
        self.cached.get_or_compute(|| self.compute_statistics())
    }

    /// Uncached computation over everything currently retained.
    pub fn compute_statistics(&self) -> TieredStatistics {
        let mut result = TieredStatistics::default();

        for key in self.store.all_keys() {
            let snapshot = self.store.snapshot(&key);
            let Some(stats) = ApiStatistics::from_records(&snapshot) else {
                continue;
            };
            let tier = PerformanceTier::classify(stats.average_response_time, &self.thresholds);
            result.insert(tier, key, stats);
        }

        debug!(
            keys = result.key_count(),
            fast = result.tier(PerformanceTier::Fast).len(),
            medium = result.tier(PerformanceTier::Medium).len(),
            slow = result.tier(PerformanceTier::Slow).len(),
            "Statistics recomputed"
        );
        result
    }
}
