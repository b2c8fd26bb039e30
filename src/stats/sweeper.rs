use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::api::health::HealthState;
use crate::error::{AppError, Result};
use crate::state::PerformanceStore;
use crate::stats::periodic::run_periodic;

/// Background task that drops samples older than the retention period.
pub struct RetentionSweeper {
    store: Arc<PerformanceStore>,
    health: Arc<HealthState>,
    retention_period: Duration,
    cleanup_interval: Duration,
}

impl RetentionSweeper {
    pub fn new(
        store: Arc<PerformanceStore>,
        health: Arc<HealthState>,
        retention_period: Duration,
        cleanup_interval: Duration,
    ) -> Self {
        Self { store, health, retention_period, cleanup_interval }
    }

    pub async fn run(self, cancel: CancellationToken) {
        let this = &self;
        run_periodic("retention sweeper", self.cleanup_interval, false, cancel, move || async move {
            this.sweep().map(|_| ())
        })
        .await;
    }

    /// One pass over every key. Returns the number of samples removed.
    pub fn sweep(&self) -> Result<usize> {
        let retention = chrono::Duration::from_std(self.retention_period).map_err(|e| {
            AppError::TimeRange(format!("retention period {:?}: {e}", self.retention_period))
        })?;
        let now = self.store.now();
        let threshold = now.checked_sub_signed(retention).ok_or_else(|| {
            AppError::TimeRange(format!("retention period {:?} reaches before the epoch range", self.retention_period))
        })?;

        let removed = self.store.trim_older_than(threshold);
        self.health.record_sweep(removed, now);

        if removed > 0 {
            info!(removed, remaining = self.store.sample_count(), "Cleanup removed {removed} stale samples");
        } else {
            debug!("Cleanup completed at {now}, nothing to remove");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};

    fn setup(retention: Duration) -> (RetentionSweeper, Arc<PerformanceStore>, Arc<ManualClock>, Arc<HealthState>) {
        let clock = Arc::new(ManualClock::fixed());
        let store = PerformanceStore::new(clock.clone(), 10_000);
        let health = Arc::new(HealthState::new());
        let sweeper = RetentionSweeper::new(
            Arc::clone(&store),
            Arc::clone(&health),
            retention,
            Duration::from_secs(60),
        );
        (sweeper, store, clock, health)
    }

    #[test]
    fn sweep_keeps_only_records_within_retention() {
        let (sweeper, store, clock, health) = setup(Duration::from_secs(600));
        store.record("OldApi", 10);
        store.record("MixedApi", 20);
        clock.advance(chrono::Duration::minutes(11));
        store.record("MixedApi", 30);

        assert_eq!(sweeper.sweep().unwrap(), 2);

        let since = clock.now() - chrono::Duration::days(1);
        assert!(store.records_since("OldApi", since).is_empty());
        let mixed = store.records_since("MixedApi", since);
        assert_eq!(mixed.len(), 1);
        assert_eq!(mixed[0].elapsed_ms, 30);
        let snapshot = health.snapshot();
        assert_eq!(snapshot.sweeps_completed, 1);
        assert_eq!(snapshot.samples_trimmed, 2);
        assert_eq!(snapshot.last_sweep_at_ns, clock.now().timestamp_nanos_opt().unwrap() as u64);
    }

    #[test]
    fn record_exactly_at_threshold_is_kept() {
        let (sweeper, store, clock, _health) = setup(Duration::from_secs(600));
        store.record("TestApi", 10);
        clock.advance(chrono::Duration::minutes(10));
        assert_eq!(sweeper.sweep().unwrap(), 0);
        assert_eq!(store.snapshot("TestApi").len(), 1);
    }

    #[test]
    fn unrepresentable_retention_is_an_error() {
        let (sweeper, _store, _clock, health) = setup(Duration::MAX);
        assert!(matches!(sweeper.sweep(), Err(AppError::TimeRange(_))));
        assert_eq!(health.snapshot().sweeps_completed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn loop_sweeps_on_interval_and_stops_on_cancel() {
        let (sweeper, store, clock, health) = setup(Duration::from_secs(600));
        store.record("TestApi", 10);
        clock.advance(chrono::Duration::minutes(20));

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(sweeper.run(cancel.clone()));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(health.snapshot().sweeps_completed, 0, "first sweep waits a full interval");

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(health.snapshot().sweeps_completed, 1);
        assert!(store.snapshot("TestApi").is_empty());

        cancel.cancel();
        handle.await.unwrap();

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(health.snapshot().sweeps_completed, 1);
    }
}
