use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::clock::Clock;
use crate::types::PerformanceRecord;

// ---------------------------------------------------------------------------
// SampleQueue
// ---------------------------------------------------------------------------

/// Chronologically ordered samples for one key. Timestamps never decrease from
/// front to back, which lets trims stop at the first fresh record.
type SampleQueue = Arc<Mutex<VecDeque<PerformanceRecord>>>;

/// A queue is only ever mutated by push_back/pop_front, so a panic while it was
/// held cannot leave it half-updated. Recover the guard instead of propagating.
fn lock(queue: &Mutex<VecDeque<PerformanceRecord>>) -> MutexGuard<'_, VecDeque<PerformanceRecord>> {
    queue.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// PerformanceStore
// ---------------------------------------------------------------------------

/// In-memory latency samples, partitioned by call target.
///
/// The map lock is only taken to find or create a key's queue; appends, trims
/// and snapshots then lock that single queue, so writers on different keys
/// never contend.
pub struct PerformanceStore {
    /// key → samples, oldest first
    queues: DashMap<String, SampleQueue>,
    clock: Arc<dyn Clock>,
    max_samples_per_key: usize,
}

impl PerformanceStore {
    pub fn new(clock: Arc<dyn Clock>, max_samples_per_key: usize) -> Arc<Self> {
        Arc::new(Self {
            queues: DashMap::new(),
            clock,
            max_samples_per_key: max_samples_per_key.max(1),
        })
    }

    fn queue_for(&self, key: &str) -> SampleQueue {
        if let Some(q) = self.queues.get(key) {
            return Arc::clone(q.value());
        }
        Arc::clone(self.queues.entry(key.to_string()).or_default().value())
    }

    /// Append a sample stamped with the current time.
    ///
    /// The timestamp is taken under the queue lock so that append order is
    /// timestamp order even with concurrent writers. A clock that stepped
    /// backwards is clamped to the newest stored timestamp.
    pub fn record(&self, key: &str, elapsed_ms: u64) {
        let queue = self.queue_for(key);
        let mut q = lock(&queue);

        let mut timestamp = self.clock.now();
        if let Some(last) = q.back() {
            if timestamp < last.timestamp {
                timestamp = last.timestamp;
            }
        }
        q.push_back(PerformanceRecord { timestamp, elapsed_ms });

        while q.len() > self.max_samples_per_key {
            q.pop_front();
        }
    }

    /// Copy of every stored record for `key` with `timestamp >= since`, in
    /// insertion order. Unknown keys yield an empty vec.
    pub fn records_since(&self, key: &str, since: DateTime<Utc>) -> Vec<PerformanceRecord> {
        let Some(queue) = self.queues.get(key).map(|q| Arc::clone(q.value())) else {
            return Vec::new();
        };
        let q = lock(&queue);
        let start = q.partition_point(|r| r.timestamp < since);
        q.range(start..).copied().collect()
    }

    /// Copy of everything currently retained for `key`.
    pub fn snapshot(&self, key: &str) -> Vec<PerformanceRecord> {
        self.records_since(key, DateTime::<Utc>::MIN_UTC)
    }

    pub fn all_keys(&self) -> Vec<String> {
        self.queues.iter().map(|e| e.key().clone()).collect()
    }

    /// Drop records older than `threshold` from every queue. Returns the number
    /// of records removed.
    pub fn trim_older_than(&self, threshold: DateTime<Utc>) -> usize {
        // Collect handles first so no map shard stays locked while trimming.
        let queues: Vec<SampleQueue> = self.queues.iter().map(|e| Arc::clone(e.value())).collect();

        let mut removed = 0;
        for queue in queues {
            let mut q = lock(&queue);
            while q.front().is_some_and(|r| r.timestamp < threshold) {
                q.pop_front();
                removed += 1;
            }
        }
        removed
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Total retained samples across all keys.
    pub fn sample_count(&self) -> usize {
        let queues: Vec<SampleQueue> = self.queues.iter().map(|e| Arc::clone(e.value())).collect();
        queues.iter().map(|q| lock(q).len()).sum()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
