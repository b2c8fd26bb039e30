use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::clock::Clock;

struct Entry<T> {
    computed_at: DateTime<Utc>,
    value: Arc<T>,
}

/// A single memoised value that expires `ttl` after it was computed.
///
/// Fresh reads share a read lock. On a miss, the first caller to take the write
/// lock recomputes; callers queued behind it re-check and reuse that result, so
/// there is at most one computation per expiry window.
pub struct ExpiringCell<T> {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    slot: RwLock<Option<Entry<T>>>,
}

impl<T> ExpiringCell<T> {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { ttl, clock, slot: RwLock::new(None) }
    }

    fn is_fresh(&self, entry: &Entry<T>, now: DateTime<Utc>) -> bool {
        // A negative age (clock stepped back) converts to Err and counts as stale.
        (now - entry.computed_at)
            .to_std()
            .map(|age| age < self.ttl)
            .unwrap_or(false)
    }

    pub fn get_or_compute<F>(&self, compute: F) -> Arc<T>
    where
        F: FnOnce() -> T,
    {
        {
            let slot = self.slot.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(entry) = slot.as_ref() {
                if self.is_fresh(entry, self.clock.now()) {
                    return Arc::clone(&entry.value);
                }
            }
        }

        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        let now = self.clock.now();
        if let Some(entry) = slot.as_ref() {
            if self.is_fresh(entry, now) {
                return Arc::clone(&entry.value);
            }
        }

        let value = Arc::new(compute());
        *slot = Some(Entry { computed_at: now, value: Arc::clone(&value) });
        value
    }
}
