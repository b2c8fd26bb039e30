use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;

use super::ExternalApiClient;
use crate::clock::Clock;
use crate::error::Result;
use crate::types::ApiFilter;

struct CachedPayload {
    stored_at: DateTime<Utc>,
    payload: serde_json::Value,
}

/// Serves repeated identical filters from memory for `ttl`.
/// Only successful payloads are cached; errors always go back to the upstream.
/// Holds at most `max_entries` filters; the oldest entry makes room first.
pub struct CachingClient<C> {
    inner: C,
    ttl: Duration,
    max_entries: usize,
    clock: Arc<dyn Clock>,
    /// filter cache key → last good payload
    entries: DashMap<String, CachedPayload>,
}

impl<C> CachingClient<C> {
    pub fn new(inner: C, ttl: Duration, max_entries: usize, clock: Arc<dyn Clock>) -> Self {
        Self { inner, ttl, max_entries: max_entries.max(1), clock, entries: DashMap::new() }
    }

    fn fresh(&self, key: &str, now: DateTime<Utc>) -> Option<serde_json::Value> {
        let entry = self.entries.get(key)?;
        let age = (now - entry.stored_at).to_std().ok()?;
        (age < self.ttl).then(|| entry.payload.clone())
    }

    /// Drop every entry that has outlived the TTL, then the oldest ones until
    /// there is room for one more.
    fn make_room(&self, now: DateTime<Utc>) {
        self.entries.retain(|_, e| {
            (now - e.stored_at).to_std().map(|age| age < self.ttl).unwrap_or(false)
        });
        while self.entries.len() >= self.max_entries {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|e| e.stored_at)
                .map(|e| e.key().clone());
            match oldest {
                Some(key) => {
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }
}

#[async_trait]
impl<C: ExternalApiClient> ExternalApiClient for CachingClient<C> {
    fn api_name(&self) -> &str {
        self.inner.api_name()
    }

    async fn fetch(&self, filter: &ApiFilter) -> Result<serde_json::Value> {
        let key = filter.cache_key();
        let now = self.clock.now();
        if let Some(payload) = self.fresh(&key, now) {
            debug!(api = self.inner.api_name(), "cache hit");
            return Ok(payload);
        }

        let payload = self.inner.fetch(filter).await?;
        if !self.ttl.is_zero() {
            self.make_room(now);
            self.entries.insert(key, CachedPayload { stored_at: now, payload: payload.clone() });
        }
        Ok(payload)
    }
}
