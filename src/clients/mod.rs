use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::config::{Config, UpstreamSettings};
use crate::error::{AppError, Result};
use crate::state::PerformanceStore;
use crate::types::ApiFilter;

pub mod caching;
pub mod music;
pub mod news;
pub mod token;
pub mod weather;

pub use caching::CachingClient;
pub use music::MusicClient;
pub use news::NewsClient;
pub use token::TokenProvider;
pub use weather::WeatherClient;

/// One upstream HTTP API. Payloads are returned as opaque JSON.
#[async_trait]
pub trait ExternalApiClient: Send + Sync {
    fn api_name(&self) -> &str;

    /// Work needed before a call that is not part of its latency, such as
    /// obtaining credentials.
    async fn prepare(&self) -> Result<()> {
        Ok(())
    }

    async fn fetch(&self, filter: &ApiFilter) -> Result<serde_json::Value>;
}

pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(timeout)
        .user_agent("api-aggregator")
        .build()?)
}

/// Send `request` and decode the body as JSON. Non-2xx responses become
/// `AppError::Upstream`.
pub(crate) async fn get_json(
    api: &str,
    request: reqwest::RequestBuilder,
) -> Result<serde_json::Value> {
    let resp = request.send().await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(AppError::Upstream { api: api.to_string(), status: status.as_u16() });
    }
    Ok(resp.json().await?)
}

pub(crate) fn require<'a>(api: &str, field: &str, value: &'a Option<String>) -> Result<&'a str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::InvalidFilter(format!("{api} requires `{field}`")))
}

// ---------------------------------------------------------------------------
// TimedClient
// ---------------------------------------------------------------------------

/// Reports the wall-clock time of every call that reached the upstream,
/// successful or not, to the performance store under the client's API name.
/// Calls rejected before sending (bad filter, no access token) are not timed.
pub struct TimedClient<C> {
    inner: C,
    store: Arc<PerformanceStore>,
}

impl<C> TimedClient<C> {
    pub fn new(inner: C, store: Arc<PerformanceStore>) -> Self {
        Self { inner, store }
    }
}

#[async_trait]
impl<C: ExternalApiClient> ExternalApiClient for TimedClient<C> {
    fn api_name(&self) -> &str {
        self.inner.api_name()
    }

    async fn fetch(&self, filter: &ApiFilter) -> Result<serde_json::Value> {
        self.inner.prepare().await?;

        let started = Instant::now();
        let result = self.inner.fetch(filter).await;
        let elapsed_ms = started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64;
        match &result {
            Err(e) if e.is_before_send() => {
                debug!(api = self.inner.api_name(), "upstream call not sent: {e}");
            }
            _ => {
                self.store.record(self.inner.api_name(), elapsed_ms);
                debug!(api = self.inner.api_name(), elapsed_ms, ok = result.is_ok(), "upstream call finished");
            }
        }
        result
    }
}

/// Builds the registered upstreams, each layered as cache → timing → HTTP.
/// Upstreams without credentials are skipped.
pub fn build_clients(
    cfg: &Config,
    http: &reqwest::Client,
    store: &Arc<PerformanceStore>,
    clock: &Arc<dyn Clock>,
) -> Vec<Arc<dyn ExternalApiClient>> {
    let mut clients: Vec<Arc<dyn ExternalApiClient>> = Vec::new();

    if let Some(client) = keyed(cfg.weather_api_key.as_deref(), "WEATHER_API_KEY", "weather", |key| {
        WeatherClient::new(http.clone(), &cfg.weather.base_url, key)
    }) {
        clients.push(layer(client, &cfg.weather, store, clock));
    }
    if let Some(client) = keyed(cfg.news_api_key.as_deref(), "NEWS_API_KEY", "news", |key| {
        NewsClient::new(http.clone(), &cfg.news.base_url, key)
    }) {
        clients.push(layer(client, &cfg.news, store, clock));
    }
    if let Some(client) = keyed(
        cfg.music_credentials.as_ref(),
        "MUSIC_CLIENT_ID/MUSIC_CLIENT_SECRET",
        "music",
        |credentials| {
            let tokens = TokenProvider::new(music::API_NAME, http.clone(), credentials.clone(), Arc::clone(clock));
            MusicClient::new(http.clone(), &cfg.music.base_url, Arc::new(tokens))
        },
    ) {
        clients.push(layer(client, &cfg.music, store, clock));
    }

    clients
}

fn keyed<K: ?Sized, C>(
    credentials: Option<&K>,
    vars: &str,
    label: &str,
    build: impl FnOnce(&K) -> C,
) -> Option<C> {
    match credentials {
        Some(credentials) => Some(build(credentials)),
        None => {
            warn!("{vars} not set, {label} upstream will not be queried");
            None
        }
    }
}

fn layer<C: ExternalApiClient + 'static>(
    client: C,
    settings: &UpstreamSettings,
    store: &Arc<PerformanceStore>,
    clock: &Arc<dyn Clock>,
) -> Arc<dyn ExternalApiClient> {
    let timed = TimedClient::new(client, Arc::clone(store));
    Arc::new(CachingClient::new(
        timed,
        settings.cache_ttl,
        settings.cache_max_entries,
        Arc::clone(clock),
    ))
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::ExternalApiClient;
    use crate::error::{AppError, Result};
    use crate::types::ApiFilter;

    /// Scripted upstream for tests.
    pub struct FakeClient {
        pub name: String,
        pub delay: Duration,
        pub fail: bool,
        pub calls: AtomicUsize,
    }

    impl FakeClient {
        pub fn ok(name: &str) -> Self {
            Self { name: name.to_string(), delay: Duration::ZERO, fail: false, calls: AtomicUsize::new(0) }
        }

        pub fn failing(name: &str) -> Self {
            Self { fail: true, ..Self::ok(name) }
        }

        pub fn slow(name: &str, delay: Duration) -> Self {
            Self { delay, ..Self::ok(name) }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ExternalApiClient for FakeClient {
        fn api_name(&self) -> &str {
            &self.name
        }

        async fn fetch(&self, filter: &ApiFilter) -> Result<serde_json::Value> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail {
                return Err(AppError::Upstream { api: self.name.clone(), status: 503 });
            }
            Ok(serde_json::json!({ "source": self.name, "call": n, "city": filter.city }))
        }
    }
}
