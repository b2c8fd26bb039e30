use std::str::FromStr;
use std::time::Duration;

use crate::error::{AppError, Result};

pub const WEATHER_API_URL: &str = "https://api.openweathermap.org/data/2.5";
pub const NEWS_API_URL: &str = "https://newsapi.org/v2";
pub const MUSIC_API_URL: &str = "https://api.spotify.com/v1";
pub const MUSIC_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// Key the aggregation endpoint reports its own latency under.
pub const DEFAULT_AGGREGATOR_NAME: &str = "Aggregator";

/// An upstream is flagged when its windowed average exceeds the aggregator's
/// windowed average by more than this factor (strict `>`).
pub const ANOMALY_RATIO: f64 = 1.5;

/// Content returned in place of a payload when an upstream call fails.
pub const FALLBACK_MESSAGE: &str = "Service unavailable";

/// Latency tier boundaries in milliseconds. Both limits are exclusive upper bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierThresholds {
    pub fast_upper_limit_ms: f64,
    pub medium_upper_limit_ms: f64,
}

impl TierThresholds {
    /// Rejects non-finite limits and `fast >= medium`, which would make the
    /// medium tier unreachable.
    pub fn new(fast_upper_limit_ms: f64, medium_upper_limit_ms: f64) -> Result<Self> {
        if !fast_upper_limit_ms.is_finite() || !medium_upper_limit_ms.is_finite() {
            return Err(AppError::Config(
                "tier thresholds must be finite numbers".to_string(),
            ));
        }
        if fast_upper_limit_ms >= medium_upper_limit_ms {
            return Err(AppError::Config(format!(
                "fast upper limit ({fast_upper_limit_ms}ms) must be below medium upper limit ({medium_upper_limit_ms}ms)"
            )));
        }
        Ok(Self { fast_upper_limit_ms, medium_upper_limit_ms })
    }
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self { fast_upper_limit_ms: 100.0, medium_upper_limit_ms: 200.0 }
    }
}

/// Connection settings for one upstream API.
#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    pub base_url: String,
    pub cache_ttl: Duration,
    /// Distinct filters kept in the response cache at once ({PREFIX}_CACHE_MAX_ENTRIES)
    pub cache_max_entries: usize,
}

/// OAuth client-credentials grant used to obtain bearer tokens.
#[derive(Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub token_url: String,
    /// Upper bound on how long a token is reused (MUSIC_TOKEN_TTL_SECS). A
    /// shorter `expires_in` from the token endpoint wins.
    pub token_ttl: Duration,
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("token_url", &self.token_url)
            .field("token_ttl", &self.token_ttl)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub api_port: u16,
    /// Key inbound aggregation requests are recorded under (AGGREGATOR_NAME)
    pub aggregator_name: String,
    pub thresholds: TierThresholds,
    /// How long a computed statistics view is served before recomputation (STATS_CACHE_TTL_SECS)
    pub statistics_cache_ttl: Duration,
    /// Samples older than this are removed by the sweeper (STATS_RETENTION_SECS)
    pub retention_period: Duration,
    pub cleanup_interval: Duration,
    /// Trailing window the anomaly monitor averages over (STATS_ANALYSIS_PERIOD_SECS)
    pub analysis_period: Duration,
    pub check_interval: Duration,
    /// Hard cap on retained samples per key, independent of retention (STATS_MAX_SAMPLES_PER_KEY)
    pub max_samples_per_key: usize,
    pub http_timeout: Duration,
    pub weather: UpstreamSettings,
    pub weather_api_key: Option<String>,
    pub news: UpstreamSettings,
    pub news_api_key: Option<String>,
    pub music: UpstreamSettings,
    /// MUSIC_CLIENT_ID + MUSIC_CLIENT_SECRET; the music upstream is disabled without them
    pub music_credentials: Option<ClientCredentials>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from an arbitrary variable source. Unset variables fall
    /// back to defaults; set but unparsable ones are an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let thresholds = TierThresholds::new(
            parse_or(&lookup, "STATS_FAST_UPPER_LIMIT_MS", 100.0)?,
            parse_or(&lookup, "STATS_MEDIUM_UPPER_LIMIT_MS", 200.0)?,
        )?;

        let max_samples_per_key = parse_or(&lookup, "STATS_MAX_SAMPLES_PER_KEY", 10_000usize)?;
        if max_samples_per_key == 0 {
            return Err(AppError::Config(
                "STATS_MAX_SAMPLES_PER_KEY must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            api_port: parse_or(&lookup, "API_PORT", 5000u16)?,
            aggregator_name: lookup("AGGREGATOR_NAME")
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_AGGREGATOR_NAME.to_string()),
            thresholds,
            statistics_cache_ttl: secs_or(&lookup, "STATS_CACHE_TTL_SECS", 5)?,
            retention_period: positive_secs_or(&lookup, "STATS_RETENTION_SECS", 600)?,
            cleanup_interval: positive_secs_or(&lookup, "STATS_CLEANUP_INTERVAL_SECS", 300)?,
            analysis_period: positive_secs_or(&lookup, "STATS_ANALYSIS_PERIOD_SECS", 300)?,
            check_interval: positive_secs_or(&lookup, "STATS_CHECK_INTERVAL_SECS", 60)?,
            max_samples_per_key,
            http_timeout: positive_secs_or(&lookup, "HTTP_TIMEOUT_SECS", 30)?,
            weather: upstream(&lookup, "WEATHER", WEATHER_API_URL)?,
            weather_api_key: secret(&lookup, "WEATHER_API_KEY"),
            news: upstream(&lookup, "NEWS", NEWS_API_URL)?,
            news_api_key: secret(&lookup, "NEWS_API_KEY"),
            music: upstream(&lookup, "MUSIC", MUSIC_API_URL)?,
            music_credentials: client_credentials(&lookup)?,
        })
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::Config(format!("{name} has an invalid value: {raw:?}"))),
        None => Ok(default),
    }
}

fn secs_or<F>(lookup: &F, name: &str, default: u64) -> Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    parse_or(lookup, name, default).map(Duration::from_secs)
}

fn positive_secs_or<F>(lookup: &F, name: &str, default: u64) -> Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let d = secs_or(lookup, name, default)?;
    if d.is_zero() {
        return Err(AppError::Config(format!("{name} must be greater than zero")));
    }
    Ok(d)
}

fn secret<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn url_or<F>(lookup: &F, name: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .unwrap_or_else(|| default.to_string())
        .trim_end_matches('/')
        .to_string()
}

fn upstream<F>(lookup: &F, prefix: &str, default_url: &str) -> Result<UpstreamSettings>
where
    F: Fn(&str) -> Option<String>,
{
    let max_entries_var = format!("{prefix}_CACHE_MAX_ENTRIES");
    let cache_max_entries = parse_or(lookup, &max_entries_var, 1_000usize)?;
    if cache_max_entries == 0 {
        return Err(AppError::Config(format!("{max_entries_var} must be greater than zero")));
    }
    Ok(UpstreamSettings {
        base_url: url_or(lookup, &format!("{prefix}_BASE_URL"), default_url),
        cache_ttl: secs_or(lookup, &format!("{prefix}_CACHE_TTL_SECS"), 60)?,
        cache_max_entries,
    })
}

fn client_credentials<F>(lookup: &F) -> Result<Option<ClientCredentials>>
where
    F: Fn(&str) -> Option<String>,
{
    match (secret(lookup, "MUSIC_CLIENT_ID"), secret(lookup, "MUSIC_CLIENT_SECRET")) {
        (Some(client_id), Some(client_secret)) => Ok(Some(ClientCredentials {
            client_id,
            client_secret,
            token_url: url_or(lookup, "MUSIC_TOKEN_URL", MUSIC_TOKEN_URL),
            token_ttl: positive_secs_or(lookup, "MUSIC_TOKEN_TTL_SECS", 3600)?,
        })),
        (None, None) => Ok(None),
        _ => Err(AppError::Config(
            "MUSIC_CLIENT_ID and MUSIC_CLIENT_SECRET must be set together".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let cfg = load(&[]).unwrap();
        assert_eq!(cfg.api_port, 5000);
        assert_eq!(cfg.aggregator_name, DEFAULT_AGGREGATOR_NAME);
        assert_eq!(cfg.thresholds, TierThresholds::default());
        assert_eq!(cfg.retention_period, Duration::from_secs(600));
        assert_eq!(cfg.check_interval, Duration::from_secs(60));
        assert!(cfg.weather_api_key.is_none());
        assert!(cfg.music_credentials.is_none());
        assert_eq!(cfg.news.base_url, NEWS_API_URL);
        assert_eq!(cfg.news.cache_max_entries, 1_000);
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = load(&[
            ("STATS_FAST_UPPER_LIMIT_MS", "50"),
            ("STATS_MEDIUM_UPPER_LIMIT_MS", "75.5"),
            ("STATS_ANALYSIS_PERIOD_SECS", "30"),
            ("WEATHER_API_KEY", "abc"),
            ("WEATHER_BASE_URL", "http://localhost:9000/"),
        ])
        .unwrap();
        assert_eq!(cfg.thresholds.fast_upper_limit_ms, 50.0);
        assert_eq!(cfg.thresholds.medium_upper_limit_ms, 75.5);
        assert_eq!(cfg.analysis_period, Duration::from_secs(30));
        assert_eq!(cfg.weather_api_key.as_deref(), Some("abc"));
        assert_eq!(cfg.weather.base_url, "http://localhost:9000");
    }

    #[test]
    fn music_credentials_are_read_as_a_pair() {
        let cfg = load(&[
            ("MUSIC_CLIENT_ID", "id"),
            ("MUSIC_CLIENT_SECRET", "secret"),
            ("MUSIC_TOKEN_URL", "http://localhost:9001/token/"),
        ])
        .unwrap();
        let creds = cfg.music_credentials.unwrap();
        assert_eq!(creds.client_id, "id");
        assert_eq!(creds.token_url, "http://localhost:9001/token");
        assert_eq!(creds.token_ttl, Duration::from_secs(3600));
        assert!(!format!("{creds:?}").contains("\"secret\""));

        let err = load(&[("MUSIC_CLIENT_ID", "id")]).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn out_of_order_thresholds_are_rejected() {
        let err = load(&[
            ("STATS_FAST_UPPER_LIMIT_MS", "300"),
            ("STATS_MEDIUM_UPPER_LIMIT_MS", "200"),
        ])
        .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));

        assert!(TierThresholds::new(100.0, 100.0).is_err());
        assert!(TierThresholds::new(f64::NAN, 100.0).is_err());
    }

    #[test]
    fn zero_interval_and_garbage_values_are_rejected() {
        assert!(load(&[("STATS_CHECK_INTERVAL_SECS", "0")]).is_err());
        assert!(load(&[("STATS_MAX_SAMPLES_PER_KEY", "0")]).is_err());
        assert!(load(&[("API_PORT", "not-a-port")]).is_err());
        assert!(load(&[("NEWS_CACHE_MAX_ENTRIES", "0")]).is_err());
    }
}
