use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::TierThresholds;

// ---------------------------------------------------------------------------
// Latency samples
// ---------------------------------------------------------------------------

/// One completed call: when it finished and how long it took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PerformanceRecord {
    pub timestamp: DateTime<Utc>,
    pub elapsed_ms: u64,
}

// ---------------------------------------------------------------------------
// Aggregated statistics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiStatistics {
    pub total_requests: usize,
    pub average_response_time: f64,
    pub min_response_time: u64,
    pub max_response_time: u64,
}

impl ApiStatistics {
    /// Summary over a non-empty sample set. Returns None for an empty one.
    pub fn from_records(records: &[PerformanceRecord]) -> Option<Self> {
        let first = records.first()?;
        let mut min = first.elapsed_ms;
        let mut max = first.elapsed_ms;
        let mut sum: u128 = 0;
        for r in records {
            min = min.min(r.elapsed_ms);
            max = max.max(r.elapsed_ms);
            sum += u128::from(r.elapsed_ms);
        }
        Some(Self {
            total_requests: records.len(),
            average_response_time: sum as f64 / records.len() as f64,
            min_response_time: min,
            max_response_time: max,
        })
    }
}

/// Mean elapsed time of a sample set, None when empty.
pub fn mean_elapsed_ms(records: &[PerformanceRecord]) -> Option<f64> {
    if records.is_empty() {
        return None;
    }
    let sum: u128 = records.iter().map(|r| u128::from(r.elapsed_ms)).sum();
    Some(sum as f64 / records.len() as f64)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceTier {
    /// average < fast upper limit
    Fast,
    /// fast upper limit <= average < medium upper limit
    Medium,
    /// average >= medium upper limit
    Slow,
}

impl PerformanceTier {
    pub fn classify(average_ms: f64, thresholds: &TierThresholds) -> Self {
        if average_ms < thresholds.fast_upper_limit_ms {
            PerformanceTier::Fast
        } else if average_ms < thresholds.medium_upper_limit_ms {
            PerformanceTier::Medium
        } else {
            PerformanceTier::Slow
        }
    }
}

impl std::fmt::Display for PerformanceTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PerformanceTier::Fast => "fast",
            PerformanceTier::Medium => "medium",
            PerformanceTier::Slow => "slow",
        };
        write!(f, "{s}")
    }
}

/// Per-key statistics grouped by tier. All three tiers are always present.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TieredStatistics {
    pub fast: BTreeMap<String, ApiStatistics>,
    pub medium: BTreeMap<String, ApiStatistics>,
    pub slow: BTreeMap<String, ApiStatistics>,
}

impl TieredStatistics {
    pub fn tier(&self, tier: PerformanceTier) -> &BTreeMap<String, ApiStatistics> {
        match tier {
            PerformanceTier::Fast => &self.fast,
            PerformanceTier::Medium => &self.medium,
            PerformanceTier::Slow => &self.slow,
        }
    }

    pub fn insert(&mut self, tier: PerformanceTier, key: String, stats: ApiStatistics) {
        let bucket = match tier {
            PerformanceTier::Fast => &mut self.fast,
            PerformanceTier::Medium => &mut self.medium,
            PerformanceTier::Slow => &mut self.slow,
        };
        bucket.insert(key, stats);
    }

    /// Tier a key currently sits in, if it has data.
    #[cfg(test)]
    pub fn tier_of(&self, key: &str) -> Option<PerformanceTier> {
        [PerformanceTier::Fast, PerformanceTier::Medium, PerformanceTier::Slow]
            .into_iter()
            .find(|t| self.tier(*t).contains_key(key))
    }

    pub fn key_count(&self) -> usize {
        self.fast.len() + self.medium.len() + self.slow.len()
    }
}

// ---------------------------------------------------------------------------
// Aggregation request / response
// ---------------------------------------------------------------------------

/// Inbound aggregation filter. Each upstream reads the fields it needs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiFilter {
    pub keyword: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
}

impl ApiFilter {
    /// Stable identity used by the response cache.
    pub fn cache_key(&self) -> String {
        format!(
            "keyword={}|city={}|country={}",
            self.keyword.as_deref().unwrap_or(""),
            self.city.as_deref().unwrap_or(""),
            self.country.as_deref().unwrap_or(""),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse {
    pub api_name: String,
    pub is_success: bool,
    /// Upstream payload, passed through untouched.
    pub content: serde_json::Value,
    /// True when `content` is a placeholder rather than upstream data.
    pub is_fallback: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregatedData {
    pub responses: BTreeMap<String, ApiResponse>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(elapsed_ms: u64) -> PerformanceRecord {
        PerformanceRecord { timestamp: Utc::now(), elapsed_ms }
    }

    #[test]
    fn summary_matches_inputs() {
        let stats = ApiStatistics::from_records(&[rec(50), rec(70), rec(90)]).unwrap();
        assert_eq!(stats.total_requests, 3);
        assert_eq!(stats.min_response_time, 50);
        assert_eq!(stats.max_response_time, 90);
        assert!((stats.average_response_time - 70.0).abs() < 1e-9);
    }

    #[test]
    fn empty_records_have_no_summary() {
        assert!(ApiStatistics::from_records(&[]).is_none());
        assert!(mean_elapsed_ms(&[]).is_none());
    }

    #[test]
    fn tiers_use_strict_upper_bounds() {
        let t = TierThresholds::default();
        assert_eq!(PerformanceTier::classify(90.0, &t), PerformanceTier::Fast);
        assert_eq!(PerformanceTier::classify(99.999, &t), PerformanceTier::Fast);
        assert_eq!(PerformanceTier::classify(100.0, &t), PerformanceTier::Medium);
        assert_eq!(PerformanceTier::classify(150.0, &t), PerformanceTier::Medium);
        assert_eq!(PerformanceTier::classify(200.0, &t), PerformanceTier::Slow);
        assert_eq!(PerformanceTier::classify(250.0, &t), PerformanceTier::Slow);
    }

    #[test]
    fn tiered_statistics_serialize_all_tiers() {
        let mut tiers = TieredStatistics::default();
        tiers.insert(
            PerformanceTier::Slow,
            "NewsApi".to_string(),
            ApiStatistics::from_records(&[rec(400)]).unwrap(),
        );
        let json = serde_json::to_value(&tiers).unwrap();
        assert!(json["fast"].as_object().unwrap().is_empty());
        assert!(json["medium"].as_object().unwrap().is_empty());
        assert_eq!(json["slow"]["NewsApi"]["total_requests"], 1);
        assert_eq!(tiers.tier_of("NewsApi"), Some(PerformanceTier::Slow));
    }

    #[test]
    fn cache_key_distinguishes_fields() {
        let a = ApiFilter { city: Some("Athens".into()), ..Default::default() };
        let b = ApiFilter { keyword: Some("Athens".into()), ..Default::default() };
        assert_ne!(a.cache_key(), b.cache_key());
    }
}
