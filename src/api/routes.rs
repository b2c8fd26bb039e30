use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    middleware,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregator::AggregatorService;
use crate::api::health::{HealthSnapshot, HealthState};
use crate::api::latency::{LatencyPercentiles, LatencyStats};
use crate::api::timing::track_performance;
use crate::state::PerformanceStore;
use crate::stats::StatisticsService;
use crate::types::{AggregatedData, ApiFilter, PerformanceRecord, TieredStatistics};

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<PerformanceStore>,
    pub statistics: Arc<StatisticsService>,
    pub aggregator: Arc<AggregatorService>,
    pub latency: Arc<LatencyStats>,
    pub health: Arc<HealthState>,
    pub aggregator_name: Arc<str>,
}

pub fn router(state: ApiState) -> Router {
    let tracked = middleware::from_fn_with_state(state.clone(), track_performance);

    Router::new()
        .route("/api/aggregation", post(post_aggregation).layer(tracked))
        .route("/api/statistics", get(get_statistics))
        .route("/api/statistics/keys", get(get_keys))
        .route("/api/statistics/latency", get(get_latency))
        .route("/api/statistics/records/:key", get(get_records))
        .route("/health", get(get_health))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct RecordsQuery {
    /// RFC 3339 lower bound (inclusive). Omitted = everything retained.
    pub since: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct HealthResponse {
    pub upstreams: Vec<String>,
    pub tracked_keys: usize,
    pub retained_samples: usize,
    pub background: HealthSnapshot,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn post_aggregation(
    State(state): State<ApiState>,
    Json(filter): Json<ApiFilter>,
) -> Json<AggregatedData> {
    Json(state.aggregator.aggregate(&filter).await)
}

async fn get_statistics(State(state): State<ApiState>) -> Json<TieredStatistics> {
    Json(state.statistics.get_statistics().as_ref().clone())
}

async fn get_keys(State(state): State<ApiState>) -> Json<Vec<String>> {
    let mut keys = state.store.all_keys();
    keys.sort();
    Json(keys)
}

async fn get_latency(State(state): State<ApiState>) -> Json<LatencyPercentiles> {
    Json(state.latency.percentiles())
}

async fn get_records(
    State(state): State<ApiState>,
    Path(key): Path<String>,
    Query(params): Query<RecordsQuery>,
) -> Json<Vec<PerformanceRecord>> {
    let since = params.since.unwrap_or(DateTime::<Utc>::MIN_UTC);
    Json(state.store.records_since(&key, since))
}

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        upstreams: state.aggregator.api_names(),
        tracked_keys: state.store.all_keys().len(),
        retained_samples: state.store.sample_count(),
        background: state.health.snapshot(),
    })
}
