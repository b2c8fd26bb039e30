use std::time::Instant;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::api::routes::ApiState;

/// Wraps tracked routes: records the handler's wall time under the
/// aggregator's own key and in the inbound latency histogram, whatever the
/// response status. Also sets `Server-Timing` on the response.
pub async fn track_performance(State(state): State<ApiState>, req: Request, next: Next) -> Response {
    let path = req.uri().path().to_owned();

    let start = Instant::now();
    let mut response = next.run(req).await;
    let elapsed = start.elapsed();

    let elapsed_ms = elapsed.as_millis().min(u128::from(u64::MAX)) as u64;
    state.store.record(&state.aggregator_name, elapsed_ms);
    state.latency.record(elapsed);

    let server_timing = format!("total;dur={:.3}", elapsed.as_secs_f64() * 1000.0);
    if let Ok(val) = server_timing.parse() {
        response.headers_mut().insert("Server-Timing", val);
    }

    debug!(path = %path, status = response.status().as_u16(), elapsed_ms, "tracked request");
    response
}
