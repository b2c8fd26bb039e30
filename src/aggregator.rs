use std::sync::Arc;

use futures_util::future::join_all;
use tracing::warn;

use crate::clients::ExternalApiClient;
use crate::config::FALLBACK_MESSAGE;
use crate::types::{AggregatedData, ApiFilter, ApiResponse};

/// Fans one filter out to every registered upstream concurrently and merges
/// the answers. A failing upstream is reported in place; it never fails the
/// whole aggregation.
pub struct AggregatorService {
    clients: Vec<Arc<dyn ExternalApiClient>>,
}

impl AggregatorService {
    pub fn new(clients: Vec<Arc<dyn ExternalApiClient>>) -> Self {
        Self { clients }
    }

    pub fn api_names(&self) -> Vec<String> {
        self.clients.iter().map(|c| c.api_name().to_string()).collect()
    }

    pub async fn aggregate(&self, filter: &ApiFilter) -> AggregatedData {
        let calls = self.clients.iter().map(|client| async move {
            let api_name = client.api_name().to_string();
            match client.fetch(filter).await {
                Ok(content) => ApiResponse { api_name, is_success: true, content, is_fallback: false },
                Err(e) => {
                    warn!(api = %api_name, "Upstream call to {api_name} failed: {e}");
                    ApiResponse {
                        api_name,
                        is_success: false,
                        content: serde_json::Value::String(FALLBACK_MESSAGE.to_string()),
                        is_fallback: true,
                    }
                }
            }
        });

        let responses = join_all(calls)
            .await
            .into_iter()
            .map(|r| (r.api_name.clone(), r))
            .collect();

        AggregatedData { responses }
    }
}
