use async_trait::async_trait;

use super::{get_json, ExternalApiClient};
use crate::error::{AppError, Result};
use crate::types::ApiFilter;

pub const API_NAME: &str = "NewsApi";

/// Top headlines. Filters by `country` when given, otherwise by `keyword`.
pub struct NewsClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl NewsClient {
    pub fn new(http: reqwest::Client, base_url: &str, api_key: &str) -> Self {
        Self { http, base_url: base_url.to_string(), api_key: api_key.to_string() }
    }

    fn request(&self, filter: &ApiFilter) -> Result<reqwest::RequestBuilder> {
        let non_blank = |v: &Option<String>| {
            v.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
        };
        let query: (&str, String) = match (non_blank(&filter.country), non_blank(&filter.keyword)) {
            (Some(country), _) => ("country", country),
            (None, Some(keyword)) => ("q", keyword),
            (None, None) => {
                return Err(AppError::InvalidFilter(format!(
                    "{API_NAME} requires `country` or `keyword`"
                )))
            }
        };
        Ok(self
            .http
            .get(format!("{}/top-headlines", self.base_url))
            .query(&[(query.0, query.1.as_str()), ("apiKey", self.api_key.as_str())]))
    }
}

#[async_trait]
impl ExternalApiClient for NewsClient {
    fn api_name(&self) -> &str {
        API_NAME
    }

    async fn fetch(&self, filter: &ApiFilter) -> Result<serde_json::Value> {
        get_json(API_NAME, self.request(filter)?).await
    }
}
