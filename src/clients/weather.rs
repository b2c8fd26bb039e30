use async_trait::async_trait;

use super::{get_json, require, ExternalApiClient};
use crate::error::Result;
use crate::types::ApiFilter;

pub const API_NAME: &str = "OpenWeatherMap";

/// Current conditions for `filter.city`, metric units.
pub struct WeatherClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl WeatherClient {
    pub fn new(http: reqwest::Client, base_url: &str, api_key: &str) -> Self {
        Self { http, base_url: base_url.to_string(), api_key: api_key.to_string() }
    }

    fn request(&self, filter: &ApiFilter) -> Result<reqwest::RequestBuilder> {
        let city = require(API_NAME, "city", &filter.city)?;
        Ok(self
            .http
            .get(format!("{}/weather", self.base_url))
            .query(&[("q", city), ("appid", self.api_key.as_str()), ("units", "metric")]))
    }
}

#[async_trait]
impl ExternalApiClient for WeatherClient {
    fn api_name(&self) -> &str {
        API_NAME
    }

    async fn fetch(&self, filter: &ApiFilter) -> Result<serde_json::Value> {
        get_json(API_NAME, self.request(filter)?).await
    }
}
