use std::sync::Arc;

use async_trait::async_trait;

use super::token::TokenProvider;
use super::{get_json, require, ExternalApiClient};
use crate::error::Result;
use crate::types::ApiFilter;

pub const API_NAME: &str = "Spotify";

/// Artist search on a music catalogue, authenticated with a bearer token from
/// the client-credentials grant.
pub struct MusicClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<TokenProvider>,
}

impl MusicClient {
    pub fn new(http: reqwest::Client, base_url: &str, tokens: Arc<TokenProvider>) -> Self {
        Self { http, base_url: base_url.to_string(), tokens }
    }

    fn request(&self, keyword: &str, token: &str) -> reqwest::RequestBuilder {
        self.http
            .get(format!("{}/search", self.base_url))
            .bearer_auth(token)
            .query(&[("q", keyword), ("type", "artist")])
    }
}

#[async_trait]
impl ExternalApiClient for MusicClient {
    fn api_name(&self) -> &str {
        API_NAME
    }

    async fn prepare(&self) -> Result<()> {
        self.tokens.access_token().await.map(drop)
    }

    async fn fetch(&self, filter: &ApiFilter) -> Result<serde_json::Value> {
        let keyword = require(API_NAME, "keyword", &filter.keyword)?;
        let token = self.tokens.access_token().await?;
        get_json(API_NAME, self.request(keyword, &token)).await
    }
}
