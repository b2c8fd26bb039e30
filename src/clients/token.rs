use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::config::ClientCredentials;
use crate::error::{AppError, Result};

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Seconds until the token expires.
    expires_in: Option<u64>,
}

struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Obtains bearer tokens through the client-credentials grant and reuses each
/// one until it expires. Concurrent callers on an expired token wait for a
/// single refresh.
pub struct TokenProvider {
    /// Label used in errors and logs.
    api: String,
    http: reqwest::Client,
    credentials: ClientCredentials,
    clock: Arc<dyn Clock>,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    pub fn new(
        api: &str,
        http: reqwest::Client,
        credentials: ClientCredentials,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            api: api.to_string(),
            http,
            credentials,
            clock,
            cached: Mutex::new(None),
        }
    }

    pub async fn access_token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if self.clock.now() < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        let response = self.request_token().await.map_err(|e| AppError::Auth {
            api: self.api.clone(),
            reason: e.to_string(),
        })?;

        let lifetime = response
            .expires_in
            .map(Duration::from_secs)
            .map_or(self.credentials.token_ttl, |d| d.min(self.credentials.token_ttl));
        let now = self.clock.now();
        let expires_at = chrono::Duration::from_std(lifetime)
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .unwrap_or(now);

        info!(api = %self.api, "Access token refreshed, valid for {lifetime:?}");
        *cached = Some(CachedToken { value: response.access_token.clone(), expires_at });
        Ok(response.access_token)
    }

    async fn request_token(&self) -> Result<TokenResponse> {
        debug!(api = %self.api, url = %self.credentials.token_url, "requesting access token");
        let resp = self
            .http
            .post(&self.credentials.token_url)
            .basic_auth(&self.credentials.client_id, Some(&self.credentials.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::Upstream { api: self.api.clone(), status: status.as_u16() });
        }
        Ok(resp.json().await?)
    }
}
