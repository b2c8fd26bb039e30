use axum::{http::StatusCode, response::IntoResponse};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Could not obtain {api} access token: {reason}")]
    Auth { api: String, reason: String },

    #[error("Upstream {api} returned status {status}")]
    Upstream { api: String, status: u16 },

    #[error("Time range error: {0}")]
    TimeRange(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// The call failed before a request reached the upstream API.
    pub fn is_before_send(&self) -> bool {
        matches!(self, AppError::InvalidFilter(_) | AppError::Auth { .. })
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::InvalidFilter(_) => StatusCode::BAD_REQUEST,
            AppError::Upstream { .. } | AppError::Auth { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}
