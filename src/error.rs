use axum::{http::StatusCode, response::IntoResponse, Json};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("No provider client for kind '{0}'")]
    UnsupportedKind(String),

    #[error("Provider failure: {0}")]
    Provider(#[from] ProviderError),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::UnsupportedKind(_)
            | AppError::Provider(_)
            | AppError::Upstream(_)
            | AppError::Http(_) => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = serde_json::json!({ "ok": false, "detail": self.to_string() });
        (status, Json(body)).into_response()
    }
}

/// Transport-level failure talking to a provider. Application-level errors
/// (non-2xx, `error` in the payload) are not represented here; they come back
/// as a normal `ProviderResponse` and are classified by the scheduler.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("response body could not be decoded: {0}")]
    Decode(String),

    #[error("request failed: {0}")]
    Request(String),
}

impl ProviderError {
    /// Short class name recorded as `exception:<class>` on the watch item.
    pub fn class(&self) -> &'static str {
        match self {
            ProviderError::Timeout => "Timeout",
            ProviderError::Connect(_) => "ConnectError",
            ProviderError::Decode(_) => "DecodeError",
            ProviderError::Request(_) => "RequestError",
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout
        } else if e.is_connect() {
            ProviderError::Connect(e.to_string())
        } else if e.is_decode() {
            ProviderError::Decode(e.to_string())
        } else {
            ProviderError::Request(e.to_string())
        }
    }
}
