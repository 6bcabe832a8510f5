//! Error types for storykeep

use std::time::Duration;
use thiserror::Error;

/// Result type alias for storykeep operations
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for the application
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Push(#[from] PushError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Interactive prompt error: {0}")]
    Dialoguer(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Operation failed: {0}")]
    Other(String),
}

impl From<dialoguer::Error> for Error {
    fn from(err: dialoguer::Error) -> Self {
        Error::Dialoguer(err.to_string())
    }
}

/// Remote story API errors
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("Authentication failed. Run `storykeep auth login` to store a token.")]
    Unauthorized,

    #[error("Access denied. The server rejected this request.")]
    Forbidden,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limit exceeded. Retry after {0:?}")]
    RateLimit(Duration),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid API response: {0}")]
    InvalidResponse(String),
}

impl ApiError {
    /// Whether the failure happened before the server could answer
    pub fn is_network(&self) -> bool {
        matches!(self, ApiError::Network(_))
    }

    /// Whether the same request may succeed later unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::Network(_) | ApiError::ServerError(_) | ApiError::RateLimit(_)
        )
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Network("Request timed out".to_string())
        } else if err.is_connect() {
            ApiError::Network("Failed to connect to API".to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

/// Failures of the worker's network layer
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("Network unreachable: {0}")]
    Network(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            FetchError::InvalidRequest(err.to_string())
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to save configuration: {0}")]
    SaveError(String),
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

/// Response cache errors
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache I/O error: {0}")]
    Io(String),

    #[error("Cache database error: {0}")]
    Database(String),

    #[error("Install failed: none of the {0} precache entries could be fetched")]
    InstallFailed(usize),
}

impl From<rusqlite::Error> for CacheError {
    fn from(err: rusqlite::Error) -> Self {
        CacheError::Database(err.to_string())
    }
}

/// Durable story store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to open story store: {0}")]
    Open(String),

    #[error("Story store transaction failed: {0}")]
    Transaction(String),

    #[error("Story store version {found} is newer than supported version {supported}")]
    VersionTooNew { found: i32, supported: i32 },

    #[error("Invalid story record: {0}")]
    InvalidRecord(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Transaction(err.to_string())
    }
}

/// Push subscription errors, one variant per user-facing cause
#[derive(Debug, Error)]
pub enum PushError {
    #[error("Push notifications are not supported: {0}")]
    Unsupported(String),

    #[error("Please login first to enable notifications.")]
    NotLoggedIn,

    #[error("Notification permission denied.")]
    PermissionDenied,

    #[error("Push server rejected the subscription: {0}")]
    Server(#[source] ApiError),

    #[error("Push platform error: {0}")]
    Platform(String),
}
