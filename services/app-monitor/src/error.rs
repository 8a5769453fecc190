//! Error types for the application monitor

/// Errors that can occur in the application monitor
#[derive(Debug, thiserror::Error)]
pub enum AppMonitorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Email delivery failed: {0}")]
    Email(String),

    #[error("Webhook delivery failed: {0}")]
    Webhook(String),
}

/// Result type alias for application monitor operations
pub type Result<T> = std::result::Result<T, AppMonitorError>;
