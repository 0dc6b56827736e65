use thiserror::Error;

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No sending domain configured")]
    NotConfigured,

    #[error("DNS resolution unavailable: {0}")]
    ResolutionUnavailable(String),

    #[error("Concurrent modification, re-fetch and retry")]
    StaleWrite,

    #[error("Key material error: {0}")]
    KeyMaterial(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, IdentityError>;
