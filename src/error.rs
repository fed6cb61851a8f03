use thiserror::Error;

#[derive(Error, Debug)]
pub enum TestLensError {
    #[error("Azure DevOps API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Unexpected response shape: {0}")]
    Shape(String),

    #[error("{0} (cached failure, clear the cache to retry)")]
    CachedFailure(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TestLensError>;
