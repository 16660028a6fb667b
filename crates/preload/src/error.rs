use reqwest::StatusCode;
use thiserror::Error;

// Custom error type for cache server operations
#[derive(Debug, Error)]
pub enum PreloadError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Server returned status code {0}")]
    StatusCode(StatusCode),
}
