use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    /// Credentials were rejected, or the requested account is protected.
    #[error("Unauthorized ({0}): credentials rejected or account protected")]
    Unauthorized(StatusCode),

    #[error("Invalid bearer token: {0}")]
    InvalidToken(String),

    #[error("Rate limited ({status}) without a usable x-rate-limit-reset header")]
    Throttled { status: StatusCode },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{status}{}", format_api_message(.message))]
    Status {
        status: StatusCode,
        message: Option<String>,
    },

    #[error("Failed to decode response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Pagination error: {0}")]
    Pagination(String),

    #[error("Request to {0} cannot be replayed")]
    NotRetryable(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

fn format_api_message(message: &Option<String>) -> String {
    match message {
        Some(m) => format!(": {}", m),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
