//! Emby/Jellyfin Provider Client Error Types

use thiserror::Error;

use crate::error::ProviderClientError;

#[derive(Debug, Error)]
pub enum EmbyError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP error {status} for {url}")]
    Http { status: reqwest::StatusCode, url: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Item not found: {0}")]
    NotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid header value: {0}")]
    InvalidHeader(String),

    #[error("Response too large ({size} bytes)")]
    ResponseTooLarge { size: u64 },
}

impl From<ProviderClientError> for EmbyError {
    fn from(err: ProviderClientError) -> Self {
        match err {
            ProviderClientError::Network(msg) => Self::Network(msg),
            ProviderClientError::Http { status, url } => Self::Http { status, url },
            ProviderClientError::Parse(msg) => Self::Parse(msg),
            ProviderClientError::ResponseTooLarge { size } => Self::ResponseTooLarge { size },
        }
    }
}

impl From<reqwest::Error> for EmbyError {
    fn from(err: reqwest::Error) -> Self {
        ProviderClientError::from(err).into()
    }
}

impl From<reqwest::header::InvalidHeaderValue> for EmbyError {
    fn from(err: reqwest::header::InvalidHeaderValue) -> Self {
        Self::InvalidHeader(err.to_string())
    }
}
