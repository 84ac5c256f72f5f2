use strmwarp_providers::{AlistError, EmbyError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Item lookup failed: {0}")]
    Lookup(#[from] EmbyError),

    #[error("Gateway resolve failed: {0}")]
    GatewayResolve(#[from] AlistError),

    #[error("No storage gateway registered for {0}")]
    UnknownGateway(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
