//! Alist Provider Client
//!
//! Pure HTTP client for the Alist storage gateway.
//!
//! # Example
//!
//! ```no_run
//! use strmwarp_providers::alist::{AlistClient, StorageGateway};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = AlistClient::with_credentials("https://alist.example.com", "admin", "password")?;
//! let object = client.resolve("/movies/video.mp4").await?;
//! println!("{} bytes, sign={}", object.size, object.sign);
//! # Ok(())
//! # }
//! ```

mod client;
pub mod error;
pub mod types;

use async_trait::async_trait;

pub use client::AlistClient;
pub use error::AlistError;
pub use types::*;

/// Storage gateway interface consumed by the proxy core
#[async_trait]
pub trait StorageGateway: Send + Sync {
    /// Address this gateway was configured with (no trailing slash)
    fn addr(&self) -> &str;

    /// Resolve a gateway path to its size, raw URL and signature
    async fn resolve(&self, path: &str) -> Result<FsObject, AlistError>;
}
