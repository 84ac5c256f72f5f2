//! Emby/Jellyfin Provider Client
//!
//! Item directory lookups against the upstream media server. The proxy only
//! ever asks for an item's stored path and its media sources.

mod client;
pub mod error;
pub mod types;

use async_trait::async_trait;

pub use client::EmbyClient;
pub use error::EmbyError;
pub use types::*;

/// Item directory interface consumed by the proxy core
#[async_trait]
pub trait ItemDirectory: Send + Sync {
    /// `GET /Items?Ids={id}&Recursive={recursive}&Fields={fields}`
    async fn query_item(
        &self,
        id: &str,
        recursive: bool,
        fields: &str,
    ) -> Result<ItemsResponse, EmbyError>;
}
