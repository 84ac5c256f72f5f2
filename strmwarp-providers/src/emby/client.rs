//! Emby/Jellyfin HTTP Client

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, header::{HeaderMap, HeaderValue, ACCEPT}};

use super::error::EmbyError;
use super::types::ItemsResponse;
use super::ItemDirectory;
use crate::error::{check_response, json_with_limit};

/// URL-encode a string for safe use in query parameters
fn url_encode(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

/// Shared HTTP client for all Emby requests (connection pooling)
static SHARED_CLIENT: LazyLock<Client> = LazyLock::new(|| {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(30))
        .pool_max_idle_per_host(10)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("Failed to build Emby shared HTTP client")
});

const X_EMBY_TOKEN: &str = "X-Emby-Token";

/// Emby/Jellyfin HTTP Client
///
/// Both servers accept `X-Emby-Token` and expose `/Items` at the root of the
/// configured address, so one client serves either backend.
#[derive(Clone)]
pub struct EmbyClient {
    host: String,
    api_key: String,
    client: Client,
}

impl EmbyClient {
    /// Create a new client (reuses shared connection pool)
    pub fn new(host: impl Into<String>, api_key: impl Into<String>) -> Result<Self, EmbyError> {
        let host = host.into().trim_end_matches('/').to_string();
        if host.is_empty() {
            return Err(EmbyError::InvalidConfig("Missing media server address".to_string()));
        }

        Ok(Self {
            host,
            api_key: api_key.into(),
            client: SHARED_CLIENT.clone(),
        })
    }

    /// Get host URL
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Build request headers
    fn build_headers(&self) -> Result<HeaderMap, EmbyError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        if !self.api_key.is_empty() {
            headers.insert(X_EMBY_TOKEN, HeaderValue::from_str(&self.api_key)?);
        }

        Ok(headers)
    }

    /// Query items by id
    ///
    /// `fields` is the comma-joined list of optional fields to include.
    pub async fn query_items(
        &self,
        ids: &str,
        recursive: bool,
        fields: &str,
    ) -> Result<ItemsResponse, EmbyError> {
        let url = format!(
            "{}/Items?Ids={}&Recursive={}&Fields={}",
            self.host,
            url_encode(ids),
            recursive,
            url_encode(fields)
        );

        tracing::debug!(ids, recursive, fields, "Querying media server items");

        let response = self
            .client
            .get(&url)
            .headers(self.build_headers()?)
            .send()
            .await?;

        let response = check_response(response)?;
        let items: ItemsResponse = json_with_limit(response).await?;
        Ok(items)
    }
}

#[async_trait]
impl ItemDirectory for EmbyClient {
    async fn query_item(
        &self,
        id: &str,
        recursive: bool,
        fields: &str,
    ) -> Result<ItemsResponse, EmbyError> {
        self.query_items(id, recursive, fields).await
    }
}
