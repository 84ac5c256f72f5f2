//! Alist HTTP Client
//!
//! Login and `fs/get` against an Alist storage gateway.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE}};
use serde_json::json;
use tokio::sync::Mutex;

use super::error::AlistError;
use super::types::{AlistResp, FsGetResp, FsObject, LoginData};
use super::StorageGateway;
use crate::error::{check_response, json_with_limit};

/// Shared HTTP client for all Alist requests (connection pooling)
/// Redirects are disabled so a misbehaving gateway cannot bounce API
/// calls somewhere else.
static SHARED_CLIENT: LazyLock<Client> = LazyLock::new(|| {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(30))
        .pool_max_idle_per_host(10)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("Failed to build Alist shared HTTP client")
});

/// Alist HTTP Client
///
/// When constructed with credentials the client logs in lazily on first use
/// and caches the token. A token rejected with API code 401 is dropped and the
/// call is retried once after a fresh login.
pub struct AlistClient {
    host: String,
    username: String,
    password: String,
    token: Mutex<Option<String>>,
    client: Client,
}

impl AlistClient {
    /// Create an anonymous client (guest access)
    pub fn new(host: impl Into<String>) -> Result<Self, AlistError> {
        Self::with_credentials(host, "", "")
    }

    /// Create a client that logs in with username/password on demand
    pub fn with_credentials(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, AlistError> {
        let host = host.into().trim_end_matches('/').to_string();
        if host.is_empty() {
            return Err(AlistError::InvalidConfig("Missing Alist address".to_string()));
        }

        Ok(Self {
            host,
            username: username.into(),
            password: password.into(),
            token: Mutex::new(None),
            client: SHARED_CLIENT.clone(),
        })
    }

    /// Get current host
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    fn has_credentials(&self) -> bool {
        !self.username.is_empty()
    }

    /// Build request headers
    fn build_headers(token: Option<&str>) -> Result<HeaderMap, AlistError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = token {
            headers.insert(AUTHORIZATION, HeaderValue::from_str(token)?);
        }

        Ok(headers)
    }

    /// Login to Alist server
    ///
    /// Returns authentication token on success and caches it.
    pub async fn login(&self) -> Result<String, AlistError> {
        let url = format!("{}/api/auth/login", self.host);
        let body = json!({
            "username": self.username,
            "password": self.password,
        });

        let response = self
            .client
            .post(&url)
            .headers(Self::build_headers(None)?)
            .json(&body)
            .send()
            .await?;

        let response = check_response(response)?;
        let resp: AlistResp<LoginData> = json_with_limit(response).await?;

        if resp.code != 200 {
            return Err(AlistError::Auth(format!("code {}: {}", resp.code, resp.message)));
        }

        let token = resp
            .data
            .ok_or_else(|| AlistError::Parse("Missing login data in response".to_string()))?
            .token;

        *self.token.lock().await = Some(token.clone());
        tracing::info!(host = %self.host, "Logged in to Alist");
        Ok(token)
    }

    /// Cached token, logging in first when credentials are configured
    async fn current_token(&self) -> Result<Option<String>, AlistError> {
        if let Some(token) = self.token.lock().await.clone() {
            return Ok(Some(token));
        }
        if self.has_credentials() {
            return self.login().await.map(Some);
        }
        Ok(None)
    }

    async fn fs_get_once(
        &self,
        path: &str,
        password: Option<&str>,
        token: Option<&str>,
    ) -> Result<FsGetResp, AlistError> {
        let url = format!("{}/api/fs/get", self.host);
        let body = json!({
            "path": path,
            "password": password.unwrap_or(""),
        });

        let response = self
            .client
            .post(&url)
            .headers(Self::build_headers(token)?)
            .json(&body)
            .send()
            .await?;

        let response = check_response(response)?;
        let resp: AlistResp<FsGetResp> = json_with_limit(response).await?;

        if resp.code != 200 {
            return Err(AlistError::Api {
                code: resp.code,
                message: resp.message,
            });
        }

        resp.data.ok_or_else(|| AlistError::Parse("Missing data in fs_get response".to_string()))
    }

    /// Get file/folder information
    ///
    /// # Arguments
    /// * `path` - File or directory path
    /// * `password` - Optional password for protected directories
    pub async fn fs_get(&self, path: &str, password: Option<&str>) -> Result<FsGetResp, AlistError> {
        let token = self.current_token().await?;
        match self.fs_get_once(path, password, token.as_deref()).await {
            Err(e) if e.is_unauthorized() && self.has_credentials() => {
                tracing::warn!(host = %self.host, "Alist token rejected, logging in again");
                *self.token.lock().await = None;
                let token = self.login().await?;
                self.fs_get_once(path, password, Some(&token)).await
            }
            result => result,
        }
    }
}

#[async_trait]
impl StorageGateway for AlistClient {
    fn addr(&self) -> &str {
        &self.host
    }

    async fn resolve(&self, path: &str) -> Result<FsObject, AlistError> {
        self.fs_get(path, None).await.map(FsObject::from)
    }
}
