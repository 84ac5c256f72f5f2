//! Storage gateway registry and redirect construction

use std::collections::HashMap;
use std::sync::Arc;

use strmwarp_providers::{AlistClient, FsObject, StorageGateway};
use url::Url;

use crate::config::AlistStrmConfig;
use crate::error::{Error, Result};

/// Gateway clients keyed by their configured address (no trailing slash)
#[derive(Default)]
pub struct GatewayRegistry {
    gateways: HashMap<String, Arc<dyn StorageGateway>>,
}

impl GatewayRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build one Alist client per configured gateway
    pub fn from_config(config: &AlistStrmConfig) -> Result<Self> {
        let mut registry = Self::new();
        if !config.enable {
            return Ok(registry);
        }
        for server in &config.list {
            let client = AlistClient::with_credentials(&server.addr, &server.username, &server.password)
                .map_err(|e| Error::Config(e.to_string()))?;
            registry.register(Arc::new(client));
        }
        Ok(registry)
    }

    pub fn register(&mut self, gateway: Arc<dyn StorageGateway>) {
        let addr = gateway.addr().trim_end_matches('/').to_string();
        if self.gateways.insert(addr.clone(), gateway).is_some() {
            tracing::warn!(%addr, "Storage gateway registered twice, keeping the last one");
        }
    }

    pub fn get(&self, addr: &str) -> Result<&Arc<dyn StorageGateway>> {
        self.gateways
            .get(addr.trim_end_matches('/'))
            .ok_or_else(|| Error::UnknownGateway(addr.to_string()))
    }

    pub async fn resolve(&self, addr: &str, path: &str) -> Result<FsObject> {
        Ok(self.get(addr)?.resolve(path).await?)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.gateways.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.gateways.is_empty()
    }
}

/// Redirect target for a gateway pointer
pub struct GatewayRedirect {
    registry: Arc<GatewayRegistry>,
    raw_url: bool,
}

impl GatewayRedirect {
    pub fn new(registry: Arc<GatewayRegistry>, raw_url: bool) -> Self {
        Self { registry, raw_url }
    }

    /// `raw_url` policy returns the backing storage URL, otherwise the
    /// gateway's own `/d` download path, signed when the gateway asks for it.
    pub async fn redirect_url(&self, addr: &str, path: &str) -> Result<String> {
        let object = self.registry.resolve(addr, path).await?;
        if self.raw_url {
            return Ok(object.raw_url);
        }
        download_url(addr, path, &object.sign)
    }
}

/// `{addr}/d{path}` with every path segment percent-encoded
fn download_url(addr: &str, path: &str, sign: &str) -> Result<String> {
    let mut url = Url::parse(addr).map_err(|e| Error::InvalidUrl(format!("{addr}: {e}")))?;
    url.path_segments_mut()
        .map_err(|()| Error::InvalidUrl(format!("{addr}: cannot be a base")))?
        .pop_if_empty()
        .push("d")
        .extend(path.split('/').filter(|segment| !segment.is_empty()));
    url.set_query(None);
    if !sign.is_empty() {
        url.query_pairs_mut().append_pair("sign", sign);
    }
    Ok(url.into())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use strmwarp_providers::AlistError;

    /// In-memory gateway that counts lookups
    pub(crate) struct FakeGateway {
        pub addr: String,
        pub object: Option<FsObject>,
        pub calls: AtomicUsize,
    }

    impl FakeGateway {
        pub(crate) fn new(addr: &str, object: Option<FsObject>) -> Self {
            Self {
                addr: addr.to_string(),
                object,
                calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl StorageGateway for FakeGateway {
        fn addr(&self) -> &str {
            &self.addr
        }

        async fn resolve(&self, path: &str) -> std::result::Result<FsObject, AlistError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.object.clone().ok_or_else(|| AlistError::Api {
                code: 500,
                message: format!("object not found: {path}"),
            })
        }
    }

    fn object(sign: &str) -> FsObject {
        FsObject {
            size: 2048,
            raw_url: "https://storage.example/raw/a.mkv".to_string(),
            sign: sign.to_string(),
        }
    }

    fn registry(object: Option<FsObject>) -> Arc<GatewayRegistry> {
        let mut registry = GatewayRegistry::new();
        registry.register(Arc::new(FakeGateway::new("http://alist:5244", object)));
        Arc::new(registry)
    }

    #[tokio::test]
    async fn test_download_path_with_sign() {
        let redirect = GatewayRedirect::new(registry(Some(object("abc:0"))), false);
        let url = redirect.redirect_url("http://alist:5244", "/movies/a.mkv").await.unwrap();
        assert_eq!(url, "http://alist:5244/d/movies/a.mkv?sign=abc%3A0");
    }

    #[tokio::test]
    async fn test_download_path_without_sign() {
        let redirect = GatewayRedirect::new(registry(Some(object(""))), false);
        let url = redirect.redirect_url("http://alist:5244/", "/movies/a.mkv").await.unwrap();
        assert_eq!(url, "http://alist:5244/d/movies/a.mkv");
    }

    #[test]
    fn test_download_path_is_percent_encoded() {
        let url = download_url("http://alist:5244", "/电影/My Film #1.mkv", "").unwrap();
        assert_eq!(url, "http://alist:5244/d/%E7%94%B5%E5%BD%B1/My%20Film%20%231.mkv");
        assert!(url.is_ascii());
        assert!(http::HeaderValue::from_str(&url).is_ok());

        let url = download_url("http://alist:5244/sub/", "/a b.mkv", "k=1/2").unwrap();
        assert_eq!(url, "http://alist:5244/sub/d/a%20b.mkv?sign=k%3D1%2F2");

        assert!(matches!(download_url("not a url", "/a.mkv", ""), Err(Error::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_raw_url_policy() {
        let redirect = GatewayRedirect::new(registry(Some(object("abc"))), true);
        let url = redirect.redirect_url("http://alist:5244", "/movies/a.mkv").await.unwrap();
        assert_eq!(url, "https://storage.example/raw/a.mkv");
    }

    #[tokio::test]
    async fn test_unknown_gateway_and_resolve_failure() {
        let redirect = GatewayRedirect::new(registry(None), false);
        assert!(matches!(
            redirect.redirect_url("http://other:5244", "/a.mkv").await,
            Err(Error::UnknownGateway(_))
        ));
        assert!(matches!(
            redirect.redirect_url("http://alist:5244", "/a.mkv").await,
            Err(Error::GatewayResolve(_))
        ));
    }

    #[test]
    fn test_from_config_skips_when_disabled() {
        let mut config = AlistStrmConfig::default();
        config.list.push(crate::config::AlistServerConfig {
            addr: "http://alist:5244".to_string(),
            ..Default::default()
        });
        assert!(GatewayRegistry::from_config(&config).unwrap().is_empty());

        config.enable = true;
        let registry = GatewayRegistry::from_config(&config).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.get("http://alist:5244/").is_ok());
    }
}
