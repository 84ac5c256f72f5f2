//! Video stream endpoint
//!
//! Pointer-backed media sources are answered with a `302` to the playable
//! URL. Everything else is forwarded to the media server untouched.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::Request,
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
};
use regex::Regex;
use strmwarp_core::{
    is_strm, lookup_item, BackendProfile, GatewayRedirect, RedirectResolver, StrmClassifier, StrmKind,
};
use strmwarp_providers::{ItemDirectory, MediaProtocol};
use strmwarp_proxy::{bad_gateway, ReverseProxy};

use crate::routes::RouteHandler;

const MEDIA_SOURCE_ID: &str = "mediasourceid";

/// `302 Found` with an empty body
pub fn found(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::FOUND, [(header::LOCATION, value)]).into_response(),
        Err(_) => {
            tracing::warn!("Redirect target is not a valid header value");
            bad_gateway()
        }
    }
}

/// `MediaSourceId` from a query string, matching the key case-insensitively
fn media_source_id(query: Option<&str>) -> Option<String> {
    url::form_urlencoded::parse(query?.as_bytes())
        .find(|(key, _)| key.eq_ignore_ascii_case(MEDIA_SOURCE_ID))
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

pub struct VideosHandler {
    profile: &'static BackendProfile,
    proxy: ReverseProxy,
    directory: Arc<dyn ItemDirectory>,
    classifier: Arc<StrmClassifier>,
    resolver: RedirectResolver,
    gateway: GatewayRedirect,
    legacy: Option<Regex>,
}

impl VideosHandler {
    pub fn new(
        profile: &'static BackendProfile,
        proxy: ReverseProxy,
        directory: Arc<dyn ItemDirectory>,
        classifier: Arc<StrmClassifier>,
        resolver: RedirectResolver,
        gateway: GatewayRedirect,
        legacy: Option<Regex>,
    ) -> Self {
        Self {
            profile,
            proxy,
            directory,
            classifier,
            resolver,
            gateway,
            legacy,
        }
    }

    /// `/videos/{id}/stream/<file>` → `/videos/{id}/stream`, query kept
    fn legacy_redirect(&self, req: &Request) -> Option<Response> {
        let caps = self.legacy.as_ref()?.captures(req.uri().path())?;
        let mut target = format!("{}/{}/stream", &caps[1], &caps[2]);
        if let Some(query) = req.uri().query() {
            target.push('?');
            target.push_str(query);
        }
        tracing::debug!(from = %req.uri().path(), to = %target, "Redirecting legacy stream path");
        Some(found(&target))
    }

    async fn redirect_pointer(&self, req: Request) -> Response {
        let Some(source_id) = media_source_id(req.uri().query()) else {
            return self.proxy.forward(req).await;
        };

        let item_id = self.profile.item_id(&source_id);
        let item = match lookup_item(self.directory.as_ref(), item_id).await {
            Ok(item) => item,
            Err(e) => {
                tracing::warn!(%item_id, "Item lookup failed, forwarding: {}", e);
                return self.proxy.forward(req).await;
            }
        };

        let path = item.path_or_empty();
        if !is_strm(path) {
            tracing::debug!(%item_id, %path, "Local media, forwarding");
            return self.proxy.forward(req).await;
        }

        let Some(source) = item.media_source(&source_id) else {
            tracing::debug!(%item_id, %source_id, "No matching media source, forwarding");
            return self.proxy.forward(req).await;
        };
        let Some(target) = source.path.as_deref() else {
            return self.proxy.forward(req).await;
        };

        match self.classifier.classify(path) {
            StrmKind::HttpPointer if source.protocol == Some(MediaProtocol::Http) => {
                let user_agent = req.headers().get(header::USER_AGENT);
                match self.resolver.resolve(target, user_agent).await {
                    Ok(url) => {
                        tracing::info!(%item_id, %source_id, "HTTP strm redirected");
                        found(&url)
                    }
                    Err(e) => {
                        tracing::warn!(%item_id, %source_id, hop = e.hop(), "HTTP strm resolution failed: {}", e);
                        bad_gateway()
                    }
                }
            }
            StrmKind::GatewayPointer(addr) => match self.gateway.redirect_url(&addr, target).await {
                Ok(url) => {
                    tracing::info!(%item_id, %source_id, gateway = %addr, "Alist strm redirected");
                    found(&url)
                }
                Err(e) => {
                    tracing::warn!(%item_id, %source_id, gateway = %addr, "Alist strm resolution failed: {}", e);
                    bad_gateway()
                }
            },
            StrmKind::HttpPointer | StrmKind::Unknown | StrmKind::LocalFile => self.proxy.forward(req).await,
        }
    }
}

#[async_trait]
impl RouteHandler for VideosHandler {
    async fn handle(&self, req: Request) -> Response {
        if req.method() == Method::HEAD {
            return self.proxy.forward(req).await;
        }
        if let Some(response) = self.legacy_redirect(&req) {
            return response;
        }
        self.redirect_pointer(req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_source_id_is_case_insensitive() {
        assert_eq!(
            media_source_id(Some("Static=true&mediaSourceId=mediasource_31")).as_deref(),
            Some("mediasource_31")
        );
        assert_eq!(media_source_id(Some("MEDIASOURCEID=7")).as_deref(), Some("7"));
        assert_eq!(media_source_id(Some("Static=true")), None);
        assert_eq!(media_source_id(Some("MediaSourceId=")), None);
        assert_eq!(media_source_id(None), None);
    }

    #[test]
    fn test_found_has_location_and_no_body() {
        let resp = found("https://cdn.example/a.mkv?x=1");
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(resp.headers().get(header::LOCATION).unwrap(), "https://cdn.example/a.mkv?x=1");
        assert_eq!(found("bad\nvalue").status(), StatusCode::BAD_GATEWAY);
    }
}
