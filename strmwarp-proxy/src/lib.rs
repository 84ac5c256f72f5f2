//! Reverse proxy plumbing
//!
//! Transparent single-upstream forwarding plus a buffered response rewrite
//! pipeline. Used by the media-server adapter in `strmwarp-api`.
//!
//! Protocol upgrades (the web client's WebSocket) are tunnelled: the
//! handshake goes upstream and on `101` both connections are spliced.

pub mod rewrite;

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, Request},
    http::{
        header::{CONNECTION, HOST, UPGRADE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
};
use hyper_util::rt::TokioIo;
use url::Url;

pub use rewrite::{BufferedResponse, ResponseTransform, RewritePipeline, MAX_REWRITE_BODY};

/// Largest inbound request body forwarded upstream (64 MB).
pub const MAX_REQUEST_BODY: usize = 64 * 1024 * 1024;

/// Headers that describe a single connection and must not be forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_FORWARDED_HOST: &str = "x-forwarded-host";

/// Single-host reverse proxy.
///
/// Bodies are streamed back to the client as they arrive and upstream
/// redirects are passed through untouched.
#[derive(Clone)]
pub struct ReverseProxy {
    upstream: Url,
    client: reqwest::Client,
}

impl ReverseProxy {
    /// Create a proxy for the given upstream base URL (e.g. `http://127.0.0.1:8096`).
    pub fn new(upstream: &str) -> Result<Self, anyhow::Error> {
        let upstream = Url::parse(upstream)
            .map_err(|e| anyhow::anyhow!("Invalid upstream address '{upstream}': {e}"))?;
        if !matches!(upstream.scheme(), "http" | "https") {
            return Err(anyhow::anyhow!(
                "Upstream address must use http or https, got '{}'",
                upstream.scheme()
            ));
        }

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {e}"))?;

        Ok(Self { upstream, client })
    }

    /// Upstream base URL
    #[must_use]
    pub const fn upstream(&self) -> &Url {
        &self.upstream
    }

    /// Join the upstream base with the inbound path and query.
    fn target_url(&self, req: &Request) -> String {
        let base = self.upstream.as_str().trim_end_matches('/');
        let path_and_query = req
            .uri()
            .path_and_query()
            .map_or("/", axum::http::uri::PathAndQuery::as_str);
        format!("{base}{path_and_query}")
    }

    /// Forwardable request headers plus `X-Forwarded-*`.
    fn upstream_headers(req: &Request) -> HeaderMap {
        let mut headers = forwardable_headers(req.headers());
        if let Some(host) = req.headers().get(HOST) {
            headers.insert(X_FORWARDED_HOST, host.clone());
        }
        let client_addr = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        if let Some(ip) = client_addr {
            let forwarded_for = match req.headers().get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
                Some(prior) => format!("{prior}, {ip}"),
                None => ip.to_string(),
            };
            if let Ok(value) = HeaderValue::from_str(&forwarded_for) {
                headers.insert(X_FORWARDED_FOR, value);
            }
        }
        headers
    }

    /// Send the request upstream and hand back the raw upstream response.
    pub async fn send(&self, req: Request) -> Result<reqwest::Response, anyhow::Error> {
        let url = self.target_url(&req);
        let headers = Self::upstream_headers(&req);
        let (parts, body) = req.into_parts();

        let body = axum::body::to_bytes(body, MAX_REQUEST_BODY)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read request body: {e}"))?;

        let mut request = self.client.request(parts.method, &url).headers(headers);
        if !body.is_empty() {
            request = request.body(body);
        }

        request
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Upstream request failed: {}", e.without_url()))
    }

    /// Forward the request and stream the upstream response back unchanged.
    pub async fn forward(&self, req: Request) -> Response {
        if is_upgrade_request(req.headers()) {
            return self.tunnel(req).await;
        }
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        match self.send(req).await {
            Ok(upstream) => stream_response(upstream),
            Err(e) => {
                tracing::warn!(%method, %path, "Proxy forward failed: {}", e);
                bad_gateway()
            }
        }
    }

    /// Relay an upgrade handshake and splice the upgraded connections.
    ///
    /// A non-`101` answer is streamed back like any other response.
    async fn tunnel(&self, mut req: Request) -> Response {
        let path = req.uri().path().to_string();
        let on_client_upgrade = hyper::upgrade::on(&mut req);

        let url = self.target_url(&req);
        let mut headers = Self::upstream_headers(&req);
        headers.insert(CONNECTION, HeaderValue::from_static("upgrade"));
        if let Some(protocol) = req.headers().get(UPGRADE) {
            headers.insert(UPGRADE, protocol.clone());
        }

        let upstream = match self.client.request(req.method().clone(), &url).headers(headers).send().await {
            Ok(upstream) => upstream,
            Err(e) => {
                tracing::warn!(%path, "Upgrade handshake failed: {}", e.without_url());
                return bad_gateway();
            }
        };
        if upstream.status() != StatusCode::SWITCHING_PROTOCOLS {
            return stream_response(upstream);
        }

        let mut headers = client_headers(upstream.headers());
        headers.insert(CONNECTION, HeaderValue::from_static("upgrade"));
        if let Some(protocol) = upstream.headers().get(UPGRADE) {
            headers.insert(UPGRADE, protocol.clone());
        }

        tokio::spawn(async move {
            let (client, mut server) = match tokio::try_join!(
                async { on_client_upgrade.await.map_err(anyhow::Error::from) },
                async { upstream.upgrade().await.map_err(anyhow::Error::from) },
            ) {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::warn!(%path, "Connection upgrade failed: {}", e);
                    return;
                }
            };
            let mut client = TokioIo::new(client);
            match tokio::io::copy_bidirectional(&mut client, &mut server).await {
                Ok((sent, received)) => tracing::debug!(%path, sent, received, "Upgraded connection closed"),
                Err(e) => tracing::debug!(%path, "Upgraded connection ended: {}", e),
            }
        });

        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
        *response.headers_mut() = headers;
        response
    }
}

/// `Connection: upgrade` together with an `Upgrade` protocol
fn is_upgrade_request(headers: &HeaderMap) -> bool {
    headers.contains_key(UPGRADE)
        && headers
            .get_all(CONNECTION)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
}

/// Copy request headers that are safe to forward upstream.
fn forwardable_headers(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if name == HOST || HOP_BY_HOP.contains(&name.as_str()) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

/// Copy upstream response headers that are safe to send to the client.
pub(crate) fn client_headers(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if HOP_BY_HOP.contains(&name.as_str()) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

/// Turn an upstream response into a client response without buffering.
pub fn stream_response(upstream: reqwest::Response) -> Response {
    let status = upstream.status();
    let headers = client_headers(upstream.headers());
    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Empty `502 Bad Gateway`; details stay in the log.
#[must_use]
pub fn bad_gateway() -> Response {
    StatusCode::BAD_GATEWAY.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_rejects_non_http_upstream() {
        assert!(ReverseProxy::new("ftp://example.com").is_err());
        assert!(ReverseProxy::new("not a url").is_err());
        assert!(ReverseProxy::new("http://127.0.0.1:8096").is_ok());
    }

    #[test]
    fn test_target_url_keeps_base_path_and_query() {
        let proxy = ReverseProxy::new("http://emby.local:8096/emby/").unwrap();
        let req = axum::http::Request::builder()
            .uri("/Items/1/PlaybackInfo?api_key=k")
            .body(Body::empty())
            .unwrap();
        assert_eq!(
            proxy.target_url(&req),
            "http://emby.local:8096/emby/Items/1/PlaybackInfo?api_key=k"
        );
    }

    #[test]
    fn test_hop_by_hop_headers_are_dropped() {
        let mut headers = HeaderMap::new();
        headers.insert("connection", HeaderValue::from_static("keep-alive"));
        headers.insert("host", HeaderValue::from_static("proxy.local"));
        headers.insert("x-emby-token", HeaderValue::from_static("abc"));

        let forwarded = forwardable_headers(&headers);
        assert!(forwarded.get("connection").is_none());
        assert!(forwarded.get("host").is_none());
        assert_eq!(forwarded.get("x-emby-token").unwrap(), "abc");
    }

    #[test]
    fn test_upgrade_request_detection() {
        let mut headers = HeaderMap::new();
        headers.insert(UPGRADE, HeaderValue::from_static("websocket"));
        assert!(!is_upgrade_request(&headers));

        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive, Upgrade"));
        assert!(is_upgrade_request(&headers));

        headers.remove(UPGRADE);
        assert!(!is_upgrade_request(&headers));
    }

    #[tokio::test]
    async fn test_refused_upgrade_is_passed_through() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/socket"))
            .and(header("upgrade", "websocket"))
            .respond_with(ResponseTemplate::new(400).set_body_string("no"))
            .expect(1)
            .mount(&server)
            .await;

        let proxy = ReverseProxy::new(&server.uri()).unwrap();
        let req = axum::http::Request::builder()
            .uri("/socket")
            .header("connection", "Upgrade")
            .header("upgrade", "websocket")
            .body(Body::empty())
            .unwrap();
        let resp = proxy.forward(req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"no");
    }

    #[tokio::test]
    async fn test_forward_is_transparent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/videos/1/stream"))
            .and(query_param("Static", "true"))
            .and(header("x-emby-token", "abc"))
            .respond_with(
                ResponseTemplate::new(206)
                    .insert_header("content-range", "bytes 0-3/10")
                    .set_body_bytes(b"abcd".to_vec()),
            )
            .expect(1)
            .mount(&server)
            .await;

        let proxy = ReverseProxy::new(&server.uri()).unwrap();
        let req = axum::http::Request::builder()
            .uri("/videos/1/stream?Static=true")
            .header("x-emby-token", "abc")
            .body(Body::empty())
            .unwrap();

        let resp = proxy.forward(req).await;
        assert_eq!(resp.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(resp.headers().get("content-range").unwrap(), "bytes 0-3/10");
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"abcd");
    }

    #[tokio::test]
    async fn test_upstream_redirect_is_not_followed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/web"))
            .respond_with(ResponseTemplate::new(302).insert_header("location", "/web/index.html"))
            .mount(&server)
            .await;

        let proxy = ReverseProxy::new(&server.uri()).unwrap();
        let req = axum::http::Request::builder().uri("/web").body(Body::empty()).unwrap();
        let resp = proxy.forward(req).await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(resp.headers().get("location").unwrap(), "/web/index.html");
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_bad_gateway() {
        let proxy = ReverseProxy::new("http://127.0.0.1:1").unwrap();
        let req = axum::http::Request::builder().uri("/").body(Body::empty()).unwrap();
        assert_eq!(proxy.forward(req).await.status(), StatusCode::BAD_GATEWAY);
    }
}
