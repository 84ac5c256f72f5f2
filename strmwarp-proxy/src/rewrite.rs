//! Buffered response rewriting
//!
//! The reverse proxy performs the upstream call, the body is collected into
//! memory, and a [`ResponseTransform`] may replace body and headers before the
//! client sees anything. Only meant for metadata, HTML shells and subtitle
//! text; media payloads must go through [`ReverseProxy::forward`].

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::Request,
    http::{header, HeaderMap, Method, StatusCode},
    response::Response,
};
use bytes::{Bytes, BytesMut};
use futures::StreamExt;

use crate::{bad_gateway, client_headers, stream_response, ReverseProxy};

/// Bodies larger than this (32 MB) are streamed through untouched.
pub const MAX_REWRITE_BODY: usize = 32 * 1024 * 1024;

/// Fully buffered upstream response handed to a transform.
#[derive(Debug, Clone)]
pub struct BufferedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl BufferedResponse {
    #[must_use]
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// Replace the body; the length header is recomputed on emit.
    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        self.body = body.into();
        self.headers.remove(header::CONTENT_LENGTH);
    }

    #[must_use]
    pub fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// A body rewrite applied to one upstream response.
///
/// Returning an error means "leave the response alone": the pipeline then
/// delivers the original upstream response.
#[async_trait]
pub trait ResponseTransform: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    async fn transform(&self, response: &mut BufferedResponse) -> anyhow::Result<()>;
}

enum Collected {
    Complete(Bytes),
    Overflow(Body),
}

/// Read the whole body unless it grows past `limit`, in which case the part
/// already read is stitched back in front of the remaining stream.
async fn collect_body(upstream: reqwest::Response, limit: usize) -> Result<Collected, reqwest::Error> {
    let mut stream = Box::pin(upstream.bytes_stream());
    let mut buf = BytesMut::new();

    while let Some(chunk) = stream.next().await {
        buf.extend_from_slice(&chunk?);
        if buf.len() > limit {
            let head = futures::stream::once(async move { Ok::<_, reqwest::Error>(buf.freeze()) });
            return Ok(Collected::Overflow(Body::from_stream(head.chain(stream))));
        }
    }

    Ok(Collected::Complete(buf.freeze()))
}

/// Reverse proxy decorated with a response transform.
#[derive(Clone)]
pub struct RewritePipeline {
    proxy: ReverseProxy,
    transform: Arc<dyn ResponseTransform>,
}

impl RewritePipeline {
    pub fn new(proxy: ReverseProxy, transform: Arc<dyn ResponseTransform>) -> Self {
        Self { proxy, transform }
    }

    pub async fn handle(&self, mut req: Request) -> Response {
        let path = req.uri().path().to_string();
        let is_head = req.method() == Method::HEAD;

        // Ask for an identity-encoded body so the transform sees plain text.
        req.headers_mut().remove(header::ACCEPT_ENCODING);

        let upstream = match self.proxy.send(req).await {
            Ok(upstream) => upstream,
            Err(e) => {
                tracing::warn!(%path, transform = self.transform.name(), "Upstream request failed: {}", e);
                return bad_gateway();
            }
        };

        let too_large = upstream
            .content_length()
            .is_some_and(|len| len > MAX_REWRITE_BODY as u64);
        if is_head || !upstream.status().is_success() || too_large {
            return stream_response(upstream);
        }

        let status = upstream.status();
        let headers = client_headers(upstream.headers());
        let body = match collect_body(upstream, MAX_REWRITE_BODY).await {
            Ok(Collected::Complete(body)) => body,
            Ok(Collected::Overflow(body)) => {
                tracing::warn!(%path, "Response exceeds rewrite limit, passing through unmodified");
                let mut response = Response::new(body);
                *response.status_mut() = status;
                *response.headers_mut() = headers;
                return response;
            }
            Err(e) => {
                tracing::warn!(%path, "Failed to read upstream body: {}", e.without_url());
                return bad_gateway();
            }
        };

        let original = BufferedResponse::new(status, headers, body);
        let mut rewritten = original.clone();
        match self.transform.transform(&mut rewritten).await {
            Ok(()) => rewritten.into_response(),
            Err(e) => {
                tracing::warn!(
                    %path,
                    transform = self.transform.name(),
                    "Response rewrite failed, passing upstream body through: {:#}",
                    e
                );
                original.into_response()
            }
        }
    }
}
