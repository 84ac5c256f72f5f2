//! Ordered regex route table
//!
//! Rules are tried in order against the request path; the first match owns
//! the request. Anything unmatched goes to the transparent proxy.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{extract::Request, response::Response};
use regex::Regex;
use strmwarp_proxy::{ReverseProxy, RewritePipeline};

/// Path patterns per backend
pub mod patterns {
    pub const EMBY_VIDEOS: &str = r"(?i)^(?:/emby)?/videos/\d+/(?:stream|original)";
    /// Old clients append the file name after `stream`
    pub const EMBY_LEGACY_VIDEOS: &str = r"(?i)^((?:/emby)?/videos)/(\d+)/(?:stream|original)/.+";
    pub const EMBY_PLAYBACK_INFO: &str = r"(?i)^(?:/emby)?/Items/\d+/PlaybackInfo";
    pub const EMBY_PLAYER_SCRIPT: &str = r"(?i)^/web/modules/htmlvideoplayer/basehtmlplayer\.js$";
    pub const EMBY_INDEX: &str = r"^/web/index\.html$";
    pub const EMBY_SUBTITLES: &str = r"(?i)^(?:/emby)?/videos/\d+/[^/]+/subtitles/\d+/(?:\d+/)?stream";

    pub const JELLYFIN_PLAYBACK_INFO: &str = r"(?i)^/Items/\w+/PlaybackInfo";
    pub const JELLYFIN_VIDEOS: &str = r"(?i)^/Videos/\w+/stream";
    pub const JELLYFIN_INDEX: &str = r"^/web/(?:index\.html)?$";
}

/// Handler owning a matched request
#[async_trait]
pub trait RouteHandler: Send + Sync {
    async fn handle(&self, req: Request) -> Response;
}

#[async_trait]
impl RouteHandler for RewritePipeline {
    async fn handle(&self, req: Request) -> Response {
        Self::handle(self, req).await
    }
}

pub struct RouteRule {
    pub pattern: Regex,
    pub handler: Arc<dyn RouteHandler>,
}

impl RouteRule {
    pub fn new(pattern: &str, handler: Arc<dyn RouteHandler>) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            handler,
        })
    }
}

/// Immutable after construction; shared across connections
pub struct RouteTable {
    rules: Vec<RouteRule>,
    fallback: ReverseProxy,
}

impl RouteTable {
    pub fn new(rules: Vec<RouteRule>, fallback: ReverseProxy) -> Self {
        Self { rules, fallback }
    }

    /// Index of the first rule matching `path`
    #[must_use]
    pub fn matching_rule(&self, path: &str) -> Option<usize> {
        self.rules.iter().position(|rule| rule.pattern.is_match(path))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub async fn dispatch(&self, req: Request) -> Response {
        match self.matching_rule(req.uri().path()) {
            Some(index) => {
                let rule = &self.rules[index];
                tracing::debug!(path = %req.uri().path(), pattern = %rule.pattern, "Route matched");
                rule.handler.handle(req).await
            }
            None => self.fallback.forward(req).await,
        }
    }
}
