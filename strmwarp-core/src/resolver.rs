//! Redirect resolution for HTTP pointer files
//!
//! The stored URL is probed with `HEAD` (redirects not followed). A plain
//! redirect answer is final. A redirect into the same host's
//! `/302/?pickcode=` endpoint costs exactly one more probe.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, LOCATION, USER_AGENT};
use reqwest::{Client, StatusCode};
use thiserror::Error;
use url::Url;

/// Location prefix that delegates to the pickcode endpoint on the same host.
pub const PICKCODE_PREFIX: &str = "/302/?pickcode=";

pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Invalid URL at hop {hop}: {message}")]
    InvalidUrl { hop: u8, message: String },

    #[error("Probe {hop} failed: {source}")]
    Transport {
        hop: u8,
        #[source]
        source: reqwest::Error,
    },

    #[error("Probe {hop} answered a redirect without Location")]
    MissingLocation { hop: u8 },
}

impl ResolveError {
    /// Probe number (1 or 2) where resolution stopped
    #[must_use]
    pub const fn hop(&self) -> u8 {
        match self {
            Self::InvalidUrl { hop, .. } | Self::Transport { hop, .. } | Self::MissingLocation { hop } => *hop,
        }
    }
}

/// Parse `raw` and re-encode its query with keys sorted.
///
/// Values of a repeated key keep their relative order; an empty query is
/// dropped entirely.
pub fn normalize_url(raw: &str, hop: u8) -> Result<Url, ResolveError> {
    let mut url = Url::parse(raw).map_err(|e| ResolveError::InvalidUrl {
        hop,
        message: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ResolveError::InvalidUrl {
            hop,
            message: format!("unsupported scheme '{}'", url.scheme()),
        });
    }
    normalize_query(&mut url);
    Ok(url)
}

pub fn normalize_query(url: &mut Url) {
    let mut pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    if pairs.is_empty() {
        url.set_query(None);
        return;
    }
    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    url.query_pairs_mut().clear().extend_pairs(pairs);
}

fn is_redirect(status: StatusCode) -> bool {
    matches!(status, StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND)
}

fn location(headers: &HeaderMap) -> Option<String> {
    headers
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Multi-hop `HEAD` prober
#[derive(Clone)]
pub struct RedirectResolver {
    client: Client,
}

impl RedirectResolver {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(PROBE_TIMEOUT)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { client })
    }

    async fn probe(&self, url: &Url, headers: &HeaderMap, hop: u8) -> Result<(StatusCode, Option<String>), ResolveError> {
        let response = self
            .client
            .head(url.as_str())
            .headers(headers.clone())
            .send()
            .await
            .map_err(|e| ResolveError::Transport {
                hop,
                source: e.without_url(),
            })?;
        Ok((response.status(), location(response.headers())))
    }

    /// Find the URL a player should be redirected to for `stored_url`.
    ///
    /// `user_agent` is forwarded verbatim; without one an empty header is sent.
    pub async fn resolve(&self, stored_url: &str, user_agent: Option<&HeaderValue>) -> Result<String, ResolveError> {
        let first = normalize_url(stored_url, 1)?;

        let mut headers = HeaderMap::new();
        let ua = user_agent.cloned().unwrap_or_else(|| HeaderValue::from_static(""));
        headers.insert(USER_AGENT, ua);

        let (status, location) = self.probe(&first, &headers, 1).await?;
        if !is_redirect(status) {
            return Ok(first.into());
        }
        let location = location.ok_or(ResolveError::MissingLocation { hop: 1 })?;

        if !location.starts_with(PICKCODE_PREFIX) {
            return Ok(location);
        }

        let joined = format!("{}{}", first.origin().ascii_serialization(), location);
        tracing::debug!(url = %joined, "Following pickcode delegation");
        let second = normalize_url(&joined, 2)?;

        let (status, location) = self.probe(&second, &headers, 2).await?;
        if is_redirect(status) {
            location.ok_or(ResolveError::MissingLocation { hop: 2 })
        } else {
            Ok(second.into())
        }
    }
}
