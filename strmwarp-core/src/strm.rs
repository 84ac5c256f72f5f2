//! `.strm` pointer classification

use crate::config::Config;

/// What a stored item path points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrmKind {
    /// Regular media file on the server's disk
    LocalFile,
    /// `.strm` whose content is an HTTP URL
    HttpPointer,
    /// `.strm` under a storage gateway root; carries the gateway address
    GatewayPointer(String),
    /// `.strm` matching no enabled rule
    Unknown,
}

#[derive(Debug, Clone)]
struct GatewayRoots {
    addr: String,
    prefixes: Vec<String>,
}

/// Pure classifier over a stored item path and static configuration
#[derive(Debug, Clone, Default)]
pub struct StrmClassifier {
    http_enable: bool,
    http_prefixes: Vec<String>,
    gateway_enable: bool,
    gateways: Vec<GatewayRoots>,
}

#[must_use]
pub fn is_strm(path: &str) -> bool {
    path.to_lowercase().ends_with(".strm")
}

fn has_http_scheme(path: &str) -> bool {
    let head = path.get(..8).unwrap_or(path).to_ascii_lowercase();
    head.starts_with("http://") || head.starts_with("https://")
}

impl StrmClassifier {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            http_enable: config.http_strm.enable,
            http_prefixes: config.http_strm.prefix_list.clone(),
            gateway_enable: config.alist_strm.enable,
            gateways: config
                .alist_strm
                .list
                .iter()
                .map(|server| GatewayRoots {
                    addr: server.addr.trim_end_matches('/').to_string(),
                    prefixes: server.prefix_list.clone(),
                })
                .collect(),
        }
    }

    #[must_use]
    pub fn classify(&self, path: &str) -> StrmKind {
        if !is_strm(path) {
            return StrmKind::LocalFile;
        }

        if self.http_enable
            && (has_http_scheme(path)
                || self.http_prefixes.iter().any(|prefix| path.starts_with(prefix.as_str())))
        {
            return StrmKind::HttpPointer;
        }

        if self.gateway_enable {
            if let Some(gateway) = self
                .gateways
                .iter()
                .find(|g| g.prefixes.iter().any(|prefix| path.starts_with(prefix.as_str())))
            {
                return StrmKind::GatewayPointer(gateway.addr.clone());
            }
        }

        StrmKind::Unknown
    }
}
