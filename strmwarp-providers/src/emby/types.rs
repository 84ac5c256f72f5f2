//! Emby/Jellyfin HTTP API Types
//!
//! Only the subset of `BaseItemDto` / `MediaSourceInfo` the proxy reads.
//! Both servers share the PascalCase wire shape.

use serde::{Deserialize, Serialize};

/// `GET /Items` response envelope
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ItemsResponse {
    #[serde(default)]
    pub items: Vec<BaseItem>,
    #[serde(default)]
    pub total_record_count: u64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BaseItem {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub media_sources: Vec<MediaSourceInfo>,
}

impl BaseItem {
    /// Stored filesystem path, empty when the server omitted it.
    #[must_use]
    pub fn path_or_empty(&self) -> &str {
        self.path.as_deref().unwrap_or_default()
    }

    /// Media source with exactly this id, if listed.
    #[must_use]
    pub fn media_source(&self, id: &str) -> Option<&MediaSourceInfo> {
        self.media_sources.iter().find(|source| source.id == id)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MediaSourceInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub item_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub protocol: Option<MediaProtocol>,
    #[serde(default)]
    pub container: Option<String>,
    #[serde(default)]
    pub size: Option<i64>,
    #[serde(default)]
    pub direct_stream_url: Option<String>,
}

/// `MediaProtocol` as reported by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum MediaProtocol {
    File,
    Http,
    Rtmp,
    Rtsp,
    Udp,
    Rtp,
    Ftp,
    Mms,
    #[serde(other)]
    Other,
}
