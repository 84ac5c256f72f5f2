//! Alist HTTP API Types

use serde::Deserialize;

/// Generic Alist API response wrapper
#[derive(Debug, Deserialize)]
pub struct AlistResp<T> {
    pub code: u64,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
}

/// Login response data
#[derive(Debug, Deserialize)]
pub struct LoginData {
    pub token: String,
}

/// File/folder information from `POST /api/fs/get`
#[derive(Debug, Clone, Deserialize)]
pub struct FsGetResp {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub is_dir: bool,
    #[serde(default)]
    pub sign: String,
    #[serde(default)]
    pub raw_url: String,
    #[serde(default)]
    pub provider: String,
}

/// What the proxy needs to know about a gateway object.
///
/// `sign` is empty when the gateway does not require a signature.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FsObject {
    pub size: i64,
    pub raw_url: String,
    pub sign: String,
}

impl From<FsGetResp> for FsObject {
    fn from(resp: FsGetResp) -> Self {
        Self {
            size: resp.size,
            raw_url: resp.raw_url,
            sign: resp.sign,
        }
    }
}
