//! `PlaybackInfo` rewriting
//!
//! Pointer-backed media sources are switched to direct play so clients hit
//! this proxy's video endpoint (and get redirected) instead of asking the
//! server to transcode a `.strm` file. The document is handled as an
//! order-preserving JSON value, so fields nobody touches survive as received.

use std::sync::Arc;

use async_trait::async_trait;
use http::header::{HeaderValue, CONTENT_TYPE};
use serde_json::{Map, Value};
use strmwarp_providers::{BaseItem, EmbyError, ItemDirectory};
use strmwarp_proxy::{BufferedResponse, ResponseTransform};

use crate::backend::{BackendProfile, StreamIdField};
use crate::error::{Error, Result};
use crate::gateway::GatewayRegistry;
use crate::strm::{StrmClassifier, StrmKind};

/// Item fields requested when classifying a media source
pub const ITEM_FIELDS: &str = "Path,MediaSources";

const TRANSCODING_FIELDS: [&str; 3] = ["TranscodingUrl", "TranscodingSubProtocol", "TranscodingContainer"];

/// Query keys carrying credentials that a rewritten stream URL must keep
const AUTH_KEYS: [&str; 3] = ["api_key", "X-Emby-Token", "X-MediaBrowser-Token"];

/// Look up the single item behind `item_id`.
pub async fn lookup_item(directory: &dyn ItemDirectory, item_id: &str) -> Result<BaseItem> {
    let response = directory.query_item(item_id, true, ITEM_FIELDS).await?;
    response
        .items
        .into_iter()
        .next()
        .ok_or_else(|| Error::Lookup(EmbyError::NotFound(item_id.to_string())))
}

/// Credential pairs of `url` as `key=value` joined by `&`, in original order.
#[must_use]
pub fn auth_pairs(url: &str) -> String {
    let Some((_, query)) = url.split_once('?') else {
        return String::new();
    };
    query
        .split('&')
        .filter(|pair| {
            let key = pair.split_once('=').map_or(*pair, |(key, _)| key);
            AUTH_KEYS.iter().any(|auth| auth.eq_ignore_ascii_case(key))
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Container name from a path's extension, without the dot.
fn container_of(path: &str) -> String {
    let file = path.rsplit('/').next().unwrap_or(path);
    file.rsplit_once('.')
        .map(|(_, ext)| ext.to_string())
        .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq)]
enum Edit {
    Set(&'static str, Value),
    Remove(&'static str),
}

fn apply(source: &mut Map<String, Value>, edits: Vec<Edit>) {
    for edit in edits {
        match edit {
            Edit::Set(key, value) => {
                source.insert(key.to_string(), value);
            }
            Edit::Remove(key) => {
                source.shift_remove(key);
            }
        }
    }
}

fn str_field<'a>(source: &'a Map<String, Value>, key: &'static str) -> Result<&'a str> {
    source
        .get(key)
        .and_then(Value::as_str)
        .ok_or(Error::MissingField(key))
}

pub struct PlaybackInfoMutator {
    profile: &'static BackendProfile,
    directory: Arc<dyn ItemDirectory>,
    classifier: Arc<StrmClassifier>,
    gateways: Arc<GatewayRegistry>,
    http_trans_code: bool,
    alist_trans_code: bool,
}

impl PlaybackInfoMutator {
    pub fn new(
        profile: &'static BackendProfile,
        directory: Arc<dyn ItemDirectory>,
        classifier: Arc<StrmClassifier>,
        gateways: Arc<GatewayRegistry>,
        http_trans_code: bool,
        alist_trans_code: bool,
    ) -> Self {
        Self {
            profile,
            directory,
            classifier,
            gateways,
            http_trans_code,
            alist_trans_code,
        }
    }

    fn stream_url(&self, source: &Map<String, Value>, auth: &str) -> Result<String> {
        let source_id = str_field(source, "Id")?;
        let stream_id = match self.profile.stream_id_field {
            StreamIdField::ItemId => str_field(source, "ItemId")?,
            StreamIdField::SourceId => source_id,
        };
        Ok(self.profile.direct_stream_url(stream_id, source_id, auth))
    }

    fn force_direct(edits: &mut Vec<Edit>) {
        edits.push(Edit::Set("SupportsDirectPlay", Value::Bool(true)));
        edits.push(Edit::Set("SupportsDirectStream", Value::Bool(true)));
        edits.extend(TRANSCODING_FIELDS.into_iter().map(Edit::Remove));
    }

    /// Compute every edit for one media source without touching it.
    async fn plan(&self, source: &Map<String, Value>) -> Result<Vec<Edit>> {
        let source_id = str_field(source, "Id")?;
        let item = lookup_item(self.directory.as_ref(), self.profile.item_id(source_id)).await?;
        let mut edits = Vec::new();

        match self.classifier.classify(item.path_or_empty()) {
            StrmKind::HttpPointer => {
                if !self.http_trans_code {
                    Self::force_direct(&mut edits);
                    if let Some(old) = source.get("DirectStreamUrl").and_then(Value::as_str) {
                        let url = self.stream_url(source, &auth_pairs(old))?;
                        edits.push(Edit::Set("DirectStreamUrl", Value::String(url)));
                    }
                }
            }
            StrmKind::GatewayPointer(addr) => {
                let path = str_field(source, "Path")?;
                if !self.alist_trans_code {
                    Self::force_direct(&mut edits);
                    edits.push(Edit::Set("SupportsTranscoding", Value::Bool(false)));
                    let old = source.get("DirectStreamUrl").and_then(Value::as_str).unwrap_or_default();
                    let url = self.stream_url(source, &auth_pairs(old))?;
                    edits.push(Edit::Set("DirectStreamUrl", Value::String(url)));
                    edits.push(Edit::Set("Container", Value::String(container_of(path))));
                }
                if source.get("Size").map_or(true, Value::is_null) {
                    let object = self.gateways.resolve(&addr, path).await?;
                    edits.push(Edit::Set("Size", Value::from(object.size)));
                }
            }
            StrmKind::LocalFile | StrmKind::Unknown => {}
        }

        Ok(edits)
    }

    /// Rewrite every media source of `doc` in place.
    ///
    /// Returns the number of sources that changed. A source whose lookup or
    /// gateway call fails is left exactly as received.
    pub async fn mutate(&self, doc: &mut Value) -> usize {
        let Some(sources) = doc.get_mut("MediaSources").and_then(Value::as_array_mut) else {
            return 0;
        };

        let mut changed = 0;
        for source in sources.iter_mut().filter_map(Value::as_object_mut) {
            let id = source.get("Id").and_then(Value::as_str).unwrap_or_default().to_string();
            match self.plan(source).await {
                Ok(edits) if edits.is_empty() => {}
                Ok(edits) => {
                    tracing::info!(source_id = %id, edits = edits.len(), "Forcing direct play for media source");
                    apply(source, edits);
                    changed += 1;
                }
                Err(e) => {
                    tracing::warn!(source_id = %id, "Skipping media source: {}", e);
                }
            }
        }
        changed
    }
}

/// Rewrite pipeline stage for `/Items/{id}/PlaybackInfo`
pub struct PlaybackInfoTransform {
    mutator: PlaybackInfoMutator,
}

impl PlaybackInfoTransform {
    pub fn new(mutator: PlaybackInfoMutator) -> Self {
        Self { mutator }
    }
}

#[async_trait]
impl ResponseTransform for PlaybackInfoTransform {
    fn name(&self) -> &'static str {
        "playback-info"
    }

    async fn transform(&self, response: &mut BufferedResponse) -> anyhow::Result<()> {
        let mut doc: Value = serde_json::from_slice(&response.body).map_err(Error::from)?;
        if self.mutator.mutate(&mut doc).await == 0 {
            return Ok(());
        }

        response.set_body(serde_json::to_vec(&doc).map_err(Error::from)?);
        response
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AlistServerConfig, Config};
    use crate::gateway::tests::FakeGateway;
    use http::{HeaderMap, StatusCode};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use strmwarp_providers::{FsObject, ItemsResponse};

    const GATEWAY: &str = "http://alist:5244";

    #[derive(Default)]
    struct FakeDirectory {
        paths: HashMap<String, String>,
        calls: AtomicUsize,
    }

    impl FakeDirectory {
        fn with(items: &[(&str, &str)]) -> Self {
            Self {
                paths: items.iter().map(|(id, path)| ((*id).to_string(), (*path).to_string())).collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ItemDirectory for FakeDirectory {
        async fn query_item(&self, id: &str, recursive: bool, fields: &str) -> std::result::Result<ItemsResponse, EmbyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(recursive);
            assert_eq!(fields, ITEM_FIELDS);
            let items = self
                .paths
                .get(id)
                .map(|path| BaseItem {
                    id: id.to_string(),
                    path: Some(path.clone()),
                    ..BaseItem::default()
                })
                .into_iter()
                .collect();
            Ok(ItemsResponse {
                items,
                total_record_count: 1,
            })
        }
    }

    fn classifier() -> Arc<StrmClassifier> {
        let mut config = Config::default();
        config.alist_strm.enable = true;
        config.alist_strm.list = vec![AlistServerConfig {
            addr: GATEWAY.to_string(),
            prefix_list: vec!["/mnt/alist".to_string()],
            ..AlistServerConfig::default()
        }];
        Arc::new(StrmClassifier::from_config(&config))
    }

    fn mutator(
        profile: &'static BackendProfile,
        directory: FakeDirectory,
        gateway: Arc<FakeGateway>,
        http_trans_code: bool,
        alist_trans_code: bool,
    ) -> PlaybackInfoMutator {
        let mut registry = GatewayRegistry::new();
        registry.register(gateway);
        PlaybackInfoMutator::new(
            profile,
            Arc::new(directory),
            classifier(),
            Arc::new(registry),
            http_trans_code,
            alist_trans_code,
        )
    }

    fn gateway(size: i64) -> Arc<FakeGateway> {
        Arc::new(FakeGateway::new(
            GATEWAY,
            Some(FsObject {
                size,
                raw_url: String::new(),
                sign: String::new(),
            }),
        ))
    }

    fn http_source() -> Value {
        json!({
            "Id": "mediasource_1",
            "ItemId": "1",
            "Path": "https://cdn.example/movie.mkv",
            "Protocol": "Http",
            "Container": "strm",
            "SupportsDirectPlay": false,
            "SupportsDirectStream": false,
            "SupportsTranscoding": true,
            "DirectStreamUrl": "/videos/1/master.m3u8?DeviceId=d&api_key=KEY&MediaSourceId=mediasource_1&X-Emby-Token=TOK",
            "TranscodingUrl": "/videos/1/master.m3u8?x=1",
            "TranscodingSubProtocol": "hls",
            "TranscodingContainer": "ts"
        })
    }

    fn local_source() -> Value {
        json!({
            "Id": "mediasource_2",
            "ItemId": "2",
            "Path": "/data/movie.mkv",
            "Protocol": "File",
            "SupportsDirectPlay": true,
            "SupportsTranscoding": true,
            "TranscodingUrl": "/videos/2/master.m3u8"
        })
    }

    fn gateway_source(size: Option<i64>) -> Value {
        let mut source = json!({
            "Id": "mediasource_3",
            "ItemId": "3",
            "Path": "/movies/film.mp4",
            "Protocol": "File",
            "Container": "strm",
            "SupportsDirectPlay": false,
            "SupportsDirectStream": false,
            "SupportsTranscoding": true,
            "TranscodingUrl": "/videos/3/master.m3u8"
        });
        if let Some(size) = size {
            source["Size"] = json!(size);
        }
        source
    }

    #[test]
    fn test_auth_pairs_keep_order_and_ignore_case() {
        assert_eq!(
            auth_pairs("/videos/1/stream?x=1&X-EMBY-TOKEN=a&api_key=b&y=2"),
            "X-EMBY-TOKEN=a&api_key=b"
        );
        assert_eq!(auth_pairs("/videos/1/stream"), "");
        assert_eq!(auth_pairs("/videos/1/stream?Static=true"), "");
    }

    #[test]
    fn test_container_of() {
        assert_eq!(container_of("/movies/film.mp4"), "mp4");
        assert_eq!(container_of("/movies.d/film"), "");
    }

    #[tokio::test]
    async fn test_http_pointer_forces_direct_play() {
        let directory = FakeDirectory::with(&[("1", "https://cdn.example/movie.strm"), ("2", "/data/movie.mkv")]);
        let mutator = mutator(&BackendProfile::EMBY, directory, gateway(1), false, false);

        let local = local_source();
        let mut doc = json!({"MediaSources": [http_source(), local.clone()], "PlaySessionId": "p"});
        assert_eq!(mutator.mutate(&mut doc).await, 1);

        let source = &doc["MediaSources"][0];
        assert_eq!(source["SupportsDirectPlay"], json!(true));
        assert_eq!(source["SupportsDirectStream"], json!(true));
        assert_eq!(source["SupportsTranscoding"], json!(true));
        assert!(source.get("TranscodingUrl").is_none());
        assert!(source.get("TranscodingSubProtocol").is_none());
        assert!(source.get("TranscodingContainer").is_none());
        assert_eq!(
            source["DirectStreamUrl"],
            json!("/videos/1/stream?MediaSourceId=mediasource_1&Static=true&api_key=KEY&X-Emby-Token=TOK")
        );

        assert_eq!(
            serde_json::to_string(&doc["MediaSources"][1]).unwrap(),
            serde_json::to_string(&local).unwrap()
        );
        assert_eq!(doc["PlaySessionId"], json!("p"));
    }

    #[tokio::test]
    async fn test_http_pointer_with_trans_code_is_untouched() {
        let directory = FakeDirectory::with(&[("1", "https://cdn.example/movie.strm")]);
        let mutator = mutator(&BackendProfile::EMBY, directory, gateway(1), true, false);

        let original = json!({"MediaSources": [http_source()]});
        let mut doc = original.clone();
        assert_eq!(mutator.mutate(&mut doc).await, 0);
        assert_eq!(doc, original);
    }

    #[tokio::test]
    async fn test_gateway_pointer_backfills_missing_size_once() {
        let directory = FakeDirectory::with(&[("3", "/mnt/alist/movies/film.strm")]);
        let gw = gateway(4096);
        let mutator = mutator(&BackendProfile::EMBY, directory, gw.clone(), false, false);

        let mut doc = json!({"MediaSources": [gateway_source(None)]});
        assert_eq!(mutator.mutate(&mut doc).await, 1);
        assert_eq!(gw.calls(), 1);

        let source = &doc["MediaSources"][0];
        assert_eq!(source["Size"], json!(4096));
        assert_eq!(source["Container"], json!("mp4"));
        assert_eq!(source["SupportsTranscoding"], json!(false));
        assert_eq!(
            source["DirectStreamUrl"],
            json!("/videos/3/stream?MediaSourceId=mediasource_3&Static=true")
        );
        assert!(source.get("TranscodingUrl").is_none());
    }

    #[tokio::test]
    async fn test_gateway_pointer_with_size_skips_gateway() {
        let directory = FakeDirectory::with(&[("3", "/mnt/alist/movies/film.strm")]);
        let gw = gateway(4096);
        let mutator = mutator(&BackendProfile::EMBY, directory, gw.clone(), false, true);

        let original = json!({"MediaSources": [gateway_source(Some(10))]});
        let mut doc = original.clone();
        assert_eq!(mutator.mutate(&mut doc).await, 0);
        assert_eq!(gw.calls(), 0);
        assert_eq!(doc, original);
    }

    #[tokio::test]
    async fn test_failed_backfill_leaves_source_unchanged() {
        let directory = FakeDirectory::with(&[("3", "/mnt/alist/movies/film.strm")]);
        let gw = Arc::new(FakeGateway::new(GATEWAY, None));
        let mutator = mutator(&BackendProfile::EMBY, directory, gw.clone(), false, false);

        let original = json!({"MediaSources": [gateway_source(None)]});
        let mut doc = original.clone();
        assert_eq!(mutator.mutate(&mut doc).await, 0);
        assert_eq!(gw.calls(), 1);
        assert_eq!(doc, original);
    }

    #[tokio::test]
    async fn test_jellyfin_uses_source_id_and_no_prefix() {
        let directory = FakeDirectory::with(&[("abc", "http://cdn/movie.strm")]);
        let mutator = mutator(&BackendProfile::JELLYFIN, directory, gateway(1), false, false);

        let mut doc = json!({"MediaSources": [{
            "Id": "abc",
            "Path": "http://cdn/movie.mkv",
            "DirectStreamUrl": "/Videos/abc/stream?api_key=K",
            "SupportsDirectPlay": false
        }]});
        assert_eq!(mutator.mutate(&mut doc).await, 1);
        assert_eq!(
            doc["MediaSources"][0]["DirectStreamUrl"],
            json!("/Videos/abc/stream?MediaSourceId=abc&Static=true&api_key=K")
        );
    }

    #[tokio::test]
    async fn test_transform_leaves_unchanged_documents_alone() {
        let directory = FakeDirectory::with(&[("2", "/data/movie.mkv")]);
        let transform = PlaybackInfoTransform::new(mutator(&BackendProfile::EMBY, directory, gateway(1), false, false));

        let body = r#"{ "MediaSources": [ {"Id": "mediasource_2"} ] }"#;
        let mut response = BufferedResponse::new(StatusCode::OK, HeaderMap::new(), body);
        transform.transform(&mut response).await.unwrap();
        assert_eq!(&response.body[..], body.as_bytes());
        assert!(response.headers.get(CONTENT_TYPE).is_none());
    }

    #[tokio::test]
    async fn test_transform_rewrites_json_body() {
        let directory = FakeDirectory::with(&[("1", "https://cdn.example/movie.strm")]);
        let transform = PlaybackInfoTransform::new(mutator(&BackendProfile::EMBY, directory, gateway(1), false, false));

        let body = serde_json::to_vec(&json!({"MediaSources": [http_source()]})).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json; charset=utf-8"));
        headers.insert(http::header::CONTENT_LENGTH, HeaderValue::from(body.len()));
        let mut response = BufferedResponse::new(StatusCode::OK, headers, body);

        transform.transform(&mut response).await.unwrap();
        assert_eq!(response.headers.get(CONTENT_TYPE).unwrap(), "application/json");
        assert!(response.headers.get(http::header::CONTENT_LENGTH).is_none());
        let doc: Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(doc["MediaSources"][0]["SupportsDirectPlay"], json!(true));
    }

    #[tokio::test]
    async fn test_transform_rejects_non_json() {
        let transform = PlaybackInfoTransform::new(mutator(
            &BackendProfile::EMBY,
            FakeDirectory::default(),
            gateway(1),
            false,
            false,
        ));
        let mut response = BufferedResponse::new(StatusCode::OK, HeaderMap::new(), "<html>");
        let err = transform.transform(&mut response).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Serialization(_))));
        assert_eq!(&response.body[..], b"<html>");
    }
}
