//! Web client patches: index `<head>` injection and the player CORS fix

use std::path::PathBuf;

use async_trait::async_trait;
use http::header::{HeaderValue, CONTENT_TYPE};
use strmwarp_proxy::{BufferedResponse, ResponseTransform};

use crate::backend::{BackendProfile, STATIC_PREFIX};
use crate::config::WebConfig;
use crate::error::Error;

/// Player bootstrap expression that forces `crossorigin="anonymous"` on remote media.
pub const CROSS_ORIGIN_EXPR: &str = r#"mediaSource.IsRemote&&"DirectPlay"===playMethod?null:"anonymous""#;

const VIDEO_TOGETHER_SCRIPT: &str =
    r#"<script src="https://2gether.video/release/extension.website.user.js"></script>"#;

/// Insert `fragment` before the first `</head>`; `None` when the page has none.
fn insert_before_head_end(html: &[u8], fragment: &[u8]) -> Option<Vec<u8>> {
    const HEAD_END: &[u8] = b"</head>";
    let pos = html.windows(HEAD_END.len()).position(|w| w == HEAD_END)?;
    let mut out = Vec::with_capacity(html.len() + fragment.len());
    out.extend_from_slice(&html[..pos]);
    out.extend_from_slice(fragment);
    out.extend_from_slice(&html[pos..]);
    Some(out)
}

/// Drops the `anonymous` cross-origin mode from the Emby HTML player so
/// redirected remote streams are playable.
pub struct PlayerScriptTransform;

#[async_trait]
impl ResponseTransform for PlayerScriptTransform {
    fn name(&self) -> &'static str {
        "player-script"
    }

    async fn transform(&self, response: &mut BufferedResponse) -> anyhow::Result<()> {
        let script = std::str::from_utf8(&response.body)?;
        if script.contains(CROSS_ORIGIN_EXPR) {
            let patched = script.replace(CROSS_ORIGIN_EXPR, "null");
            response.set_body(patched);
        } else {
            tracing::debug!("Player script has no cross-origin expression to patch");
        }
        Ok(())
    }
}

/// Injects configured scripts into the web client's index page
pub struct IndexTransform {
    profile: &'static BackendProfile,
    web: WebConfig,
    custom_dir: PathBuf,
}

impl IndexTransform {
    pub fn new(profile: &'static BackendProfile, web: WebConfig, custom_dir: PathBuf) -> Self {
        Self {
            profile,
            web,
            custom_dir,
        }
    }

    /// Everything inserted before `</head>`, one element per line
    #[must_use]
    pub fn head_fragment(&self) -> String {
        let mut head = String::new();
        let mut line = |s: &str| {
            head.push_str(s);
            head.push('\n');
        };

        if !self.web.head.is_empty() {
            line(&self.web.head);
        }
        if self.web.external_player_url {
            line(&format!(
                r#"<script src="{STATIC_PREFIX}embyExternalUrl/embyWebAddExternalUrl/embyLaunchPotplayer.js"></script>"#
            ));
        }
        if self.web.crx {
            let crx = format!("{STATIC_PREFIX}{}", self.profile.crx_bundle);
            line(&format!(
                r#"<link rel="stylesheet" id="theme-css" href="{crx}/static/css/style.css" type="text/css" media="all" />
    <script src="{crx}/static/js/common-utils.js"></script>
    <script src="{crx}/static/js/jquery-3.6.0.min.js"></script>
    <script src="{crx}/static/js/md5.min.js"></script>
    <script src="{crx}/content/main.js"></script>"#
            ));
        }
        if self.web.actor_plus {
            line(&format!(r#"<script src="{STATIC_PREFIX}emby-web-mod/actorPlus/actorPlus.js"></script>"#));
        }
        if self.web.fanart_show {
            line(&format!(r#"<script src="{STATIC_PREFIX}emby-web-mod/fanart_show/fanart_show.js"></script>"#));
        }
        if self.web.danmaku {
            line(&format!(
                r#"<script src="{STATIC_PREFIX}{}/ede.js" defer></script>"#,
                self.profile.danmaku_bundle
            ));
        }
        if self.web.video_together {
            line(VIDEO_TOGETHER_SCRIPT);
        }
        head
    }
}

#[async_trait]
impl ResponseTransform for IndexTransform {
    fn name(&self) -> &'static str {
        "index"
    }

    async fn transform(&self, response: &mut BufferedResponse) -> anyhow::Result<()> {
        let html = if self.web.index {
            let path = self.custom_dir.join("index.html");
            let html = tokio::fs::read(&path).await.map_err(|e| {
                tracing::warn!(path = %path.display(), "Local index unreadable: {}", e);
                Error::from(e)
            })?;
            response
                .headers
                .insert(CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"));
            html
        } else {
            response.body.to_vec()
        };

        let fragment = self.head_fragment();
        let html = insert_before_head_end(&html, fragment.as_bytes()).unwrap_or(html);
        response.set_body(html);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderMap, StatusCode};

    fn page(body: &str) -> BufferedResponse {
        BufferedResponse::new(StatusCode::OK, HeaderMap::new(), body.to_string())
    }

    #[tokio::test]
    async fn test_player_script_patch() {
        let script = format!("var c={CROSS_ORIGIN_EXPR};video.crossOrigin=c;");
        let mut response = page(&script);
        PlayerScriptTransform.transform(&mut response).await.unwrap();
        assert_eq!(&response.body[..], b"var c=null;video.crossOrigin=c;");

        let mut untouched = page("var c=1;");
        PlayerScriptTransform.transform(&mut untouched).await.unwrap();
        assert_eq!(&untouched.body[..], b"var c=1;");
    }

    #[tokio::test]
    async fn test_player_script_patches_every_occurrence() {
        let script = format!("a={CROSS_ORIGIN_EXPR};b={CROSS_ORIGIN_EXPR};");
        let mut response = page(&script);
        PlayerScriptTransform.transform(&mut response).await.unwrap();
        assert_eq!(&response.body[..], b"a=null;b=null;");

        let mut binary = BufferedResponse::new(StatusCode::OK, HeaderMap::new(), vec![0xff, 0xfe]);
        assert!(PlayerScriptTransform.transform(&mut binary).await.is_err());
    }

    #[tokio::test]
    async fn test_index_injects_before_first_head_end() {
        let web = WebConfig {
            enable: true,
            head: "<meta name=\"x\">".to_string(),
            danmaku: true,
            video_together: true,
            ..WebConfig::default()
        };
        let transform = IndexTransform::new(&BackendProfile::JELLYFIN, web, PathBuf::new());

        let mut response = page("<html><head><title>t</title></head><body></head></body></html>");
        transform.transform(&mut response).await.unwrap();

        let html = String::from_utf8(response.body.to_vec()).unwrap();
        assert_eq!(
            html,
            "<html><head><title>t</title><meta name=\"x\">\n\
             <script src=\"/strmwarp/static/jellyfin-danmaku/ede.js\" defer></script>\n\
             <script src=\"https://2gether.video/release/extension.website.user.js\"></script>\n\
             </head><body></head></body></html>"
        );
    }

    #[test]
    fn test_crx_bundle_differs_per_backend() {
        let web = WebConfig {
            enable: true,
            crx: true,
            ..WebConfig::default()
        };
        let emby = IndexTransform::new(&BackendProfile::EMBY, web.clone(), PathBuf::new()).head_fragment();
        let jellyfin = IndexTransform::new(&BackendProfile::JELLYFIN, web, PathBuf::new()).head_fragment();
        assert!(emby.contains("/strmwarp/static/emby-crx/content/main.js"));
        assert!(jellyfin.contains("/strmwarp/static/jellyfin-crx/static/css/style.css"));
    }

    #[tokio::test]
    async fn test_local_index_replaces_upstream_page() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<head></head>local").unwrap();
        let web = WebConfig {
            enable: true,
            index: true,
            actor_plus: true,
            ..WebConfig::default()
        };
        let transform = IndexTransform::new(&BackendProfile::EMBY, web, dir.path().to_path_buf());

        let mut response = page("<head></head>upstream");
        transform.transform(&mut response).await.unwrap();
        assert_eq!(
            String::from_utf8(response.body.to_vec()).unwrap(),
            "<head><script src=\"/strmwarp/static/emby-web-mod/actorPlus/actorPlus.js\"></script>\n</head>local"
        );
        assert_eq!(response.headers.get(CONTENT_TYPE).unwrap(), "text/html; charset=utf-8");
    }

    #[tokio::test]
    async fn test_missing_local_index_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let web = WebConfig {
            enable: true,
            index: true,
            ..WebConfig::default()
        };
        let transform = IndexTransform::new(&BackendProfile::EMBY, web, dir.path().to_path_buf());
        let err = transform.transform(&mut page("<head></head>")).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Io(_))));
    }
}
