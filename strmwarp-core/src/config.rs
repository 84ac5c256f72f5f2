use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::backend::MediaServerKind;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub media_server: MediaServerConfig,
    pub logging: LoggingConfig,
    /// Directory holding `index.html` and the `static/` tree for injected scripts
    pub custom_dir: String,
    pub web: WebConfig,
    pub http_strm: HttpStrmConfig,
    pub alist_strm: AlistStrmConfig,
    pub subtitle: SubtitleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaServerConfig {
    #[serde(rename = "type")]
    pub kind: MediaServerKind,
    pub addr: String,
    pub api_key: String,
}

impl Default for MediaServerConfig {
    fn default() -> Self {
        Self {
            kind: MediaServerKind::Emby,
            addr: "http://127.0.0.1:8096".to_string(),
            api_key: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

/// Web shell customisation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub enable: bool,
    /// Serve `{custom_dir}/index.html` instead of the upstream shell
    pub index: bool,
    /// Raw HTML appended to `<head>`
    pub head: String,
    pub external_player_url: bool,
    pub crx: bool,
    pub actor_plus: bool,
    pub fanart_show: bool,
    pub danmaku: bool,
    pub video_together: bool,
}

impl WebConfig {
    /// Whether the index page needs rewriting at all
    #[must_use]
    pub fn modifies_index(&self) -> bool {
        self.enable
            && (self.index
                || !self.head.is_empty()
                || self.external_player_url
                || self.crx
                || self.actor_plus
                || self.fanart_show
                || self.danmaku
                || self.video_together)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpStrmConfig {
    pub enable: bool,
    /// Keep the server's transcoding options for HTTP pointers
    pub trans_code: bool,
    /// Extra roots recognised as HTTP pointers besides `http(s)://`
    pub prefix_list: Vec<String>,
}

impl Default for HttpStrmConfig {
    fn default() -> Self {
        Self {
            enable: true,
            trans_code: false,
            prefix_list: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AlistStrmConfig {
    pub enable: bool,
    pub trans_code: bool,
    /// Redirect to the gateway's raw URL instead of its `/d` download path
    pub raw_url: bool,
    pub list: Vec<AlistServerConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AlistServerConfig {
    pub addr: String,
    pub username: String,
    pub password: String,
    pub prefix_list: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SubtitleConfig {
    pub enable: bool,
    pub srt2ass: bool,
    /// `Style:` lines written into the converted script; empty uses the built-in default
    pub ass_style: Vec<String>,
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        // STRMWARP_MEDIA_SERVER__API_KEY, STRMWARP_SERVER__PORT, ...
        builder = builder.add_source(
            Environment::with_prefix("STRMWARP")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load from environment variables only (for Docker)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load from file path
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::load(Some(path))
    }

    /// Get HTTP listen address
    #[must_use]
    pub fn http_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    #[must_use]
    pub fn custom_dir(&self) -> PathBuf {
        PathBuf::from(&self.custom_dir)
    }

    /// Directory served under the static prefix
    #[must_use]
    pub fn static_dir(&self) -> PathBuf {
        self.custom_dir().join("static")
    }

    /// Check the whole configuration, collecting every problem found
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push("server.port must be greater than 0".to_string());
        }

        check_http_url("media_server.addr", &self.media_server.addr, &mut errors);
        if self.media_server.api_key.trim().is_empty() {
            errors.push("media_server.api_key is required".to_string());
        }

        if !matches!(
            self.logging.level.to_lowercase().as_str(),
            "trace" | "debug" | "info" | "warn" | "warning" | "error"
        ) {
            errors.push(format!("logging.level '{}' is not a valid level", self.logging.level));
        }
        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            errors.push(format!(
                "logging.format must be 'json' or 'pretty', got '{}'",
                self.logging.format
            ));
        }

        if self.web.index && self.custom_dir.is_empty() {
            errors.push("web.index requires custom_dir".to_string());
        }

        if self.http_strm.prefix_list.iter().any(String::is_empty) {
            errors.push("http_strm.prefix_list must not contain empty entries".to_string());
        }

        if self.alist_strm.enable {
            for (i, server) in self.alist_strm.list.iter().enumerate() {
                check_http_url(&format!("alist_strm.list[{i}].addr"), &server.addr, &mut errors);
                if server.prefix_list.is_empty() {
                    errors.push(format!("alist_strm.list[{i}].prefix_list must not be empty"));
                }
                if server.prefix_list.iter().any(String::is_empty) {
                    errors.push(format!(
                        "alist_strm.list[{i}].prefix_list must not contain empty entries"
                    ));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn check_http_url(field: &str, value: &str, errors: &mut Vec<String>) {
    if value.is_empty() {
        errors.push(format!("{field} is required"));
        return;
    }
    match url::Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        Ok(url) => errors.push(format!("{field} must use http or https, got '{}'", url.scheme())),
        Err(e) => errors.push(format!("{field} is not a valid URL: {e}")),
    }
}
