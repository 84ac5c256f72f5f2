//! Media-server adapter
//!
//! Wires configuration, provider clients and transforms into one route table
//! for the configured backend and exposes it as an axum router.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::{extract::Request, Router};
use regex::Regex;
use strmwarp_core::{
    BackendProfile, Config, GatewayRedirect, GatewayRegistry, IndexTransform, MediaServerKind,
    PlaybackInfoMutator, PlaybackInfoTransform, PlayerScriptTransform, RedirectResolver, StrmClassifier,
    SubtitleTransform, STATIC_PREFIX,
};
use strmwarp_providers::{EmbyClient, ItemDirectory};
use strmwarp_proxy::{ResponseTransform, ReverseProxy, RewritePipeline};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::routes::{patterns, RouteHandler, RouteRule, RouteTable};
use crate::videos::VideosHandler;

pub struct MediaServerAdapter {
    table: Arc<RouteTable>,
    static_dir: PathBuf,
}

impl MediaServerAdapter {
    /// Build the adapter with an HTTP item directory for the configured server
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let directory = EmbyClient::new(&config.media_server.addr, &config.media_server.api_key)
            .context("Failed to create media server client")?;
        Self::with_directory(config, Arc::new(directory))
    }

    pub fn with_directory(config: &Config, directory: Arc<dyn ItemDirectory>) -> anyhow::Result<Self> {
        let profile = BackendProfile::for_kind(config.media_server.kind);
        let proxy = ReverseProxy::new(&config.media_server.addr)?;
        let classifier = Arc::new(StrmClassifier::from_config(config));
        let gateways = Arc::new(GatewayRegistry::from_config(&config.alist_strm)?);
        let resolver = RedirectResolver::new().context("Failed to create probe client")?;

        let pipeline = |transform: Arc<dyn ResponseTransform>| -> Arc<dyn RouteHandler> {
            Arc::new(RewritePipeline::new(proxy.clone(), transform))
        };

        let legacy = match profile.kind {
            MediaServerKind::Emby => Some(Regex::new(patterns::EMBY_LEGACY_VIDEOS)?),
            MediaServerKind::Jellyfin => None,
        };
        let videos: Arc<dyn RouteHandler> = Arc::new(VideosHandler::new(
            profile,
            proxy.clone(),
            directory.clone(),
            classifier.clone(),
            resolver,
            GatewayRedirect::new(gateways.clone(), config.alist_strm.raw_url),
            legacy,
        ));

        let playback = pipeline(Arc::new(PlaybackInfoTransform::new(PlaybackInfoMutator::new(
            profile,
            directory,
            classifier,
            gateways,
            config.http_strm.trans_code,
            config.alist_strm.trans_code,
        ))));

        let index = config.web.modifies_index().then(|| {
            pipeline(Arc::new(IndexTransform::new(profile, config.web.clone(), config.custom_dir())))
        });

        let mut rules = Vec::new();
        match profile.kind {
            MediaServerKind::Emby => {
                rules.push(RouteRule::new(patterns::EMBY_VIDEOS, videos)?);
                rules.push(RouteRule::new(patterns::EMBY_PLAYBACK_INFO, playback)?);
                rules.push(RouteRule::new(patterns::EMBY_PLAYER_SCRIPT, pipeline(Arc::new(PlayerScriptTransform)))?);
                if let Some(index) = index {
                    rules.push(RouteRule::new(patterns::EMBY_INDEX, index)?);
                }
                if config.subtitle.enable && config.subtitle.srt2ass {
                    let subtitles = pipeline(Arc::new(SubtitleTransform::new(config.subtitle.ass_style.clone())));
                    rules.push(RouteRule::new(patterns::EMBY_SUBTITLES, subtitles)?);
                }
            }
            MediaServerKind::Jellyfin => {
                rules.push(RouteRule::new(patterns::JELLYFIN_PLAYBACK_INFO, playback)?);
                rules.push(RouteRule::new(patterns::JELLYFIN_VIDEOS, videos)?);
                if let Some(index) = index {
                    rules.push(RouteRule::new(patterns::JELLYFIN_INDEX, index)?);
                }
            }
        }

        tracing::info!(backend = %profile.kind, upstream = %proxy.upstream(), rules = rules.len(), "Route table built");

        Ok(Self {
            table: Arc::new(RouteTable::new(rules, proxy)),
            static_dir: config.static_dir(),
        })
    }

    #[must_use]
    pub fn route_table(&self) -> &RouteTable {
        &self.table
    }

    /// Router serving the static directory and dispatching everything else
    pub fn router(&self) -> Router {
        let table = self.table.clone();
        Router::new()
            .nest_service(STATIC_PREFIX.trim_end_matches('/'), ServeDir::new(&self.static_dir))
            .fallback(move |req: Request| {
                let table = table.clone();
                async move { table.dispatch(req).await }
            })
            .layer(TraceLayer::new_for_http())
    }
}
