pub mod backend;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod playback;
pub mod resolver;
pub mod strm;
pub mod subtitle;
pub mod web;

pub use backend::{BackendProfile, MediaServerKind, StreamIdField, STATIC_PREFIX};
pub use config::Config;
pub use error::{Error, Result};
pub use gateway::{GatewayRedirect, GatewayRegistry};
pub use playback::{lookup_item, PlaybackInfoMutator, PlaybackInfoTransform};
pub use resolver::{RedirectResolver, ResolveError};
pub use strm::{is_strm, StrmClassifier, StrmKind};
pub use subtitle::SubtitleTransform;
pub use web::{IndexTransform, PlayerScriptTransform};
