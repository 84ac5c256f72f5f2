//! HTTP surface of strmwarp
//!
//! Route dispatch, the video-stream redirect handler and the adapter that
//! assembles them into an axum router for the configured backend.

pub mod adapter;
pub mod routes;
pub mod videos;

pub use adapter::MediaServerAdapter;
pub use routes::{RouteHandler, RouteRule, RouteTable};
pub use videos::VideosHandler;
