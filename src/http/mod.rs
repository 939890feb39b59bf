//! HTTP server module
//!
//! - Axum router with the playlist, remux, proxy and HLS endpoints
//! - JSON API handlers
//! - Raw byte proxy and manifest-rewrite proxy
//! - Live session manifest and segment serving
//! - CORS and request tracing middleware

pub mod handlers;
pub mod live;
pub mod proxy;
pub mod routes;

pub use routes::create_router;
