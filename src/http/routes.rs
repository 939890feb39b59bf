//! Axum router configuration

use axum::{
    http::{header, Method},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

use super::handlers::{
    debug_sessions, health_check, playlist, remux_hls, reset_cache, stop_remux, version_check,
};
use super::live::live_file;
use super::proxy::{hls_proxy, proxy};

/// Create the Axum router with all routes
pub fn create_router(state: Arc<AppState>) -> Router {
    // The viewer UI is served from a different origin.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS, Method::HEAD])
        .allow_headers([
            header::ACCEPT,
            header::RANGE,
            header::CONTENT_TYPE,
            header::ORIGIN,
        ])
        .allow_private_network(true)
        .max_age(Duration::from_secs(3600));

    let static_hls = ServeDir::new(state.sessions.hls_root());

    let router = Router::new()
        // Health and version endpoints
        .route("/health", get(health_check))
        .route("/version", get(version_check))
        // Debug endpoints
        .route("/debug/sessions", get(debug_sessions))
        // JSON API
        .route("/api/playlist", get(playlist))
        .route("/api/remuxHls", get(remux_hls))
        .route("/api/remuxHls/stop", post(stop_remux))
        .route("/api/resetCache", post(reset_cache))
        .route("/api/hlsProxy", get(hls_proxy))
        // Media
        .route("/proxy", get(proxy))
        .route("/hls-live/{id}/{file}", get(live_file))
        .nest_service("/hls", static_hls)
        // Middleware
        .layer(TraceLayer::new_for_http());

    let router = if state.config.cors_enabled {
        router.layer(cors)
    } else {
        router
    };

    router.with_state(state)
}
