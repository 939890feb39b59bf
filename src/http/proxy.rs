//! Upstream proxies
//!
//! `/proxy` streams one upstream resource through unchanged. `/api/hlsProxy`
//! rewrites an upstream manifest so every entry goes through `/proxy`.

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::error::{GatewayError, Result};
use crate::hls::publish_proxy_manifest;
use crate::state::AppState;
use crate::upstream::send_with_timeout;

#[derive(Debug, Deserialize)]
pub struct UrlParams {
    pub url: Option<String>,
}

/// Raw byte proxy
/// GET /proxy?url=...
pub async fn proxy(State(state): State<Arc<AppState>>, Query(params): Query<UrlParams>) -> Response {
    let Some(url) = params.url.filter(|u| !u.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "missing url").into_response();
    };

    let request = state.upstream.get(&url);
    let response = match send_with_timeout(request, state.config.upstream.proxy_timeout()).await {
        Ok(response) => response,
        Err(GatewayError::UpstreamUnavailable(_)) => {
            tracing::debug!("Proxy timeout for {}", url);
            return (StatusCode::GATEWAY_TIMEOUT, "timeout").into_response();
        }
        Err(e) => {
            tracing::debug!("Proxy fetch of {} failed: {}", url, e);
            return (StatusCode::GATEWAY_TIMEOUT, "fetch error").into_response();
        }
    };

    let status = response.status();
    if !status.is_success() {
        return (status, "Upstream error").into_response();
    }

    let mut headers = HeaderMap::new();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"));
    headers.insert(header::CONTENT_TYPE, content_type);
    if let Some(length) = response.headers().get(header::CONTENT_LENGTH) {
        headers.insert(header::CONTENT_LENGTH, length.clone());
    }

    (headers, Body::from_stream(response.bytes_stream())).into_response()
}

/// Manifest rewrite proxy
/// GET /api/hlsProxy?url=...
pub async fn hls_proxy(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UrlParams>,
) -> Result<Json<Value>> {
    let url = params
        .url
        .filter(|u| !u.is_empty())
        .ok_or_else(|| GatewayError::BadRequest("missing url".to_string()))?;
    url::Url::parse(&url).map_err(|e| GatewayError::BadRequest(format!("invalid url: {}", e)))?;

    let timeout = state.config.upstream.proxy_timeout();
    let response = send_with_timeout(state.upstream.get(&url), timeout).await?;
    if !response.status().is_success() {
        return Err(GatewayError::UpstreamStatus {
            status: response.status().as_u16(),
        });
    }

    // Relative entries resolve against where we ended up after redirects.
    let base = response.url().clone();
    let text = tokio::time::timeout(timeout, response.text())
        .await
        .map_err(|_| GatewayError::UpstreamUnavailable("manifest body timed out".to_string()))??;

    let path = publish_proxy_manifest(
        state.sessions.hls_root(),
        &text,
        &base,
        state.config.publish.proxy_retention(),
    )
    .await?;

    Ok(Json(json!({ "m3u8Url": path })))
}
