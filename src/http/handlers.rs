//! HTTP request handlers for the JSON API

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::error::{GatewayError, Result};
use crate::playlist::{PlaylistQuery, PlaylistReply};
use crate::probe::locate_tool;
use crate::remux::{SessionRequest, StreamKind, VideoPlan};
use crate::resolver::{build_candidates, looks_vod, pick_reachable_url, with_vod_hint, VodHint};
use crate::state::AppState;

fn required_url(url: Option<String>) -> Result<String> {
    url.map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .ok_or_else(|| GatewayError::BadRequest("missing url".to_string()))
}

fn flag(value: Option<&str>) -> bool {
    matches!(value, Some("1") | Some("true") | Some("yes"))
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "OK"
}

/// Version endpoint
pub async fn version_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Active sessions
/// GET /debug/sessions
pub async fn debug_sessions(State(state): State<Arc<AppState>>) -> Json<Value> {
    let sessions = state.sessions.snapshot();
    Json(json!({
        "count": sessions.len(),
        "cached_playlists": state.playlists.cache().len(),
        "sessions": sessions,
    }))
}

#[derive(Debug, Deserialize)]
pub struct PlaylistParams {
    pub url: Option<String>,
    pub limit: Option<String>,
    pub early: Option<String>,
    pub debug: Option<String>,
}

/// Channel list of a playlist
/// GET /api/playlist?url=...&limit=...&early=...&debug=1
pub async fn playlist(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PlaylistParams>,
) -> Result<Response> {
    let url = required_url(params.url)?;
    let query = PlaylistQuery {
        url,
        limit: params.limit.as_deref().and_then(|v| v.parse().ok()),
        early: params.early.as_deref().and_then(|v| v.parse().ok()),
        debug: flag(params.debug.as_deref()),
    };

    match state.playlists.load(query).await? {
        PlaylistReply::Channels(response) => Ok(Json(response).into_response()),
        PlaylistReply::UpstreamDebug {
            status,
            user_agent,
            body,
        } => {
            let code = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
            let body = json!({
                "error": format!("upstream {}", status),
                "ua": user_agent,
                "body": body,
            });
            Ok((code, Json(body)).into_response())
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemuxParams {
    pub url: Option<String>,
    pub vod_hint: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemuxResponse {
    pub m3u8_url: String,
    pub session_id: String,
}

/// Start a remux session
/// GET /api/remuxHls?url=...&vodHint=series|movie
pub async fn remux_hls(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RemuxParams>,
) -> Result<Json<RemuxResponse>> {
    let url = required_url(params.url)?;

    let ffmpeg = state.sessions.ffmpeg_path();
    if locate_tool(ffmpeg).is_none() {
        return Err(GatewayError::ToolMissing(ffmpeg.to_string()));
    }

    let mut candidates = build_candidates(&url);
    let mut kind = if looks_vod(&url) {
        StreamKind::Vod
    } else {
        StreamKind::Live
    };
    if let Some(hint) = params.vod_hint.as_deref().and_then(VodHint::parse) {
        if let Some(hinted) = with_vod_hint(&url, hint, &candidates) {
            candidates = hinted;
            kind = StreamKind::Vod;
        }
    }

    let cursor = match kind {
        StreamKind::Vod => 0,
        StreamKind::Live => {
            let timeout = state.config.resolver.probe_timeout();
            match pick_reachable_url(&state.upstream, &candidates, timeout).await {
                Some(found) => candidates.iter().position(|c| *c == found).unwrap_or(0),
                None => {
                    tracing::info!("No candidate reachable for {}, using the first", url);
                    0
                }
            }
        }
    };

    let chosen = candidates[cursor].clone();
    let (interlaced, codecs) = tokio::join!(
        state.prober.is_interlaced(&chosen),
        state.prober.codecs(&chosen)
    );
    let plan = VideoPlan {
        deinterlace: interlaced,
        transcode: interlaced || codecs.needs_video_transcode(),
    };
    tracing::info!(
        "Remux {}: video={:?} audio={:?} interlaced={} transcode={}",
        chosen,
        codecs.video,
        codecs.audio,
        interlaced,
        plan.transcode
    );

    let session = state
        .sessions
        .start(SessionRequest {
            candidates,
            cursor,
            kind,
            plan,
        })
        .await?;

    Ok(Json(RemuxResponse {
        m3u8_url: format!("/hls-live/{}/out.m3u8", session.id),
        session_id: session.id.clone(),
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopRequest {
    pub session_id: Option<String>,
}

/// Stop a remux session; always succeeds
/// POST /api/remuxHls/stop
pub async fn stop_remux(State(state): State<Arc<AppState>>, body: Bytes) -> Json<Value> {
    let request: StopRequest = serde_json::from_slice(&body).unwrap_or_default();
    if let Some(id) = request.session_id {
        state.sessions.stop(&id);
    }
    Json(json!({ "ok": true }))
}

/// Drop all caches and sessions
/// POST /api/resetCache
pub async fn reset_cache(State(state): State<Arc<AppState>>) -> Json<Value> {
    let stopped = state.reset().await;
    Json(json!({ "ok": true, "stopped": stopped }))
}
