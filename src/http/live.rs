//! Live session output
//!
//! GET /hls-live/{id}/out.m3u8 returns the rolling manifest (or the empty
//! one); any other file name is a segment streamed from the session dir.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tokio_util::io::ReaderStream;

use crate::hls::manifest::EMPTY_MANIFEST;
use crate::hls::{
    content_type_for, is_valid_segment_name, is_valid_session_id, read_session_manifest,
    segment_path,
};
use crate::state::AppState;

const MANIFEST_NAME: &str = "out.m3u8";

fn manifest_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-store, no-cache, must-revalidate"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/vnd.apple.mpegurl"),
    );
    headers
}

pub async fn live_file(
    State(state): State<Arc<AppState>>,
    Path((id, file)): Path<(String, String)>,
) -> Response {
    if file == MANIFEST_NAME {
        live_manifest(&state, &id).await
    } else {
        live_segment(&state, &id, &file).await
    }
}

async fn live_manifest(state: &AppState, id: &str) -> Response {
    let text = if is_valid_session_id(id) {
        read_session_manifest(state.sessions.hls_root(), id).await
    } else {
        EMPTY_MANIFEST.to_string()
    };
    (manifest_headers(), text).into_response()
}

async fn live_segment(state: &AppState, id: &str, name: &str) -> Response {
    if !is_valid_session_id(id) || !is_valid_segment_name(name) {
        return (StatusCode::NOT_FOUND, "not found").into_response();
    }

    let path = segment_path(state.sessions.hls_root(), id, name);
    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(_) => return (StatusCode::NOT_FOUND, "not found").into_response(),
    };

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(content_type_for(name)),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    if let Ok(metadata) = file.metadata().await {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(metadata.len()));
    }

    (headers, Body::from_stream(ReaderStream::new(file))).into_response()
}
