//! End-to-end integration tests

use axum::http::{header, StatusCode};
use serde_json::Value;
use std::time::Duration;

use crate::hls::manifest::EMPTY_MANIFEST;
use crate::integration::fixtures::{
    encode, eventually, MockUpstream, TestGateway, BIG_PLAYLIST_LEN, SEGMENT_BYTES,
};

fn json(body: &str) -> Value {
    serde_json::from_str(body).unwrap()
}

#[tokio::test]
async fn test_playlist_conventional_then_cached() {
    let upstream = MockUpstream::spawn().await;
    let gateway = TestGateway::new(None);
    let uri = format!("/api/playlist?url={}", encode(&upstream.url("/list.m3u")));

    let (status, _, body) = gateway.get(&uri).await;
    assert_eq!(status, StatusCode::OK);
    let first = json(&body);
    let channels = first["channels"].as_array().unwrap();
    assert_eq!(channels.len(), 3);
    assert_eq!(channels[0]["name"], "News One");
    assert_eq!(channels[0]["tvg_logo"], "http://logo/1.png");
    assert_eq!(channels[2]["group"], "Kids");
    assert!(first.get("cached").is_none());

    let (_, _, body) = gateway.get(&uri).await;
    let second = json(&body);
    assert_eq!(second["cached"], true);
    assert_eq!(second["channels"], first["channels"]);
}

#[tokio::test]
async fn test_playlist_reversed_order() {
    let upstream = MockUpstream::spawn().await;
    let gateway = TestGateway::new(None);
    let uri = format!("/api/playlist?url={}", encode(&upstream.url("/reversed.m3u")));

    let (status, _, body) = gateway.get(&uri).await;
    assert_eq!(status, StatusCode::OK);
    let body = json(&body);
    let channels = body["channels"].as_array().unwrap();
    assert_eq!(channels.len(), 2);
    assert_eq!(channels[0]["name"], "News One");
    assert_eq!(channels[0]["url"], "http://streams.example/u/p/1");
    assert_eq!(channels[1]["name"], "Sport Two");
    assert_eq!(channels[1]["url"], "http://streams.example/u/p/2");
}

#[tokio::test]
async fn test_playlist_limit_does_not_truncate_cache() {
    let upstream = MockUpstream::spawn().await;
    let gateway = TestGateway::new(None);
    let url = upstream.url("/list.m3u");

    let (_, _, body) = gateway
        .get(&format!("/api/playlist?url={}&limit=2", encode(&url)))
        .await;
    assert_eq!(json(&body)["channels"].as_array().unwrap().len(), 2);
    assert_eq!(gateway.state.playlists.cache().get(&url).unwrap().channels.len(), 3);
}

#[tokio::test]
async fn test_playlist_whole_manifest_is_one_channel() {
    let upstream = MockUpstream::spawn().await;
    let gateway = TestGateway::new(None);
    let url = upstream.url("/live/index.m3u8");

    let (status, _, body) = gateway
        .get(&format!("/api/playlist?url={}", encode(&url)))
        .await;
    assert_eq!(status, StatusCode::OK);
    let body = json(&body);
    let channels = body["channels"].as_array().unwrap();
    assert_eq!(channels.len(), 1);
    assert_eq!(channels[0]["name"], "Stream");
    assert_eq!(channels[0]["url"], url.as_str());
}

#[tokio::test]
async fn test_playlist_early_reply_then_full_cache() {
    let upstream = MockUpstream::spawn().await;
    let gateway = TestGateway::new(None);
    let url = upstream.url("/big.m3u");

    let (status, _, body) = gateway
        .get(&format!("/api/playlist?url={}&early=5", encode(&url)))
        .await;
    assert_eq!(status, StatusCode::OK);
    let body = json(&body);
    assert_eq!(body["partial"], true);
    assert!(body["channels"].as_array().unwrap().len() >= 5);

    let cache = gateway.state.playlists.cache();
    let url = &url;
    let complete = eventually(Duration::from_secs(5), || async move {
        cache
            .get(url)
            .map(|entry| entry.channels.len() == BIG_PLAYLIST_LEN)
            .unwrap_or(false)
    })
    .await;
    assert!(complete);
}

#[tokio::test]
async fn test_playlist_identity_fallback() {
    let upstream = MockUpstream::spawn().await;
    let gateway = TestGateway::new(None);

    let (status, _, body) = gateway
        .get(&format!("/api/playlist?url={}", encode(&upstream.url("/picky.m3u"))))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["channels"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_playlist_all_identities_rejected() {
    let upstream = MockUpstream::spawn().await;
    let gateway = TestGateway::new(None);

    let (status, _, body) = gateway
        .get(&format!("/api/playlist?url={}", encode(&upstream.url("/forbidden.m3u"))))
        .await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert!(json(&body)["error"].is_string());
}

#[tokio::test]
async fn test_playlist_debug_surfaces_upstream() {
    let upstream = MockUpstream::spawn().await;
    let gateway = TestGateway::new(None);

    let (status, _, body) = gateway
        .get(&format!(
            "/api/playlist?url={}&debug=1",
            encode(&upstream.url("/forbidden.m3u"))
        ))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let body = json(&body);
    assert_eq!(body["error"], "upstream 403");
    assert_eq!(body["ua"], "VLC/3.0.18 LibVLC/3.0.18");
    assert_eq!(body["body"], "account expired");
}

#[tokio::test]
async fn test_playlist_missing_url() {
    let gateway = TestGateway::new(None);
    let (status, _, body) = gateway.get("/api/playlist").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json(&body)["error"].as_str().unwrap().contains("missing url"));
}

#[tokio::test]
async fn test_raw_proxy_passthrough() {
    let upstream = MockUpstream::spawn().await;
    let gateway = TestGateway::new(None);

    let (status, headers, body) = gateway
        .get(&format!("/proxy?url={}", encode(&upstream.url("/media/seg1.ts"))))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "video/mp2t");
    assert_eq!(body.as_bytes(), SEGMENT_BYTES);

    let (status, _, body) = gateway
        .get(&format!("/proxy?url={}", encode(&upstream.url("/nothing"))))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, "Upstream error");
}

#[tokio::test]
async fn test_hls_proxy_rewrites_and_publishes() {
    let upstream = MockUpstream::spawn().await;
    let gateway = TestGateway::new(None);

    let (status, _, body) = gateway
        .get(&format!(
            "/api/hlsProxy?url={}",
            encode(&upstream.url("/live/index.m3u8"))
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    let m3u8_url = json(&body)["m3u8Url"].as_str().unwrap().to_string();
    assert!(m3u8_url.starts_with("/hls/px_"));

    let (status, _, manifest) = gateway.get(&m3u8_url).await;
    assert_eq!(status, StatusCode::OK);
    let expected = format!("/proxy?url={}", encode(&upstream.url("/live/seg10.ts")));
    assert!(manifest.contains(&expected), "{}", manifest);
    assert!(manifest.contains("#EXT-X-MEDIA-SEQUENCE:10"));
}

#[tokio::test]
async fn test_unknown_session_gets_empty_manifest() {
    let gateway = TestGateway::new(None);
    let (status, headers, body) = gateway.get("/hls-live/does-not-exist/out.m3u8").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, EMPTY_MANIFEST);
    assert_eq!(
        headers.get(header::CACHE_CONTROL).unwrap(),
        "no-store, no-cache, must-revalidate"
    );
    assert_eq!(headers.get(header::PRAGMA).unwrap(), "no-cache");
    assert_eq!(headers.get(header::EXPIRES).unwrap(), "0");
    assert_eq!(
        headers.get(header::CONTENT_TYPE).unwrap(),
        "application/vnd.apple.mpegurl"
    );
}

#[tokio::test]
async fn test_missing_segment_is_404() {
    let gateway = TestGateway::new(None);
    let (status, _, body) = gateway.get("/hls-live/does-not-exist/out3.ts").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, "not found");

    let (status, _, _) = gateway.get("/hls-live/abc/..%2F..%2Fetc%2Fpasswd").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_stop_unknown_session_is_ok() {
    let gateway = TestGateway::new(None);
    for body in [r#"{"sessionId":"nope"}"#, r#"{}"#, "not json"] {
        let (status, _, response) = gateway.post("/api/remuxHls/stop", body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&response)["ok"], true);
    }
}

#[tokio::test]
async fn test_reset_clears_cache_and_root() {
    let upstream = MockUpstream::spawn().await;
    let gateway = TestGateway::new(None);
    gateway
        .get(&format!("/api/playlist?url={}", encode(&upstream.url("/list.m3u"))))
        .await;
    std::fs::create_dir_all(gateway.hls_root().join("px_old")).unwrap();

    let (status, _, body) = gateway.post("/api/resetCache", "").await;
    assert_eq!(status, StatusCode::OK);
    let body = json(&body);
    assert_eq!(body["ok"], true);
    assert_eq!(body["stopped"], 0);
    assert!(gateway.state.playlists.cache().is_empty());
    assert!(!gateway.hls_root().join("px_old").exists());
}

#[tokio::test]
async fn test_remux_without_ffmpeg() {
    let gateway = TestGateway::new(Some(std::path::Path::new("/nonexistent/ffmpeg")));
    let (status, _, body) = gateway
        .get(&format!("/api/remuxHls?url={}", encode("http://h/u/p/1")))
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json(&body)["error"].is_string());

    let (status, _, _) = gateway.get("/api/remuxHls").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[cfg(unix)]
mod sessions {
    use super::*;
    use crate::integration::fixtures::FakeFfmpeg;
    use crate::remux::session::SessionState;

    #[tokio::test]
    async fn test_live_session_falls_back_under_same_id() {
        let upstream = MockUpstream::spawn().await;
        let ffmpeg = FakeFfmpeg::install();
        let gateway = TestGateway::new(Some(&ffmpeg.path()));

        let (status, _, body) = gateway
            .get(&format!("/api/remuxHls?url={}", encode(&upstream.url("/u/p/123"))))
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        let body = json(&body);
        let id = body["sessionId"].as_str().unwrap().to_string();
        let manifest_uri = format!("/hls-live/{}/out.m3u8", id);
        assert_eq!(body["m3u8Url"], manifest_uri.as_str());

        let segment_line = format!("/hls-live/{}/out0.ts", id);
        let (gw, uri, line) = (&gateway, &manifest_uri, &segment_line);
        let published = eventually(Duration::from_secs(10), || async move {
            gw.get(uri).await.2.contains(line.as_str())
        })
        .await;
        assert!(published);

        // Plain, .ts and /live/...ts variants failed before /live/...m3u8 worked.
        let calls = ffmpeg.remux_calls();
        assert_eq!(calls.len(), 4, "{:#?}", calls);
        assert!(calls[3].contains("/live/u/p/123.m3u8"));

        let session = gateway.state.sessions.get(&id).unwrap();
        assert_eq!(session.state(), SessionState::Running);
        assert_eq!(session.cursor(), 3);

        let (status, _, segment) = gateway.get(&segment_line).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(segment, "TSDATA");

        let (_, _, body) = gateway
            .post("/api/remuxHls/stop", &format!(r#"{{"sessionId":"{}"}}"#, id))
            .await;
        assert_eq!(json(&body)["ok"], true);
        assert!(gateway.state.sessions.get(&id).is_none());

        let dir = &gateway.hls_root().join(&id);
        assert!(eventually(Duration::from_secs(5), || async move { !dir.exists() }).await);
    }

    #[tokio::test]
    async fn test_exhausted_live_session_is_removed_at_once() {
        let upstream = MockUpstream::spawn().await;
        let ffmpeg = FakeFfmpeg::install();
        let gateway = TestGateway::configured(Some(&ffmpeg.path()), |config| {
            config.remux.cleanup_grace_secs = 600;
        });

        // No variant of these credentials ever publishes.
        let (status, _, body) = gateway
            .get(&format!("/api/remuxHls?url={}", encode(&upstream.url("/x/y/9"))))
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        let id = json(&body)["sessionId"].as_str().unwrap().to_string();

        let (sessions, session_id) = (&gateway.state.sessions, &id);
        assert!(
            eventually(Duration::from_secs(10), || async move {
                sessions.get(session_id).is_none()
            })
            .await
        );

        let calls = ffmpeg.remux_calls();
        assert_eq!(calls.len(), 5, "{:#?}", calls);
        assert!(calls[4].contains("/hls/x/y/9.m3u8"));

        let dir = &gateway.hls_root().join(&id);
        assert!(eventually(Duration::from_secs(5), || async move { !dir.exists() }).await);

        let (_, _, manifest) = gateway.get(&format!("/hls-live/{}/out.m3u8", id)).await;
        assert!(!manifest.contains(".ts"));
    }

    #[tokio::test]
    async fn test_vod_session_never_retries() {
        let upstream = MockUpstream::spawn().await;
        let ffmpeg = FakeFfmpeg::install();
        let gateway = TestGateway::new(Some(&ffmpeg.path()));

        let (status, _, body) = gateway
            .get(&format!(
                "/api/remuxHls?url={}",
                encode(&upstream.url("/movie/u/p/7"))
            ))
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        let id = json(&body)["sessionId"].as_str().unwrap().to_string();

        let (sessions, session_id) = (&gateway.state.sessions, &id);
        assert!(
            eventually(Duration::from_secs(5), || async move {
                sessions.get(session_id).is_none()
            })
            .await
        );
        tokio::time::sleep(Duration::from_millis(200)).await;

        let calls = ffmpeg.remux_calls();
        assert_eq!(calls.len(), 1, "{:#?}", calls);
        assert!(calls[0].contains("/movie/u/p/7"));

        let dir = &gateway.hls_root().join(&id);
        assert!(eventually(Duration::from_secs(5), || async move { !dir.exists() }).await);
    }

    #[tokio::test]
    async fn test_reset_stops_running_sessions() {
        let upstream = MockUpstream::spawn().await;
        let ffmpeg = FakeFfmpeg::install();
        let gateway = TestGateway::new(Some(&ffmpeg.path()));

        let (status, _, body) = gateway
            .get(&format!(
                "/api/remuxHls?url={}",
                encode(&upstream.url("/live/u/p/55.m3u8"))
            ))
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        let id = json(&body)["sessionId"].as_str().unwrap().to_string();

        let (sessions, session_id) = (&gateway.state.sessions, &id);
        assert!(
            eventually(Duration::from_secs(10), || async move {
                sessions
                    .get(session_id)
                    .map(|s| s.current_url().ends_with("/live/u/p/55.m3u8"))
                    .unwrap_or(false)
            })
            .await
        );

        let (_, _, body) = gateway.post("/api/resetCache", "").await;
        assert_eq!(json(&body)["stopped"], 1);
        assert!(gateway.state.sessions.is_empty());
        assert_eq!(std::fs::read_dir(gateway.hls_root()).unwrap().count(), 0);
    }
}
