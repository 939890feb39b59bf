//! Test fixtures for integration tests
//!
//! A mock IPTV panel served by axum on an ephemeral port, a fake ffmpeg
//! shell script and helpers to build an `AppState` around them.

use axum::{
    body::Body,
    http::{header, HeaderMap, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tower::util::ServiceExt;

use crate::config::ServerConfig;
use crate::http::create_router;
use crate::state::AppState;

pub const CONVENTIONAL: &str = "#EXTM3U\n\
#EXTINF:-1 tvg-logo=\"http://logo/1.png\" group-title=\"News\",News One\n\
http://streams.example/u/p/1\n\
#EXTINF:-1 group-title=\"Sport\",Sport Two\n\
http://streams.example/u/p/2\n\
#EXTINF:-1 group-title=\"Kids\",Kids Three\n\
http://streams.example/u/p/3\n";

pub const REVERSED: &str = "#EXTM3U\n\
http://streams.example/u/p/1\n\
#EXTINF:-1 group-title=\"News\",News One\n\
http://streams.example/u/p/2\n\
#EXTINF:-1 group-title=\"Sport\",Sport Two\n";

pub const MEDIA_MANIFEST: &str = "#EXTM3U\n\
#EXT-X-VERSION:3\n\
#EXT-X-TARGETDURATION:6\n\
#EXT-X-MEDIA-SEQUENCE:10\n\
#EXTINF:6.0,\n\
seg10.ts\n\
#EXTINF:6.0,\n\
seg11.ts\n";

pub const SEGMENT_BYTES: &[u8] = b"\x47fake transport stream";

/// Number of entries in `/big.m3u`
pub const BIG_PLAYLIST_LEN: usize = 500;

fn big_playlist() -> String {
    let mut text = String::from("#EXTM3U\n");
    for i in 0..BIG_PLAYLIST_LEN {
        text.push_str(&format!(
            "#EXTINF:-1 group-title=\"Bulk\",Channel {}\nhttp://streams.example/u/p/{}\n",
            i, i
        ));
    }
    text
}

async fn picky(headers: HeaderMap) -> Response {
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if user_agent == "IPTV/1.0" {
        CONVENTIONAL.into_response()
    } else {
        (StatusCode::FORBIDDEN, "blocked client").into_response()
    }
}

/// Mock IPTV panel, shut down on drop
pub struct MockUpstream {
    pub base: String,
    handle: JoinHandle<()>,
}

impl MockUpstream {
    pub async fn spawn() -> Self {
        let app = Router::new()
            .route("/list.m3u", get(|| async { CONVENTIONAL }))
            .route("/reversed.m3u", get(|| async { REVERSED }))
            .route("/big.m3u", get(|| async { big_playlist() }))
            .route("/picky.m3u", get(picky))
            .route(
                "/forbidden.m3u",
                get(|| async { (StatusCode::FORBIDDEN, "account expired") }),
            )
            .route(
                "/live/index.m3u8",
                get(|| async {
                    (
                        [(header::CONTENT_TYPE, "application/vnd.apple.mpegurl")],
                        MEDIA_MANIFEST,
                    )
                }),
            )
            .route(
                "/media/seg1.ts",
                get(|| async { ([(header::CONTENT_TYPE, "video/mp2t")], SEGMENT_BYTES) }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base: format!("http://{}", addr),
            handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Gateway state rooted in a temp directory with short timeouts
pub struct TestGateway {
    pub state: Arc<AppState>,
    pub root: TempDir,
}

impl TestGateway {
    pub fn new(ffmpeg: Option<&Path>) -> Self {
        Self::configured(ffmpeg, |_| {})
    }

    /// Like `new`, with `tweak` applied to the test configuration
    pub fn configured(ffmpeg: Option<&Path>, tweak: impl FnOnce(&mut ServerConfig)) -> Self {
        let root = TempDir::new().unwrap();
        let mut config = ServerConfig::default();
        config.remux.hls_root = root.path().join("hls");
        config.remux.cleanup_grace_secs = 0;
        config.playlist.fetch_timeout_secs = 5;
        config.playlist.read_idle_timeout_secs = 5;
        config.resolver.probe_timeout_ms = 2000;
        config.probe.interlace_kill_ms = 2000;
        config.probe.codec_kill_ms = 2000;
        if let Some(ffmpeg) = ffmpeg {
            config.remux.ffmpeg_path = ffmpeg.to_string_lossy().into_owned();
        }
        tweak(&mut config);
        std::fs::create_dir_all(&config.remux.hls_root).unwrap();

        Self {
            state: Arc::new(AppState::new(config).unwrap()),
            root,
        }
    }

    pub fn hls_root(&self) -> PathBuf {
        self.state.sessions.hls_root().to_path_buf()
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, HeaderMap, String) {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn post(&self, uri: &str, body: &str) -> (StatusCode, HeaderMap, String) {
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, HeaderMap, String) {
        let response = create_router(self.state.clone())
            .oneshot(request)
            .await
            .unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, headers, String::from_utf8_lossy(&body).into_owned())
    }
}

pub fn encode(url: &str) -> String {
    urlencoding::encode(url).into_owned()
}

/// Poll `check` until it holds or `timeout` elapses
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// Stand-in for ffmpeg.
///
/// Probe runs (`-f null -`) report an H.264/AAC stream. A remux run whose
/// input is the `/live/<u>/<p>/<id>.m3u8` variant publishes one segment and
/// keeps running; every other remux run exits with status 1. Each invocation
/// is appended to `calls.log`.
#[cfg(unix)]
pub struct FakeFfmpeg {
    pub dir: TempDir,
}

#[cfg(unix)]
impl FakeFfmpeg {
    pub fn install() -> Self {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let log = dir.path().join("calls.log");
        let script = format!(
            r#"#!/bin/sh
line=$(printf '%s' "$*" | tr '\r\n' '  ')
printf '%s\n' "$line" >> "{log}"
case "$*" in
  *" -f null -"*)
    echo "Stream #0:0: Video: h264 (High), yuv420p(progressive), 1280x720" >&2
    echo "Stream #0:1: Audio: aac (LC), 48000 Hz, stereo" >&2
    exit 0
    ;;
esac
for arg in "$@"; do last="$arg"; done
out=$(dirname "$last")
case "$*" in
  *"/live/u/p/"*".m3u8 -sn"*)
    printf '#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:3\n#EXT-X-MEDIA-SEQUENCE:0\n#EXTINF:3.000000,\nout0.ts\n' > "$out/out.m3u8"
    printf 'TSDATA' > "$out/out0.ts"
    exec sleep 30
    ;;
esac
exit 1
"#,
            log = log.display()
        );

        let path = dir.path().join("ffmpeg");
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        Self { dir }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.path().join("ffmpeg")
    }

    /// Remux invocations so far, probes excluded
    pub fn remux_calls(&self) -> Vec<String> {
        std::fs::read_to_string(self.dir.path().join("calls.log"))
            .unwrap_or_default()
            .lines()
            .filter(|line| !line.contains(" -f null -"))
            .map(|line| line.to_string())
            .collect()
    }
}
