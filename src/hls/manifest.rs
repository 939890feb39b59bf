//! Manifest text handling

use url::Url;

/// Served while a session has not produced any segment yet
pub const EMPTY_MANIFEST: &str =
    "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:6\n#EXT-X-MEDIA-SEQUENCE:0\n";

/// Whether ffmpeg has published at least one segment
pub fn has_segments(text: &str) -> bool {
    regex!(r"#EXTINF:\d+").is_match(text) && regex!(r"(?i)out\d+\.ts").is_match(text)
}

/// Point bare `out<N>.ts` entries at the session's segment route
pub fn scope_segment_paths(text: &str, session_id: &str) -> String {
    let mut out = String::with_capacity(text.len() + 64);
    for line in text.lines() {
        let trimmed = line.trim();
        if regex!(r"^out\d+\.ts$").is_match(trimmed) {
            out.push_str(&format!("/hls-live/{}/{}", session_id, trimmed));
        } else {
            out.push_str(line);
        }
        out.push('\n');
    }
    out
}

/// Route every URI line of an upstream manifest through the raw proxy
pub fn rewrite_for_proxy(text: &str, base: &Url) -> String {
    let mut out = String::with_capacity(text.len() * 2);
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            out.push_str(line);
        } else {
            let absolute = base
                .join(trimmed)
                .map(|u| u.to_string())
                .unwrap_or_else(|_| trimmed.to_string());
            out.push_str("/proxy?url=");
            out.push_str(&urlencoding::encode(&absolute));
        }
        out.push('\n');
    }
    out
}
