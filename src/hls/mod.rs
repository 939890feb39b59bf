//! HLS publishing
//!
//! Reads what remux sessions write under the HLS root and stores rewritten
//! proxy manifests next to them.

pub mod manifest;

use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;
use uuid::Uuid;

use crate::error::Result;
use manifest::{has_segments, rewrite_for_proxy, scope_segment_paths, EMPTY_MANIFEST};

/// Session ids are generated by us; anything else never names a directory.
pub fn is_valid_session_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

pub fn is_valid_segment_name(name: &str) -> bool {
    regex!(r"^[A-Za-z0-9_\-]+\.(ts|m3u8)$").is_match(name)
}

pub fn content_type_for(name: &str) -> &'static str {
    if name.ends_with(".m3u8") {
        "application/vnd.apple.mpegurl"
    } else if name.ends_with(".ts") {
        "video/mp2t"
    } else {
        "application/octet-stream"
    }
}

/// Current manifest of a session, scoped to its segment route.
/// Falls back to the empty manifest until segments exist.
pub async fn read_session_manifest(root: &Path, id: &str) -> String {
    let dir = root.join(id);
    for name in ["out.m3u8", "out.m3u8.tmp"] {
        match tokio::fs::read_to_string(dir.join(name)).await {
            Ok(text) if has_segments(&text) => return scope_segment_paths(&text, id),
            Ok(_) => return EMPTY_MANIFEST.to_string(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => {
                tracing::debug!("Cannot read manifest of {}: {}", id, e);
                return EMPTY_MANIFEST.to_string();
            }
        }
    }
    EMPTY_MANIFEST.to_string()
}

/// Path of a segment inside a session directory
pub fn segment_path(root: &Path, id: &str, name: &str) -> PathBuf {
    root.join(id).join(name)
}

/// Rewrite an upstream manifest for the raw proxy, store it under
/// `px_<id>/proxied.m3u8` and schedule its removal. Returns the public path.
pub async fn publish_proxy_manifest(
    root: &Path,
    text: &str,
    base: &Url,
    retention: Duration,
) -> Result<String> {
    let id = format!("px_{}", Uuid::new_v4().simple());
    let dir = root.join(&id);
    tokio::fs::create_dir_all(&dir).await?;
    tokio::fs::write(dir.join("proxied.m3u8"), rewrite_for_proxy(text, base)).await?;

    tokio::spawn(async move {
        tokio::time::sleep(retention).await;
        if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to remove {}: {}", dir.display(), e);
            }
        }
    });

    Ok(format!("/hls/{}/proxied.m3u8", id))
}
