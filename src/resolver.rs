//! Source URL resolution
//!
//! IPTV panels expose the same stream under several path layouts. Given one
//! URL we enumerate the plausible variants, most likely first, and optionally
//! pick the first one that answers.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::upstream::{send_with_timeout, Upstream};

/// How a URL is laid out on the panel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Series,
    Movie,
    Live,
    Other,
}

/// Caller hint that a live-shaped URL really points at VOD content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VodHint {
    Series,
    Movie,
}

impl VodHint {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "series" => Some(VodHint::Series),
            "movie" => Some(VodHint::Movie),
            _ => None,
        }
    }
}

/// Ordered, immutable list of URL variants for one stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateList(Arc<[String]>);

impl CandidateList {
    pub fn single(url: &str) -> Self {
        Self(Arc::from(vec![url.to_string()]))
    }

    pub fn first(&self) -> &str {
        // Never empty: every constructor includes at least one URL.
        &self.0[0]
    }
}

impl From<Vec<String>> for CandidateList {
    fn from(urls: Vec<String>) -> Self {
        Self(Arc::from(urls))
    }
}

impl Deref for CandidateList {
    type Target = [String];

    fn deref(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for CandidateList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

fn segments(url: &Url) -> Vec<&str> {
    url.path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default()
}

/// Classify a URL by its path layout
pub fn classify(url: &str) -> SourceKind {
    let Ok(parsed) = Url::parse(url) else {
        return SourceKind::Other;
    };
    let segs = segments(&parsed);
    match segs.first().map(|s| s.to_ascii_lowercase()).as_deref() {
        Some("series") if segs.len() >= 4 => SourceKind::Series,
        Some("movie") if segs.len() >= 4 => SourceKind::Movie,
        _ if segs.len() >= 3 => SourceKind::Live,
        _ => SourceKind::Other,
    }
}

fn has_extension(tail: &str) -> bool {
    regex!(r"\.\w+$").is_match(tail)
}

fn strip_stream_extension(id: &str) -> &str {
    let lower = id.to_ascii_lowercase();
    if lower.ends_with(".m3u8") {
        &id[..id.len() - 5]
    } else if lower.ends_with(".ts") {
        &id[..id.len() - 3]
    } else {
        id
    }
}

/// Credentials and stream id of a live-shaped path. A leading `live` segment
/// is a root prefix, not a username.
fn live_parts<'a>(segs: &[&'a str]) -> Option<(&'a str, &'a str, String)> {
    let segs = match segs.first() {
        Some(first) if first.eq_ignore_ascii_case("live") && segs.len() >= 4 => &segs[1..],
        _ => segs,
    };
    if segs.len() < 3 {
        return None;
    }
    let id = strip_stream_extension(&segs[2..].join("/")).to_string();
    Some((segs[0], segs[1], id))
}

/// Enumerate plausible variants of `url`
pub fn build_candidates(url: &str) -> CandidateList {
    let Ok(parsed) = Url::parse(url) else {
        return CandidateList::single(url);
    };
    let segs = segments(&parsed);

    match classify(url) {
        kind @ (SourceKind::Series | SourceKind::Movie) => {
            let mut urls = vec![url.to_string()];
            let tail = segs.last().copied().unwrap_or_default();
            if !has_extension(tail) {
                let exts: [&str; 2] = if kind == SourceKind::Series {
                    ["mkv", "mp4"]
                } else {
                    ["mp4", "mkv"]
                };
                let base = url.split(['?', '#']).next().unwrap_or(url);
                urls.extend(exts.iter().map(|ext| format!("{}.{}", base, ext)));
            }
            urls.into()
        }
        SourceKind::Live => {
            let Some((user, pass, id)) = live_parts(&segs) else {
                return CandidateList::single(url);
            };
            let origin = parsed.origin().ascii_serialization();

            vec![
                format!("{}/{}/{}/{}", origin, user, pass, id),
                format!("{}/{}/{}/{}.ts", origin, user, pass, id),
                format!("{}/live/{}/{}/{}.ts", origin, user, pass, id),
                format!("{}/live/{}/{}/{}.m3u8", origin, user, pass, id),
                format!("{}/hls/{}/{}/{}.m3u8", origin, user, pass, id),
            ]
            .into()
        }
        SourceKind::Other => CandidateList::single(url),
    }
}

/// Whether a URL itself says it is VOD content
pub fn looks_vod(url: &str) -> bool {
    regex!(r"(?i)/(series|movie)/").is_match(url)
        || regex!(r"(?i)\.(mp4|mkv|avi|mov|m4v|wmv|mpg|mpeg)(\?|$)").is_match(url)
}

/// Prepend VOD-root variants of a live-shaped URL.
/// Returns `None` when the hint does not apply.
pub fn with_vod_hint(url: &str, hint: VodHint, candidates: &CandidateList) -> Option<CandidateList> {
    if looks_vod(url) {
        return None;
    }
    let parsed = Url::parse(url).ok()?;
    let (user, pass, id) = live_parts(&segments(&parsed))?;
    let origin = parsed.origin().ascii_serialization();
    let (root, exts) = match hint {
        VodHint::Series => ("series", ["mkv", "mp4"]),
        VodHint::Movie => ("movie", ["mp4", "mkv"]),
    };

    let mut urls: Vec<String> = exts
        .iter()
        .map(|ext| format!("{}/{}/{}/{}/{}.{}", origin, root, user, pass, id, ext))
        .collect();
    urls.extend(candidates.iter().cloned());
    Some(urls.into())
}

/// First candidate answering a GET with a success status within `timeout`
pub async fn pick_reachable_url(
    upstream: &Upstream,
    candidates: &CandidateList,
    timeout: Duration,
) -> Option<String> {
    for candidate in candidates.iter() {
        match send_with_timeout(upstream.get(candidate), timeout).await {
            Ok(response) if response.status().is_success() => {
                tracing::debug!("Candidate reachable: {}", candidate);
                return Some(candidate.clone());
            }
            Ok(response) => {
                tracing::debug!("Candidate {} answered {}", candidate, response.status());
            }
            Err(e) => {
                tracing::debug!("Candidate {} unreachable: {}", candidate, e);
            }
        }
        // Dropping the response here closes the connection without reading the body.
    }
    None
}
