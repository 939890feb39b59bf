//! Playlist ingestion
//!
//! Fetches a playlist from upstream, trying each configured client identity
//! in turn, and parses it while it downloads. With `early=N` the caller is
//! answered as soon as N channels are known; the download then continues in
//! the background only to refresh the cache.

use futures_util::StreamExt;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::oneshot;

use super::cache::PlaylistCache;
use super::parser::{parse_playlist, ChannelRecord, M3uParser, UNCATEGORIZED_GROUP};
use crate::config::PlaylistConfig;
use crate::error::{GatewayError, Result};
use crate::upstream::{send_with_timeout, Upstream};

const HLS_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
const DEBUG_BODY_CHARS: usize = 2000;

/// A playlist request as received from the caller
#[derive(Debug, Clone)]
pub struct PlaylistQuery {
    pub url: String,
    pub limit: Option<usize>,
    pub early: Option<usize>,
    pub debug: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaylistResponse {
    pub channels: Vec<ChannelRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial: Option<bool>,
}

impl PlaylistResponse {
    fn take(channels: &[ChannelRecord], limit: usize) -> Vec<ChannelRecord> {
        channels.iter().take(limit).cloned().collect()
    }

    fn complete(channels: &[ChannelRecord], limit: usize) -> Self {
        Self {
            channels: Self::take(channels, limit),
            cached: None,
            partial: None,
        }
    }

    fn cached(channels: &[ChannelRecord], limit: usize) -> Self {
        Self {
            cached: Some(true),
            ..Self::complete(channels, limit)
        }
    }

    fn partial(channels: &[ChannelRecord], limit: usize) -> Self {
        Self {
            partial: Some(true),
            ..Self::complete(channels, limit)
        }
    }
}

#[derive(Debug)]
pub enum PlaylistReply {
    Channels(PlaylistResponse),
    /// Upstream refused the request and the caller asked to see why
    UpstreamDebug {
        status: u16,
        user_agent: String,
        body: String,
    },
}

/// Delivers at most one reply to the waiting request
struct Responder {
    tx: Option<oneshot::Sender<Result<PlaylistReply>>>,
}

impl Responder {
    fn new(tx: oneshot::Sender<Result<PlaylistReply>>) -> Self {
        Self { tx: Some(tx) }
    }

    fn reply(&mut self, reply: Result<PlaylistReply>) {
        if let Some(tx) = self.tx.take() {
            // The request may have gone away; the cache is still refreshed.
            let _ = tx.send(reply);
        }
    }

    fn has_replied(&self) -> bool {
        self.tx.is_none()
    }
}

enum Attempt {
    Done,
    Rejected { status: u16, body: Option<String> },
}

/// Splits a byte stream into lines without assuming chunk boundaries fall on
/// line or character boundaries.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Append a chunk and return every line it completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(pos) = self.pending[start..].iter().position(|&b| b == b'\n') {
            let end = start + pos;
            lines.push(decode_line(&self.pending[start..end]));
            start = end + 1;
        }
        self.pending.drain(..start);
        lines
    }

    /// The last line if the stream did not end with a newline
    pub fn finish(self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(decode_line(&self.pending))
        }
    }
}

fn decode_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches('\r')
        .to_string()
}

pub struct PlaylistIngestor {
    upstream: Arc<Upstream>,
    cache: PlaylistCache,
    config: PlaylistConfig,
}

impl PlaylistIngestor {
    pub fn new(upstream: Arc<Upstream>, config: PlaylistConfig) -> Self {
        Self {
            upstream,
            cache: PlaylistCache::new(config.cache_ttl()),
            config,
        }
    }

    pub fn cache(&self) -> &PlaylistCache {
        &self.cache
    }

    fn effective_limit(&self, limit: Option<usize>) -> usize {
        match limit {
            Some(n) if n > 0 => n.min(self.config.max_limit),
            _ => usize::MAX,
        }
    }

    /// Serve a playlist from cache or upstream
    pub async fn load(self: &Arc<Self>, query: PlaylistQuery) -> Result<PlaylistReply> {
        let limit = self.effective_limit(query.limit);

        if let Some(channels) = self.cache.fresh(&query.url) {
            tracing::debug!("Playlist cache hit for {}", query.url);
            return Ok(PlaylistReply::Channels(PlaylistResponse::cached(
                &channels, limit,
            )));
        }

        // The fetch runs detached so it can outlive an early reply.
        let (tx, rx) = oneshot::channel();
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut responder = Responder::new(tx);
            this.fetch(&query, limit, &mut responder).await;
        });

        rx.await.unwrap_or_else(|_| {
            Err(GatewayError::Internal(
                "playlist fetch ended without a reply".to_string(),
            ))
        })
    }

    async fn fetch(&self, query: &PlaylistQuery, limit: usize, responder: &mut Responder) {
        for user_agent in &self.config.user_agents {
            match self.attempt(query, user_agent, limit, responder).await {
                Ok(Attempt::Done) => return,
                Ok(Attempt::Rejected { status, body }) => {
                    tracing::info!(
                        "Playlist upstream {} answered {} for UA {:?}",
                        query.url,
                        status,
                        user_agent
                    );
                    if let Some(body) = body {
                        responder.reply(Ok(PlaylistReply::UpstreamDebug {
                            status,
                            user_agent: user_agent.clone(),
                            body,
                        }));
                        return;
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        "Playlist fetch of {} with UA {:?} failed: {}",
                        query.url,
                        user_agent,
                        e
                    );
                    if responder.has_replied() {
                        // Partial list already delivered; drop the refresh.
                        return;
                    }
                }
            }
        }

        responder.reply(Err(GatewayError::UpstreamUnavailable(
            "timeout or no valid response from upstream".to_string(),
        )));
    }

    async fn attempt(
        &self,
        query: &PlaylistQuery,
        user_agent: &str,
        limit: usize,
        responder: &mut Responder,
    ) -> Result<Attempt> {
        let url = query.url.as_str();
        let request = self.upstream.get_as(url, user_agent);
        let response = send_with_timeout(request, self.config.fetch_timeout()).await?;

        let status = response.status();
        if !status.is_success() {
            let body = if query.debug {
                let text = tokio::time::timeout(self.config.fetch_timeout(), response.text())
                    .await
                    .ok()
                    .and_then(|r| r.ok())
                    .unwrap_or_default();
                Some(text.chars().take(DEBUG_BODY_CHARS).collect())
            } else {
                None
            };
            return Ok(Attempt::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_lowercase();

        if content_type.contains(HLS_CONTENT_TYPE) || has_m3u8_path(url) {
            let body = tokio::time::timeout(self.config.fetch_timeout(), response.text())
                .await
                .map_err(|_| {
                    GatewayError::UpstreamUnavailable("playlist body timed out".to_string())
                })??;

            let channels = if is_media_manifest(&body) {
                tracing::info!("{} is a media manifest, serving it as one stream", url);
                vec![whole_manifest_channel(url)]
            } else {
                parse_playlist(&body)
            };
            self.finish(url, channels, limit, responder);
            return Ok(Attempt::Done);
        }

        let early = query.early.unwrap_or(0);
        let mut parser = M3uParser::new();
        let mut lines = LineBuffer::default();
        let mut stream = response.bytes_stream();

        loop {
            let next = tokio::time::timeout(self.config.read_idle_timeout(), stream.next())
                .await
                .map_err(|_| {
                    GatewayError::UpstreamUnavailable("playlist download stalled".to_string())
                })?;
            let chunk = match next {
                Some(chunk) => chunk?,
                None => break,
            };

            for line in lines.push(&chunk) {
                parser.push_line(&line);
                if early > 0 && !responder.has_replied() && parser.len() >= early {
                    tracing::debug!("Early playlist reply after {} channels", parser.len());
                    responder.reply(Ok(PlaylistReply::Channels(PlaylistResponse::partial(
                        parser.channels(),
                        limit,
                    ))));
                }
            }
        }
        if let Some(rest) = lines.finish() {
            parser.push_line(&rest);
        }

        let channels = parser.finish();
        if responder.has_replied() {
            tracing::info!(
                "Playlist {} fully parsed after partial reply: {} channels",
                url,
                channels.len()
            );
        }
        self.finish(url, channels, limit, responder);
        Ok(Attempt::Done)
    }

    fn finish(
        &self,
        url: &str,
        channels: Vec<ChannelRecord>,
        limit: usize,
        responder: &mut Responder,
    ) {
        let channels = Arc::new(channels);
        self.cache.store_if_longer(url, channels.clone());
        responder.reply(Ok(PlaylistReply::Channels(PlaylistResponse::complete(
            &channels, limit,
        ))));
    }
}

fn has_m3u8_path(url: &str) -> bool {
    match url::Url::parse(url) {
        Ok(parsed) => parsed.path().to_lowercase().ends_with(".m3u8"),
        Err(_) => url.to_lowercase().ends_with(".m3u8"),
    }
}

/// A media manifest (as opposed to a channel list) carries segment directives
pub fn is_media_manifest(body: &str) -> bool {
    body.starts_with("#EXTM3U") && body.contains("#EXT-X-TARGETDURATION")
}

fn whole_manifest_channel(url: &str) -> ChannelRecord {
    ChannelRecord {
        name: "Stream".to_string(),
        tvg_logo: String::new(),
        group: UNCATEGORIZED_GROUP.to_string(),
        url: url.to_string(),
    }
}
