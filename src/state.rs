//! Application state
//!
//! Holds the shared upstream client, the playlist cache (inside the
//! ingestor), the remux session registry and the prober.

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::error::Result;
use crate::playlist::PlaylistIngestor;
use crate::probe::MediaProber;
use crate::remux::SessionManager;
use crate::upstream::Upstream;

pub struct AppState {
    pub config: ServerConfig,
    pub upstream: Arc<Upstream>,
    pub playlists: Arc<PlaylistIngestor>,
    pub sessions: Arc<SessionManager>,
    pub prober: MediaProber,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Result<Self> {
        let upstream = Arc::new(Upstream::new(&config.upstream)?);
        let playlists = Arc::new(PlaylistIngestor::new(
            upstream.clone(),
            config.playlist.clone(),
        ));
        let sessions = Arc::new(SessionManager::new(
            config.remux.clone(),
            upstream.ffmpeg_identity_args(),
        ));
        let prober = MediaProber::new(
            config.remux.ffmpeg_path.clone(),
            upstream.clone(),
            config.probe.clone(),
        );

        Ok(Self {
            config,
            upstream,
            playlists,
            sessions,
            prober,
        })
    }

    /// Drop every cached playlist and every session. Returns the number of
    /// sessions stopped.
    pub async fn reset(&self) -> usize {
        self.playlists.cache().clear();
        self.sessions.reset().await
    }
}
