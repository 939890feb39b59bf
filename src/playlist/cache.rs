//! Playlist cache
//!
//! Process-lifetime cache of parsed playlists keyed by source URL. A refetch
//! only replaces the stored list when it is at least as long, so a transient
//! truncated download never shadows a complete one.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

use super::parser::ChannelRecord;

/// Cached channel list with its fetch time
#[derive(Debug, Clone)]
pub struct PlaylistCacheEntry {
    pub fetched_at: DateTime<Utc>,
    pub channels: Arc<Vec<ChannelRecord>>,
}

impl PlaylistCacheEntry {
    pub fn new(channels: Arc<Vec<ChannelRecord>>) -> Self {
        Self {
            fetched_at: Utc::now(),
            channels,
        }
    }

    pub fn age(&self) -> Duration {
        (Utc::now() - self.fetched_at).to_std().unwrap_or_default()
    }

    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.age() < ttl
    }
}

pub struct PlaylistCache {
    entries: DashMap<String, PlaylistCacheEntry>,
    ttl: Duration,
}

impl PlaylistCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Cached list for `url` if it is younger than the TTL
    pub fn fresh(&self, url: &str) -> Option<Arc<Vec<ChannelRecord>>> {
        self.entries
            .get(url)
            .filter(|entry| entry.is_fresh(self.ttl))
            .map(|entry| entry.channels.clone())
    }

    /// Cached entry for `url` regardless of age
    pub fn get(&self, url: &str) -> Option<PlaylistCacheEntry> {
        self.entries.get(url).map(|entry| entry.clone())
    }

    /// Store `channels` unless a longer list is already cached.
    /// Returns whether the cache was updated.
    pub fn store_if_longer(&self, url: &str, channels: Arc<Vec<ChannelRecord>>) -> bool {
        match self.entries.entry(url.to_string()) {
            Entry::Occupied(mut occupied) => {
                let cached_len = occupied.get().channels.len();
                if channels.len() >= cached_len {
                    occupied.insert(PlaylistCacheEntry::new(channels));
                    true
                } else {
                    tracing::debug!(
                        "Keeping cached playlist for {}: {} channels cached, refetch had {}",
                        url,
                        cached_len,
                        channels.len()
                    );
                    false
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(PlaylistCacheEntry::new(channels));
                true
            }
        }
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
