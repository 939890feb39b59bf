//! Server configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Client identity and timeouts used for every upstream request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// User-Agent for proxying, probing and remuxing
    pub user_agent: String,

    /// Optional Origin/Referer some panels insist on
    pub referer: Option<String>,

    /// Time allowed for the raw and manifest proxies to receive response headers
    pub proxy_timeout_secs: u64,

    /// Accept self-signed or otherwise invalid TLS certificates (off unless configured)
    pub accept_invalid_certs: bool,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            user_agent: "VLC/3.0.18 LibVLC/3.0.18".to_string(),
            referer: None,
            proxy_timeout_secs: 20,
            accept_invalid_certs: false,
        }
    }
}

impl UpstreamConfig {
    pub fn proxy_timeout(&self) -> Duration {
        Duration::from_secs(self.proxy_timeout_secs)
    }
}

/// Playlist ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaylistConfig {
    /// Client identities tried in order until one gets a success status
    pub user_agents: Vec<String>,

    /// Time allowed per attempt to receive response headers
    pub fetch_timeout_secs: u64,

    /// Longest silence tolerated while reading the body
    pub read_idle_timeout_secs: u64,

    /// Age below which a cached playlist is served without refetching
    pub cache_ttl_secs: u64,

    /// Upper bound on the `limit` query parameter
    pub max_limit: usize,
}

impl Default for PlaylistConfig {
    fn default() -> Self {
        Self {
            user_agents: vec![
                "VLC/3.0.18 LibVLC/3.0.18".to_string(),
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/117 Safari/537.36".to_string(),
                "IPTV/1.0".to_string(),
            ],
            fetch_timeout_secs: 120,
            read_idle_timeout_secs: 60,
            cache_ttl_secs: 60,
            max_limit: 200_000,
        }
    }
}

impl PlaylistConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn read_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.read_idle_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

/// Candidate reachability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Per-candidate probe timeout in milliseconds
    pub probe_timeout_ms: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: 6000,
        }
    }
}

impl ResolverConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

/// Media probe configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Wall-clock limit for the interlace probe
    pub interlace_kill_ms: u64,

    /// Wall-clock limit for the codec probe
    pub codec_kill_ms: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            interlace_kill_ms: 3000,
            codec_kill_ms: 3500,
        }
    }
}

/// Remux session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemuxConfig {
    /// ffmpeg executable, either a path or a name looked up in PATH
    pub ffmpeg_path: String,

    /// Root directory for session and proxy directories
    pub hls_root: PathBuf,

    /// HLS segment duration in seconds
    pub segment_secs: u32,

    /// Number of segments kept in the rolling manifest
    pub list_size: u32,

    /// Exit status that triggers fallback to the next candidate
    pub retry_exit_code: i32,

    /// Delay before removing the directory of a session that ended on its own
    pub cleanup_grace_secs: u64,
}

impl Default for RemuxConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            hls_root: std::env::temp_dir().join("iptv-hls"),
            segment_secs: 3,
            list_size: 6,
            retry_exit_code: 1,
            cleanup_grace_secs: 10,
        }
    }
}

impl RemuxConfig {
    pub fn cleanup_grace(&self) -> Duration {
        Duration::from_secs(self.cleanup_grace_secs)
    }
}

/// Manifest proxy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    /// How long a rewritten proxy manifest is kept on disk
    pub proxy_retention_secs: u64,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            proxy_retention_secs: 300,
        }
    }
}

impl PublishConfig {
    pub fn proxy_retention(&self) -> Duration {
        Duration::from_secs(self.proxy_retention_secs)
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Enable CORS
    pub cors_enabled: bool,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Log format (pretty, json)
    pub log_format: String,

    pub upstream: UpstreamConfig,
    pub playlist: PlaylistConfig,
    pub resolver: ResolverConfig,
    pub probe: ProbeConfig,
    pub remux: RemuxConfig,
    pub publish: PublishConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4137,
            cors_enabled: true,
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            upstream: UpstreamConfig::default(),
            playlist: PlaylistConfig::default(),
            resolver: ResolverConfig::default(),
            probe: ProbeConfig::default(),
            remux: RemuxConfig::default(),
            publish: PublishConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Get the socket address string
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
