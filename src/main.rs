//! IPTV Streaming Gateway
//!
//! Local backend for an IPTV viewer: ingests M3U playlists, proxies upstream
//! streams and drives ffmpeg to remux live and VOD sources into HLS that any
//! standard player can consume.

#![allow(dead_code)]

/// Compile a regex once and reuse it
macro_rules! regex {
    ($re:literal $(,)?) => {{
        static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
        RE.get_or_init(|| regex::Regex::new($re).unwrap())
    }};
}

mod config;
mod config_file;
mod error;
mod hls;
mod http;
mod integration;
mod playlist;
mod probe;
mod remux;
mod resolver;
mod state;
mod upstream;

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::ServerConfig;
use crate::error::{GatewayError, Result};
use crate::http::create_router;
use crate::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
const APP_NAME: &str = "iptv-gateway";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(default_value = "gateway.toml")]
    config: PathBuf,

    /// Host address to bind to
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// ffmpeg executable
    #[arg(long)]
    ffmpeg: Option<String>,

    /// Directory for session output and proxied manifests
    #[arg(long)]
    hls_root: Option<PathBuf>,
}

impl Args {
    fn apply(self, mut config: ServerConfig) -> ServerConfig {
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(ffmpeg) = self.ffmpeg {
            config.remux.ffmpeg_path = ffmpeg;
        }
        if let Some(hls_root) = self.hls_root {
            config.remux.hls_root = hls_root;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let loaded = config_file::load(&args.config);
    let config = args.apply(loaded.as_ref().cloned().unwrap_or_default());

    init_logging(&config.log_level, &config.log_format);
    if let Err(e) = &loaded {
        tracing::warn!("{}. Using defaults.", e);
    }

    tracing::info!("{} v{} starting", APP_NAME, VERSION);
    tracing::info!("Configuration loaded: {:?}", config);

    if probe::locate_tool(&config.remux.ffmpeg_path).is_none() {
        tracing::warn!(
            "ffmpeg not found at {:?}; remux requests will fail",
            config.remux.ffmpeg_path
        );
    }
    tokio::fs::create_dir_all(&config.remux.hls_root).await?;
    tracing::info!("HLS root: {}", config.remux.hls_root.display());

    // Create application state
    let state = Arc::new(AppState::new(config.clone())?);

    // Build router
    let app = create_router(state.clone());

    // Start server
    let addr: SocketAddr = config
        .socket_addr()
        .parse()
        .map_err(|e| GatewayError::Config(format!("invalid listen address: {}", e)))?;
    tracing::info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let stopped = state.reset().await;
    tracing::info!("Shut down, {} sessions stopped", stopped);

    Ok(())
}

/// Initialize logging with tracing
fn init_logging(level: &str, format: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("iptv_gateway={},tower_http=info", level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if format.eq_ignore_ascii_case("json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C"),
        () = terminate => tracing::info!("Received SIGTERM"),
    }
}
