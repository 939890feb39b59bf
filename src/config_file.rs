//! Configuration file support
//!
//! Loads gateway configuration from TOML files. Every section is optional;
//! anything left out keeps its default.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::{
    ProbeConfig, PlaylistConfig, PublishConfig, RemuxConfig, ResolverConfig, ServerConfig,
    UpstreamConfig,
};
use crate::error::{GatewayError, Result};

/// Configuration file format
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Server settings
    pub server: Option<ServerSettings>,
    /// Logging settings
    pub logging: Option<LoggingSettings>,
    pub upstream: Option<UpstreamConfig>,
    pub playlist: Option<PlaylistConfig>,
    pub resolver: Option<ResolverConfig>,
    pub probe: Option<ProbeConfig>,
    pub remux: Option<RemuxConfig>,
    pub publish: Option<PublishConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Host address to bind to
    pub host: Option<String>,
    /// Port to listen on
    pub port: Option<u16>,
    /// Enable CORS
    pub cors_enabled: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: Option<String>,
}

impl ConfigFile {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(
        path: P,
    ) -> std::result::Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: ConfigFile = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(
        &self,
        path: P,
    ) -> std::result::Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Generate a configuration file spelling out every default
    pub fn default_config() -> Self {
        let defaults = ServerConfig::default();
        Self {
            server: Some(ServerSettings {
                host: Some(defaults.host),
                port: Some(defaults.port),
                cors_enabled: Some(defaults.cors_enabled),
            }),
            logging: Some(LoggingSettings {
                level: defaults.log_level,
                format: Some(defaults.log_format),
            }),
            upstream: Some(defaults.upstream),
            playlist: Some(defaults.playlist),
            resolver: Some(defaults.resolver),
            probe: Some(defaults.probe),
            remux: Some(defaults.remux),
            publish: Some(defaults.publish),
        }
    }

    /// Convert to ServerConfig
    pub fn into_server_config(self) -> ServerConfig {
        let mut config = ServerConfig::default();

        if let Some(server) = self.server {
            if let Some(host) = server.host {
                config.host = host;
            }
            if let Some(port) = server.port {
                config.port = port;
            }
            if let Some(cors) = server.cors_enabled {
                config.cors_enabled = cors;
            }
        }
        if let Some(logging) = self.logging {
            config.log_level = logging.level;
            if let Some(format) = logging.format {
                config.log_format = format;
            }
        }

        config.upstream = self.upstream.unwrap_or(config.upstream);
        config.playlist = self.playlist.unwrap_or(config.playlist);
        config.resolver = self.resolver.unwrap_or(config.resolver);
        config.probe = self.probe.unwrap_or(config.probe);
        config.remux = self.remux.unwrap_or(config.remux);
        config.publish = self.publish.unwrap_or(config.publish);
        config
    }
}

/// Load the configuration at `path`. A missing file yields the defaults; an
/// unreadable or invalid one is an error the caller reports once logging is up.
pub fn load<P: AsRef<Path>>(path: P) -> Result<ServerConfig> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(ServerConfig::default());
    }
    ConfigFile::from_file(path)
        .map(ConfigFile::into_server_config)
        .map_err(|e| GatewayError::Config(format!("{}: {}", path.display(), e)))
}
