//! Configuration management for the swarm gateway

use crate::error::{GatewayError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Configuration for the gateway
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayConfig {
    /// Host to bind the HTTP listener to (default: 0.0.0.0)
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Port to listen on (default: 8080, env `PORT`)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Base URL of this gateway's web seed endpoint, written into sanitized
    /// manifests as `{webseed_root}/{id}` (env `WEBSEED_ROOT`)
    #[serde(default = "default_webseed_root")]
    pub webseed_root: String,

    /// Trackers handed to the swarm engine when acquiring a new resource
    #[serde(default = "default_trackers")]
    pub trackers: Vec<String>,

    /// Directory holding manifests and content for the local engine (env `DATA_DIR`)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Comment written into sanitized manifests
    #[serde(default = "default_manifest_comment")]
    pub manifest_comment: String,

    /// Read size for local file streams in bytes (default: 64KB)
    /// Valid range: 4KB to 4MB
    #[serde(default = "default_stream_chunk_size")]
    pub stream_chunk_size: usize,

    /// Chunks buffered between the archive pipeline and the socket (default: 8)
    #[serde(default = "default_archive_buffer_chunks")]
    pub archive_buffer_chunks: usize,

    /// Give up on an acquisition after this many seconds (default: wait forever)
    #[serde(default)]
    pub acquisition_timeout_secs: Option<u64>,

    /// Metrics endpoint configuration (optional)
    #[serde(default)]
    pub metrics_endpoint: Option<MetricsEndpointConfig>,
}

/// Configuration for the metrics HTTP endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsEndpointConfig {
    /// Whether to enable the metrics endpoint (default: false)
    #[serde(default)]
    pub enabled: bool,

    /// Address to bind the metrics endpoint to (default: "127.0.0.1:9090")
    #[serde(default = "default_metrics_address")]
    pub address: String,
}

impl Default for MetricsEndpointConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: default_metrics_address(),
        }
    }
}

fn default_listen_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_webseed_root() -> String {
    "http://localhost:8080/webseed".to_string()
}

fn default_trackers() -> Vec<String> {
    [
        "udp://tracker.leechers-paradise.org:6969/announce",
        "udp://tracker.piratepublic.com:1337/announce",
        "udp://tracker.pirateparty.gr:6969/announce",
        "udp://tracker.coppersurfer.tk:6969/announce",
        "udp://tracker.opentrackr.org:1337/announce",
    ]
    .iter()
    .map(|t| t.to_string())
    .collect()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_manifest_comment() -> String {
    "Safe torrent republished by swarm-gateway".to_string()
}

fn default_stream_chunk_size() -> usize {
    64 * 1024
}

fn default_archive_buffer_chunks() -> usize {
    8
}

fn default_metrics_address() -> String {
    "127.0.0.1:9090".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            listen_address: default_listen_address(),
            port: default_port(),
            webseed_root: default_webseed_root(),
            trackers: default_trackers(),
            data_dir: default_data_dir(),
            manifest_comment: default_manifest_comment(),
            stream_chunk_size: default_stream_chunk_size(),
            archive_buffer_chunks: default_archive_buffer_chunks(),
            acquisition_timeout_secs: None,
            metrics_endpoint: None,
        }
    }
}

impl GatewayConfig {
    /// Load configuration from a YAML file, then apply environment overrides
    ///
    /// # Returns
    /// * `Ok(GatewayConfig)` if loading and validation succeed
    /// * `Err(GatewayError)` if the file cannot be read or the config is invalid
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            GatewayError::ConfigError(format!("Failed to read config file: {}", e))
        })?;

        let mut config: GatewayConfig = serde_yaml::from_str(&content).map_err(|e| {
            GatewayError::ConfigError(format!("Failed to parse config file: {}", e))
        })?;

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides
    pub fn from_env() -> Result<Self> {
        let mut config = GatewayConfig::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `PORT`, `WEBSEED_ROOT` and `DATA_DIR` from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    /// Apply overrides from any key lookup; empty values are ignored
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(port) = lookup("PORT") {
            self.port = port.trim().parse().map_err(|e| {
                GatewayError::ConfigError(format!("PORT must be a port number, got {:?}: {}", port, e))
            })?;
        }
        if let Some(root) = lookup("WEBSEED_ROOT") {
            self.webseed_root = root;
        }
        if let Some(dir) = lookup("DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        Ok(())
    }

    /// Validate the configuration
    ///
    /// # Validation Rules
    /// - listen address and port must form a socket address
    /// - webseed_root must be an http(s) URL
    /// - stream_chunk_size must be between 4KB and 4MB
    /// - archive_buffer_chunks must be > 0
    /// - acquisition_timeout_secs, when set, must be > 0
    /// - an enabled metrics endpoint needs a parseable address
    pub fn validate(&self) -> Result<()> {
        const MIN_CHUNK_SIZE: usize = 4 * 1024;
        const MAX_CHUNK_SIZE: usize = 4 * 1024 * 1024;

        self.socket_addr()?;

        if !(self.webseed_root.starts_with("http://") || self.webseed_root.starts_with("https://")) {
            return Err(GatewayError::ConfigError(format!(
                "webseed_root must be an http(s) URL, got {:?}",
                self.webseed_root
            )));
        }

        if self.stream_chunk_size < MIN_CHUNK_SIZE || self.stream_chunk_size > MAX_CHUNK_SIZE {
            return Err(GatewayError::ConfigError(format!(
                "stream_chunk_size must be between {}KB and {}MB, got {} bytes",
                MIN_CHUNK_SIZE / 1024,
                MAX_CHUNK_SIZE / (1024 * 1024),
                self.stream_chunk_size
            )));
        }

        if self.archive_buffer_chunks == 0 {
            return Err(GatewayError::ConfigError(
                "archive_buffer_chunks must be greater than 0".to_string(),
            ));
        }

        if self.acquisition_timeout_secs == Some(0) {
            return Err(GatewayError::ConfigError(
                "acquisition_timeout_secs must be greater than 0 when set".to_string(),
            ));
        }

        if self.trackers.is_empty() {
            warn!("No trackers configured; acquisitions rely on the engine's own discovery");
        }

        if let Some(metrics) = &self.metrics_endpoint {
            if metrics.enabled {
                metrics.address.parse::<SocketAddr>().map_err(|e| {
                    GatewayError::ConfigError(format!(
                        "Invalid metrics endpoint address {:?}: {}",
                        metrics.address, e
                    ))
                })?;
            }
        }

        Ok(())
    }

    /// The address the gateway listens on
    ///
    /// Accepts IPv4 and IPv6 literals, the latter with or without brackets.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let host = self
            .listen_address
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(&self.listen_address);
        let ip = host.parse::<IpAddr>().map_err(|e| {
            GatewayError::ConfigError(format!(
                "Invalid listen address {}: {}",
                self.listen_address, e
            ))
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }
}
