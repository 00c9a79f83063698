//! Server configuration.
//!
//! Configuration is layered:
//! - The first existing file of `wisp.toml`, `/etc/wisp/wisp.toml`,
//!   `~/.config/wisp/wisp.toml`
//! - Environment variables (`WISP_*`, nested keys separated by `__`, e.g.
//!   `WISP_SERVER__MAX_ROOMS=100`, `WISP_NAMESPACES=/chat,/news`)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use wisp_core::ServerConfig;

/// Candidate configuration files, in priority order.
const CONFIG_PATHS: [&str; 3] = ["wisp.toml", "/etc/wisp/wisp.toml", "~/.config/wisp/wisp.toml"];

/// Binary configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Transport configuration.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Core server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Namespaces to register in addition to the root.
    #[serde(default)]
    pub namespaces: Vec<String>,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Path for WebSocket endpoint.
    #[serde(default = "default_ws_path")]
    pub websocket_path: String,

    /// Maximum inbound frame size in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,

    /// How often server counters are exported, in milliseconds.
    #[serde(default = "default_export_interval")]
    pub export_interval_ms: u64,
}

// Default value functions
fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_max_message_size() -> usize {
    wisp_protocol::codec::MAX_PACKET_SIZE
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_export_interval() -> u64 {
    5_000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            transport: TransportConfig::default(),
            server: ServerConfig::default(),
            namespaces: Vec::new(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            websocket_path: default_ws_path(),
            max_message_size: default_max_message_size(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
            export_interval_ms: default_export_interval(),
        }
    }
}

impl Config {
    /// Load configuration from the first config file found, overridden by
    /// environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file or variable cannot be parsed.
    pub fn load() -> Result<Self> {
        let file = CONFIG_PATHS
            .iter()
            .map(|path| PathBuf::from(shellexpand::tilde(path).as_ref()))
            .find(|path| path.exists());

        let mut builder = config::Config::builder();
        if let Some(path) = &file {
            tracing::info!("Loading config from {}", path.display());
            builder = builder.add_source(config::File::from(path.as_path()).format(config::FileFormat::Toml));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("WISP")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("namespaces"),
        );

        builder
            .build()
            .context("Failed to load configuration")?
            .try_deserialize()
            .context("Invalid configuration")
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid host:port {}:{}", self.host, self.port))
    }
}
