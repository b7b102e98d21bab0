//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides,
//! in a two-step load-then-override shape.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to bind the HTTP/WebSocket server to.
    /// Override: `SYNCJAM_BIND_PORT`
    pub bind_port: u16,

    /// Host/interface to bind to.
    /// Override: `SYNCJAM_BIND_HOST`
    pub bind_host: String,

    /// Capacity of the broadcast channel fanning events out to clients.
    pub broadcast_capacity: usize,

    /// TTL, in hours, for the in-memory room snapshot.
    /// Override: `SYNCJAM_SNAPSHOT_TTL_HOURS`
    pub snapshot_ttl_hours: u64,

    /// Base URL the resolver builds playable track URLs from, if the
    /// deployment wires up a resolver backed by a reachable catalog host.
    /// Override: `SYNCJAM_CATALOG_BASE_URL`
    pub catalog_base_url: Option<String>,

    /// Directory for the periodic snapshot-persistence task, if enabled.
    /// Override: `SYNCJAM_DATA_DIR`
    pub data_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_port: 7890,
            bind_host: "0.0.0.0".to_string(),
            broadcast_capacity: 256,
            snapshot_ttl_hours: 24,
            catalog_base_url: None,
            data_dir: None,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("SYNCJAM_BIND_PORT") {
            if let Ok(port) = val.parse() {
                self.bind_port = port;
            }
        }

        if let Ok(val) = std::env::var("SYNCJAM_BIND_HOST") {
            self.bind_host = val;
        }

        if let Ok(val) = std::env::var("SYNCJAM_SNAPSHOT_TTL_HOURS") {
            if let Ok(hours) = val.parse() {
                self.snapshot_ttl_hours = hours;
            }
        }

        if let Ok(val) = std::env::var("SYNCJAM_CATALOG_BASE_URL") {
            self.catalog_base_url = Some(val);
        }

        // Note: SYNCJAM_DATA_DIR is handled by clap via #[arg(env =...)] in main.rs
    }

    /// Resolves the socket address the server should bind to.
    pub fn bind_addr(&self) -> Result<std::net::SocketAddr> {
        format!("{}:{}", self.bind_host, self.bind_port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.bind_host, self.bind_port))
    }

    /// TTL for the in-memory snapshot store, as a `Duration`.
    pub fn snapshot_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.snapshot_ttl_hours * 60 * 60)
    }
}
