//! Node configuration management.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/fleetota/node.toml`
//! - Windows: `%APPDATA%/fleetota/node.toml`
//!
//! A different file can be given with `--config <path>`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use fleetota_data_channel::SessionConfig;
use fleetota_transfer::StreamOptions;
use serde::{Deserialize, Serialize};

/// Node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Display name used in logs (hostname by default).
    #[serde(default = "default_name")]
    pub name: String,

    /// Local firmware image; partial downloads resume from its length.
    #[serde(default = "default_image_path")]
    pub image_path: PathBuf,

    /// Distributor transfer endpoint (`host:port`).
    #[serde(default = "default_distributor")]
    pub distributor: String,

    /// Port to receive update notifications on.
    #[serde(default = "default_notify_port")]
    pub notify_port: u16,

    /// Port to serve the image to peers on.
    #[serde(default = "default_peer_port")]
    pub peer_port: u16,

    /// Peer transfer endpoints tried, in order, after the distributor.
    #[serde(default)]
    pub peers: Vec<String>,

    /// Serve the local image to peers even if it was never verified.
    #[serde(default)]
    pub serve_unverified: bool,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Per-block read/write deadline in seconds (0 = none).
    #[serde(default = "default_io_timeout")]
    pub io_timeout_secs: u64,

    #[serde(default = "default_block_size")]
    pub block_size: usize,
}

fn default_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "fleetota-node".into())
}

fn default_image_path() -> PathBuf {
    PathBuf::from("car_firmware.bin")
}

fn default_distributor() -> String {
    "192.168.1.1:65432".into()
}

fn default_notify_port() -> u16 {
    65433
}

fn default_peer_port() -> u16 {
    65434
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_io_timeout() -> u64 {
    30
}

fn default_block_size() -> usize {
    fleetota_transfer::DEFAULT_BLOCK_SIZE
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: default_name(),
            image_path: default_image_path(),
            distributor: default_distributor(),
            notify_port: default_notify_port(),
            peer_port: default_peer_port(),
            peers: Vec::new(),
            serve_unverified: false,
            connect_timeout_secs: default_connect_timeout(),
            io_timeout_secs: default_io_timeout(),
            block_size: default_block_size(),
        }
    }
}

impl Config {
    /// Loads configuration from `path` (or the platform default), writing a
    /// default file first if none exists.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => config_path()?,
        };

        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save(&path)?;
            Ok(config)
        }
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            stream: StreamOptions {
                block_size: self.block_size.max(1),
                io_timeout: (self.io_timeout_secs > 0)
                    .then(|| Duration::from_secs(self.io_timeout_secs)),
            },
        }
    }
}

/// Returns the platform-specific configuration file path.
fn config_path() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata).join("fleetota").join("node.toml"))
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home)
            .join(".config")
            .join("fleetota")
            .join("node.toml"))
    }
}
