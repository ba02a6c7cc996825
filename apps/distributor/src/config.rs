//! Distributor configuration management.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/fleetota/distributor.toml`
//! - Windows: `%APPDATA%/fleetota/distributor.toml`

use std::path::{Path, PathBuf};
use std::time::Duration;

use fleetota_data_channel::SessionConfig;
use fleetota_transfer::StreamOptions;
use serde::{Deserialize, Serialize};

/// Distributor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Firmware image published to the fleet.
    #[serde(default = "default_image_path")]
    pub image_path: PathBuf,

    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Node notification endpoints (`host:port`).
    #[serde(default)]
    pub nodes: Vec<String>,

    #[serde(default = "default_notify_timeout")]
    pub notify_timeout_secs: u64,

    /// Per-block read/write deadline in seconds (0 = none).
    #[serde(default = "default_io_timeout")]
    pub io_timeout_secs: u64,

    #[serde(default = "default_block_size")]
    pub block_size: usize,
}

fn default_image_path() -> PathBuf {
    PathBuf::from("firmware_update.bin")
}

fn default_listen_port() -> u16 {
    65432
}

fn default_notify_timeout() -> u64 {
    fleetota_notifier::DEFAULT_NOTIFY_TIMEOUT.as_secs()
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
            image_path: default_image_path(),
            listen_port: default_listen_port(),
            nodes: Vec::new(),
            notify_timeout_secs: default_notify_timeout(),
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
            Ok(toml::from_str(&content)?)
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
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_secs(self.notify_timeout_secs)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            stream: StreamOptions {
                block_size: self.block_size.max(1),
                io_timeout: (self.io_timeout_secs > 0)
                    .then(|| Duration::from_secs(self.io_timeout_secs)),
            },
            ..SessionConfig::default()
        }
    }
}

fn config_path() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata)
            .join("fleetota")
            .join("distributor.toml"))
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home)
            .join(".config")
            .join("fleetota")
            .join("distributor.toml"))
    }
}
