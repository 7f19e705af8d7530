//! Configuration file support for wandflash.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (WANDFLASH_*)
//! 3. Local config file (./wandflash.toml)
//! 4. Global config file (~/.config/wandflash/config.toml)
//!
//! The first two are resolved by clap; this module handles the files.

use directories::ProjectDirs;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use wandflash::{HandshakeConfig, LinkMode};

use crate::CliError;

/// Local configuration file name.
pub const LOCAL_CONFIG_FILE: &str = "wandflash.toml";

/// Port read timeout when none is configured.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Connection configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Device node (e.g., "/dev/ttyUSB0").
    pub device: Option<String>,
    /// Baud rate.
    pub baud: Option<u32>,
    /// Link selection mode.
    pub mode: Option<LinkMode>,
}

/// Handshake timing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HandshakeSettings {
    /// Deadline for each bootloader banner probe, in milliseconds.
    pub banner_timeout_ms: Option<u64>,
    /// Per-read port timeout, in milliseconds.
    pub read_timeout_ms: Option<u64>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Connection configuration.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Handshake configuration.
    #[serde(default)]
    pub handshake: HandshakeSettings,
}

impl Config {
    /// Load configuration from the global and local files.
    ///
    /// Unreadable or malformed files are skipped with a warning.
    pub fn load() -> Self {
        let mut config = Self::default();

        // Load global config
        if let Some(global_path) = Self::global_config_path() {
            if let Some(global_config) = Self::load_from_file(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global_config);
            }
        }

        // Load local config (overrides global)
        if let Some(local_config) = Self::load_from_file(Path::new(LOCAL_CONFIG_FILE)) {
            debug!("Loaded local config from {LOCAL_CONFIG_FILE}");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    ///
    /// Unlike [`Config::load`], a file named explicitly must exist and parse.
    pub fn load_from_path(path: &Path) -> Result<Self, CliError> {
        let content = fs::read_to_string(path)
            .map_err(|e| CliError::Config(format!("cannot read {}: {e}", path.display())))?;
        let config = toml::from_str(&content)
            .map_err(|e| CliError::Config(format!("cannot parse {}: {e}", path.display())))?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "wandflash").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one.
    fn merge(&mut self, other: Self) {
        if other.connection.device.is_some() {
            self.connection.device = other.connection.device;
        }
        if other.connection.baud.is_some() {
            self.connection.baud = other.connection.baud;
        }
        if other.connection.mode.is_some() {
            self.connection.mode = other.connection.mode;
        }

        if other.handshake.banner_timeout_ms.is_some() {
            self.handshake.banner_timeout_ms = other.handshake.banner_timeout_ms;
        }
        if other.handshake.read_timeout_ms.is_some() {
            self.handshake.read_timeout_ms = other.handshake.read_timeout_ms;
        }
    }

    /// Handshake timing with configured overrides applied.
    pub fn handshake_config(&self) -> HandshakeConfig {
        let mut handshake = HandshakeConfig::default();
        if let Some(ms) = self.handshake.banner_timeout_ms {
            handshake = handshake.with_banner_timeout(Duration::from_millis(ms));
        }
        handshake
    }

    /// Port read timeout.
    pub fn read_timeout(&self) -> Duration {
        self.handshake
            .read_timeout_ms
            .map_or(DEFAULT_READ_TIMEOUT, Duration::from_millis)
    }
}
