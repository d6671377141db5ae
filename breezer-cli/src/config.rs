//! Configuration file support for breezer.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (BREEZER_*)
//! 3. Local config file (./breezer.toml)
//! 4. Global config file (~/.config/breezer/config.toml)

use breezer::ClientConfig;
use directories::ProjectDirs;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the local configuration file.
pub const LOCAL_CONFIG_FILE: &str = "breezer.toml";

/// Device selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device address (e.g., "FF:22:F3:1E:F3:A6").
    pub address: Option<String>,
    /// Model name ("s3", "s4" or "lite").
    pub model: Option<String>,
}

/// Retry and polling settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts per link operation.
    pub max_tries: Option<u32>,
    /// Pause between attempts, in milliseconds.
    pub retry_delay_ms: Option<u64>,
    /// Wait for one notification poll, in milliseconds.
    pub poll_interval_ms: Option<u64>,
    /// Notification polls before reading directly.
    pub max_polls: Option<u32>,
    /// Pause before the extra connect attempt, in milliseconds.
    pub reconnect_delay_ms: Option<u64>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Device selection.
    #[serde(default)]
    pub device: DeviceConfig,
    /// Retry settings.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Config {
    /// Load configuration from all available sources.
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
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config
        } else {
            warn!(
                "Could not load config from {}, using defaults",
                path.display()
            );
            Self::default()
        }
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
        ProjectDirs::from("", "", "breezer").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one.
    fn merge(&mut self, other: Self) {
        // Device config
        if other.device.address.is_some() {
            self.device.address = other.device.address;
        }
        if other.device.model.is_some() {
            self.device.model = other.device.model;
        }

        // Retry config
        if other.retry.max_tries.is_some() {
            self.retry.max_tries = other.retry.max_tries;
        }
        if other.retry.retry_delay_ms.is_some() {
            self.retry.retry_delay_ms = other.retry.retry_delay_ms;
        }
        if other.retry.poll_interval_ms.is_some() {
            self.retry.poll_interval_ms = other.retry.poll_interval_ms;
        }
        if other.retry.max_polls.is_some() {
            self.retry.max_polls = other.retry.max_polls;
        }
        if other.retry.reconnect_delay_ms.is_some() {
            self.retry.reconnect_delay_ms = other.retry.reconnect_delay_ms;
        }
    }

    /// Build the library client settings, starting from its defaults.
    pub fn client_config(&self) -> ClientConfig {
        let mut client = ClientConfig::default();
        let retry = &self.retry;

        if let Some(max_tries) = retry.max_tries {
            client = client.with_max_tries(max_tries);
        }
        if let Some(delay) = retry.retry_delay_ms {
            client = client.with_retry_delay(Duration::from_millis(delay));
        }
        if retry.poll_interval_ms.is_some() || retry.max_polls.is_some() {
            let interval = retry
                .poll_interval_ms
                .map_or(client.poll_interval, Duration::from_millis);
            let max_polls = retry.max_polls.unwrap_or(client.max_polls);
            client = client.with_polling(interval, max_polls);
        }
        if let Some(delay) = retry.reconnect_delay_ms {
            client = client.with_reconnect_delay(Duration::from_millis(delay));
        }

        client
    }
}
