//! Configuration management for bluecarbon.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::sync::SyncSettings;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "bluecarbon";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "records.db";

/// Environment variable prefix. Nested keys are separated by `__`,
/// e.g. `BLUECARBON_SYNC__PUSH_TIMEOUT_SECS`.
const ENV_PREFIX: &str = "BLUECARBON_";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `BLUECARBON_`)
/// 2. TOML config file at `~/.config/bluecarbon/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Sync configuration.
    pub sync: SyncConfig,
    /// Remote authority and reachability configuration.
    pub remote: RemoteConfig,
}

/// Storage-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/bluecarbon/records.db`
    pub database_path: Option<PathBuf>,
}

/// Sync-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Seconds before an unanswered push counts as failed.
    pub push_timeout_secs: u64,
    /// Push new records immediately when online.
    pub push_on_create: bool,
    /// Stay offline until connectivity has actually been observed.
    pub require_initial_observation: bool,
}

/// Remote authority and reachability configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Acknowledgement delay of the simulated remote, in milliseconds.
    pub simulated_latency_ms: u64,
    /// Host used for reachability probes.
    pub probe_host: String,
    /// Port used for reachability probes.
    pub probe_port: u16,
    /// Probe connect timeout in milliseconds.
    pub probe_timeout_ms: u64,
    /// Interval between probes in seconds.
    pub probe_interval_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            push_timeout_secs: 15,
            push_on_create: true,
            require_initial_observation: false, // Optimistic until observed
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            simulated_latency_ms: 1_000,
            probe_host: "1.1.1.1".to_string(),
            probe_port: 443,
            probe_timeout_ms: 3_000,
            probe_interval_secs: 30,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Configuration is loaded in this order (later sources override earlier):
    /// 1. Default values
    /// 2. TOML config file (if exists)
    /// 3. Environment variables (prefixed with `BLUECARBON_`)
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file).nested())
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.sync.push_timeout_secs == 0 {
            return Err(Error::ConfigValidation {
                message: "push_timeout_secs must be greater than 0".to_string(),
            });
        }

        if self.remote.probe_interval_secs == 0 {
            return Err(Error::ConfigValidation {
                message: "probe_interval_secs must be greater than 0".to_string(),
            });
        }

        if self.remote.probe_timeout_ms == 0 {
            return Err(Error::ConfigValidation {
                message: "probe_timeout_ms must be greater than 0".to_string(),
            });
        }

        if self.remote.probe_host.trim().is_empty() {
            return Err(Error::ConfigValidation {
                message: "probe_host must not be empty".to_string(),
            });
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Settings for the sync coordinator.
    #[must_use]
    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            push_timeout: Duration::from_secs(self.sync.push_timeout_secs),
            push_on_create: self.sync.push_on_create,
            require_initial_observation: self.sync.require_initial_observation,
        }
    }

    /// Latency of the simulated remote authority.
    #[must_use]
    pub fn simulated_latency(&self) -> Duration {
        Duration::from_millis(self.remote.simulated_latency_ms)
    }

    /// `host:port` probed for reachability.
    #[must_use]
    pub fn probe_address(&self) -> String {
        format!("{}:{}", self.remote.probe_host, self.remote.probe_port)
    }

    /// Reachability probe connect timeout.
    #[must_use]
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.remote.probe_timeout_ms)
    }

    /// Interval between reachability probes.
    #[must_use]
    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.remote.probe_interval_secs)
    }
}
