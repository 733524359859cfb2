//! ActionDispatch configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::scheduler::SchedulerConfig;

/// Main ActionDispatch configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error). CLI flag wins over this.
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Storage configuration
    pub storage: StorageConfig,

    /// Scheduling and delivery policy
    pub scheduler: SchedulerConfig,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Call this early in startup to fail fast with clear error messages.
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.max_attempts == 0 {
            return Err(eyre::eyre!("scheduler.max-attempts must be at least 1"));
        }
        if self.scheduler.depth_concurrency == 0 {
            return Err(eyre::eyre!("scheduler.depth-concurrency must be at least 1"));
        }
        if let Some(level) = &self.log_level {
            level
                .parse::<tracing::Level>()
                .map_err(|_| eyre::eyre!("Unknown log-level: {}", level))?;
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .actiondispatch.yml
        let local_config = PathBuf::from(".actiondispatch.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/actiondispatch/actiondispatch.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("actiondispatch").join("actiondispatch.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite file holding actions, workers and dispatch jobs
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        // Use XDG data directory (~/.local/share/actiondispatch on Linux)
        let path = dirs::data_dir()
            .map(|d| d.join("actiondispatch"))
            .unwrap_or_else(|| PathBuf::from(".actiondispatch"))
            .join("store.db")
            .to_string_lossy()
            .into_owned();

        Self { path }
    }
}

impl StorageConfig {
    /// Store path with a leading `~/` expanded
    pub fn expanded_path(&self) -> PathBuf {
        match self.path.strip_prefix("~/") {
            Some(rest) => dirs::home_dir()
                .map(|home| home.join(rest))
                .unwrap_or_else(|| PathBuf::from(&self.path)),
            None => PathBuf::from(&self.path),
        }
    }
}
