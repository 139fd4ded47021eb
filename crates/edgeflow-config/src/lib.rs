pub mod error;

pub use error::*;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Environment variable naming a config file directly
pub const CONFIG_PATH_ENV: &str = "EDGEFLOW_CONFIG_PATH";

const CANDIDATES: [&str; 2] = ["edgeflow.local.yaml", "edgeflow.yaml"];

/// Engine settings. Every field has a default, so a partial file (or no
/// file at all) is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Where `state.json` and the run lock live
    pub state_dir: PathBuf,

    /// Concurrent operations within one wave
    pub max_parallel: usize,

    pub poll_interval_ms: u64,

    /// Polls before an unfinished operation counts as a transient timeout
    pub max_polls: u32,

    pub retry: RetrySettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(".edgeflow"),
            max_parallel: 4,
            poll_interval_ms: 2000,
            max_polls: 900,
            retry: RetrySettings::default(),
        }
    }
}

impl EngineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        let invalid = |reason: &str| ConfigError::Invalid {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };
        if self.max_parallel == 0 {
            return Err(invalid("max_parallel must be at least 1"));
        }
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts must be at least 1"));
        }
        if self.retry.multiplier < 1.0 {
            return Err(invalid("retry.multiplier must be at least 1.0"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Submissions per node, including the first
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
            multiplier: 2.0,
        }
    }
}

impl RetrySettings {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Global configuration directory (`~/.config/edgeflow`)
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("edgeflow");
    Ok(config_dir)
}

/// Locate the engine config file.
///
/// Search order:
/// 1. `EDGEFLOW_CONFIG_PATH`
/// 2. current directory: `edgeflow.local.yaml`, `edgeflow.yaml`
/// 3. `./.edgeflow/config.yaml`
/// 4. `~/.config/edgeflow/config.yaml`
pub fn find_config_file() -> Result<Option<PathBuf>> {
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(Some(path));
        }
        debug!(path = %path.display(), "{CONFIG_PATH_ENV} points to a missing file, ignoring");
    }

    let current_dir = std::env::current_dir()?;
    for filename in CANDIDATES {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(Some(path));
        }
    }

    let local = current_dir.join(".edgeflow").join("config.yaml");
    if local.exists() {
        return Ok(Some(local));
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global = config_dir.join("edgeflow").join("config.yaml");
        if global.exists() {
            return Ok(Some(global));
        }
    }

    Ok(None)
}

/// Parse a config file.
pub fn load_from(path: &Path) -> Result<EngineConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: EngineConfig = if content.trim().is_empty() {
        EngineConfig::default()
    } else {
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?
    };
    config.validate(path)?;
    Ok(config)
}

/// Discover and load the engine config; defaults when no file exists.
pub fn load() -> Result<EngineConfig> {
    match find_config_file()? {
        Some(path) => {
            info!(path = %path.display(), "Loading engine config");
            load_from(&path)
        }
        None => {
            debug!("No engine config found, using defaults");
            Ok(EngineConfig::default())
        }
    }
}
