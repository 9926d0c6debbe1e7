//! Monitor configuration - all remediation tunables as operator-set TOML values
//!
//! Every struct implements `Default` with values from `config::defaults`,
//! so a missing file or a partial file always yields a working config.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use super::defaults;
use super::validation;

/// Root configuration for a procwarden deployment.
///
/// Load with `MonitorConfig::load()` which searches:
/// 1. `$PROCWARDEN_CONFIG` env var
/// 2. `./procwarden.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Poll cadence and circuit-breaker tuning
    #[serde(default)]
    pub monitor: MonitorSection,

    /// Alarm table location
    #[serde(default)]
    pub storage: StorageSection,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            monitor: MonitorSection::default(),
            storage: StorageSection::default(),
        }
    }
}

/// `[monitor]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSection {
    /// Seconds between poll cycles. Bounds: 5-3600.
    pub check_interval_secs: u64,

    /// Consecutive restart failures before a process's circuit opens.
    /// Bounds: 1-10.
    pub max_restart_failures: u32,

    /// Seconds an open circuit blocks attempts before resetting.
    /// Bounds: 30-86400.
    pub circuit_reset_secs: u64,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            check_interval_secs: defaults::CHECK_INTERVAL_SECS,
            max_restart_failures: defaults::MAX_RESTART_FAILURES,
            circuit_reset_secs: defaults::CIRCUIT_RESET_SECS,
        }
    }
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Directory holding the alarm database and lock file.
    pub data_dir: String,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            data_dir: defaults::DATA_DIR.to_string(),
        }
    }
}

/// Fatal configuration errors. Any of these aborts startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Io(PathBuf, std::io::Error),

    #[error("failed to parse config file {0}: {1}")]
    Parse(PathBuf, toml::de::Error),

    #[error("invalid configuration:\n  {}", .0.join("\n  "))]
    OutOfRange(Vec<String>),
}

impl MonitorConfig {
    /// Load configuration using the standard search order:
    /// 1. `$PROCWARDEN_CONFIG` environment variable
    /// 2. `./procwarden.toml` in the current working directory
    /// 3. Built-in defaults
    ///
    /// Unlike a missing file (which falls through to the next source), a
    /// file that is present but malformed or out of range is a hard error:
    /// a daemon restarting under a supervisor must not silently run with
    /// defaults the operator didn't ask for.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = std::env::var("PROCWARDEN_CONFIG") {
            let p = PathBuf::from(&path);
            if p.exists() {
                let config = Self::load_from_file(&p)?;
                info!(path = %p.display(), "Loaded config from PROCWARDEN_CONFIG");
                return Ok(config);
            }
            warn!(path = %path, "PROCWARDEN_CONFIG points to non-existent file, falling back");
        }

        let local = PathBuf::from("procwarden.toml");
        if local.exists() {
            let config = Self::load_from_file(&local)?;
            info!("Loaded config from ./procwarden.toml");
            return Ok(config);
        }

        info!("No procwarden.toml found — using built-in defaults");
        Ok(Self::default())
    }

    /// Load from a specific TOML file path.
    ///
    /// Two-pass: unknown keys are reported as warnings with "did you mean"
    /// suggestions, then serde deserialization and range validation run.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;

        for w in validation::validate_unknown_keys(&contents) {
            warn!("{}", w);
        }

        let config: Self = toml::from_str(&contents)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply range validation; errors are fatal, warnings are logged.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (errors, warnings) = validation::validate_ranges(self);
        for w in &warnings {
            warn!("{}", w);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::OutOfRange(errors))
        }
    }

    /// Poll interval as a `Duration`.
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.monitor.check_interval_secs)
    }

    /// Circuit reset window as a `Duration`.
    pub fn circuit_reset(&self) -> Duration {
        Duration::from_secs(self.monitor.circuit_reset_secs)
    }
}
