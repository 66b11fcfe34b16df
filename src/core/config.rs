//! Runtime configuration.
//!
//! Loaded from an optional `storerate.toml` in the data directory (or an explicit path),
//! with environment overrides applied on top. Every field has a default, so a missing
//! file is not an error.

use crate::core::error::RatingError;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const CONFIG_FILE_NAME: &str = "storerate.toml";
pub const DATA_DIR_ENV: &str = "STORERATE_DATA_DIR";
pub const LOG_ENV: &str = "STORERATE_LOG";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory holding the database and the audit ledger.
    pub data_dir: PathBuf,
    pub db_name: String,
    pub busy_timeout_secs: u32,
    /// Attempts for busy/locked transactions before surfacing `TransactionFailure`.
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub audit_log: bool,
    pub log_filter: String,
    /// Largest tolerated gap between the stored average and a full recompute.
    pub drift_tolerance: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".storerate"),
            db_name: "ratings.db".to_string(),
            busy_timeout_secs: 5,
            max_retries: 5,
            base_delay_ms: 50,
            max_delay_ms: 2_000,
            audit_log: true,
            log_filter: "info".to_string(),
            drift_tolerance: 1e-6,
        }
    }
}

impl Config {
    /// Config rooted at `data_dir` with every other field defaulted.
    pub fn for_data_dir(data_dir: &Path) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
            ..Self::default()
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(&self.db_name)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, RatingError> {
        let config: Config =
            toml::from_str(content).map_err(|e| RatingError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), RatingError> {
        if self.db_name.trim().is_empty() {
            return Err(RatingError::ConfigError("db_name must not be empty".into()));
        }
        if self.drift_tolerance.is_nan() || self.drift_tolerance <= 0.0 {
            return Err(RatingError::ConfigError(format!(
                "drift_tolerance must be positive, got {}",
                self.drift_tolerance
            )));
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(RatingError::ConfigError(format!(
                "base_delay_ms ({}) exceeds max_delay_ms ({})",
                self.base_delay_ms, self.max_delay_ms
            )));
        }
        Ok(())
    }
}

/// Load configuration.
///
/// Resolution order: explicit `config_path`, then `<data_dir>/storerate.toml`, then defaults.
/// `STORERATE_DATA_DIR` and `STORERATE_LOG` override whatever the file says.
pub fn load_config(
    config_path: Option<&Path>,
    data_dir: Option<&Path>,
) -> Result<Config, RatingError> {
    let env_data_dir = env::var(DATA_DIR_ENV).ok().map(PathBuf::from);
    let base_dir = data_dir
        .map(Path::to_path_buf)
        .or_else(|| env_data_dir.clone())
        .unwrap_or_else(|| Config::default().data_dir);

    let candidate = match config_path {
        Some(p) => {
            if !p.exists() {
                return Err(RatingError::ConfigError(format!(
                    "config file not found: {}",
                    p.display()
                )));
            }
            Some(p.to_path_buf())
        }
        None => {
            let p = base_dir.join(CONFIG_FILE_NAME);
            p.exists().then_some(p)
        }
    };

    let mut config = match candidate {
        Some(path) => {
            info!(path = %path.display(), "loading configuration");
            let content = fs::read_to_string(&path)?;
            Config::from_toml_str(&content)?
        }
        None => {
            debug!("no configuration file, using defaults");
            Config::default()
        }
    };

    if let Some(dir) = data_dir {
        config.data_dir = dir.to_path_buf();
    } else if let Some(dir) = env_data_dir {
        config.data_dir = dir;
    } else if config_path.is_none() {
        config.data_dir = base_dir;
    }
    if let Ok(filter) = env::var(LOG_ENV) {
        config.log_filter = filter;
    }

    config.validate()?;
    Ok(config)
}
