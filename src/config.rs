//! Controller settings.
//!
//! Defaults are embedded from `config/dashboard.toml`; a user file under the
//! platform config directory overrides them, and `SYRIAS_DASH_URL` overrides
//! the server address.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::error::DashError;

const DEFAULT_CONFIG: &str = include_str!("../config/dashboard.toml");

/// Environment variable overriding `base_url`.
pub const URL_ENV: &str = "SYRIAS_DASH_URL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashConfig {
    /// Server root, e.g. `http://127.0.0.1:5000`. API paths are joined under `/api/`.
    pub base_url: String,
    pub request_timeout_secs: u64,
    /// Fraction of observations proposed as training set after an upload.
    pub default_train_ratio: f64,
    pub max_smoothing_window: u32,
    pub max_differencing_order: u32,
    pub min_password_len: usize,
    pub log_filter: String,
}

impl Default for DashConfig {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG).expect("embedded dashboard.toml must be valid TOML")
    }
}

impl DashConfig {
    /// Check the settings the controller relies on.
    pub fn validate(&self) -> Result<(), DashError> {
        let url = Url::parse(&self.base_url).map_err(|e| {
            DashError::Config(format!("Invalid base_url '{}': {}", self.base_url, e))
        })?;
        if url.cannot_be_a_base() {
            return Err(DashError::Config(format!(
                "base_url '{}' cannot be used as a base",
                self.base_url
            )));
        }
        if !(self.default_train_ratio > 0.0 && self.default_train_ratio < 1.0) {
            return Err(DashError::Config(format!(
                "default_train_ratio must be between 0 and 1, got {}",
                self.default_train_ratio
            )));
        }
        if self.max_smoothing_window == 0 {
            return Err(DashError::Config("max_smoothing_window must be at least 1".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(DashError::Config("request_timeout_secs must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Server root with a trailing slash so relative joins keep the path.
    pub fn base(&self) -> Result<Url, DashError> {
        let mut raw = self.base_url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        Url::parse(&raw)
            .map_err(|e| DashError::Config(format!("Invalid base_url '{}': {}", raw, e)))
    }

    pub fn apply_env(mut self) -> Self {
        if let Ok(url) = std::env::var(URL_ENV) {
            if !url.trim().is_empty() {
                debug!("Using {} from environment: {}", URL_ENV, url);
                self.base_url = url.trim().to_string();
            }
        }
        self
    }
}

/// Load settings from a TOML file. Missing keys fall back to the embedded defaults.
pub fn load_config(path: &Path) -> Result<DashConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {:?}", path))?;
    parse_config(&content).with_context(|| format!("Invalid config file {:?}", path))
}

/// Parse a TOML document layered over the embedded defaults.
pub fn parse_config(content: &str) -> Result<DashConfig> {
    let mut merged: toml::Table = toml::from_str(DEFAULT_CONFIG)?;
    let user: toml::Table = toml::from_str(content)?;
    for (key, value) in user {
        merged.insert(key, value);
    }
    let config: DashConfig = toml::Value::Table(merged).try_into()?;
    config.validate()?;
    Ok(config)
}

/// `<config dir>/syrias-dash/config.toml`, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("syrias-dash").join("config.toml"))
}

/// Load the user config if present, otherwise the embedded defaults, then
/// apply environment overrides.
pub fn load_default_location() -> Result<DashConfig> {
    let config = match default_config_path().filter(|p| p.exists()) {
        Some(path) => {
            info!("Loading config from {:?}", path);
            load_config(&path)?
        }
        None => DashConfig::default(),
    };
    let config = config.apply_env();
    config.validate()?;
    Ok(config)
}
