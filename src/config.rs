use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::AppError;
use crate::validation;

const APP_DIR: &str = "vendorspend";

/// Runtime configuration loaded from `config.toml`. Every section falls back
/// to its defaults when absent.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub forecast: ForecastConfig,
    pub alerts: AlertsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_data_dir().join("vendorspend.db"),
            max_connections: 4,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    pub horizon_months: u32,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self { horizon_months: 24 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    /// Lookahead used by rules that do not carry their own `window_days`.
    pub default_window_days: i64,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            default_window_days: 30,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive; `RUST_LOG` still wins when set.
    pub level: Option<String>,
    /// Directory for daily-rotated JSON logs. Stdout only when unset.
    pub json_dir: Option<PathBuf>,
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR)
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR)
        .join("config.toml")
}

impl AppConfig {
    /// Load from `path`. A missing file yields defaults; a malformed one is an error.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw)
            .map_err(|e| AppError::Config(format!("{}: {e}", path.display())))
    }

    pub fn from_toml(raw: &str) -> Result<Self, AppError> {
        let config: AppConfig =
            toml::from_str(raw).map_err(|e| AppError::Config(e.to_string()))?;
        validation::require_horizon_months("forecast.horizon_months", config.forecast.horizon_months)
            .map_err(|e| AppError::Config(e.to_string()))?;
        if config.alerts.default_window_days < 0 {
            return Err(AppError::Config(
                "alerts.default_window_days cannot be negative".into(),
            ));
        }
        Ok(config)
    }
}
