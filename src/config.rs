//! Configuration for the yield monitor.

use crate::core::TrendParams;
use crate::simulator::SimulatorConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite file holding the event log
    pub database_path: PathBuf,

    /// Directory for CSV reports
    pub export_path: PathBuf,

    /// Ingestion generator settings
    pub simulator: SimulatorConfig,

    /// Defaults for trend queries
    pub trend: TrendParams,

    /// HTTP server settings
    pub server: ServerSettings,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("yield-monitor");

        Self {
            database_path: data_dir.join("factory_data.db"),
            export_path: data_dir.join("exports"),
            simulator: SimulatorConfig::default(),
            trend: TrendParams::default(),
            server: ServerSettings::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, falling back to defaults if it is missing.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to `path`.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("yield-monitor")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.export_path)?;
        if let Some(parent) = self.database_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.trend.window_size == 0 {
            return Err(ConfigError::Invalid("trend.window_size must be positive".into()));
        }
        if self.trend.recent_limit == Some(0) {
            return Err(ConfigError::Invalid("trend.recent_limit must be positive".into()));
        }
        if self.simulator.cadence.is_zero() {
            return Err(ConfigError::Invalid("simulator.cadence must be positive".into()));
        }
        self.simulator
            .model
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("simulator: {e}")))
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Port to bind on 127.0.0.1
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { port: 5000 }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(serde_json::Error),
    #[error("Serialize error: {0}")]
    Serialize(serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.simulator.cadence, Duration::from_secs(1));
        assert_eq!(config.simulator.model.fail_threshold_c, 208.0);
        assert_eq!(config.simulator.bulk_records, 500);
        assert_eq!(config.trend.window_size, 10);
        assert_eq!(config.trend.temp_fallback_c, 200.0);
        assert_eq!(config.server.port, 5000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::default();
        config.trend.window_size = 5;
        config.trend.recent_limit = Some(50);
        config.simulator.cadence = Duration::from_millis(250);
        config.save_to(&path).unwrap();

        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "server": { "port": 8080 } }"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.trend.window_size, 10);

        std::fs::write(
            &path,
            r#"{ "simulator": { "cadence": 250, "fail_threshold_c": 205.0 } }"#,
        )
        .unwrap();
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.simulator.cadence, Duration::from_millis(250));
        assert_eq!(config.simulator.model.fail_threshold_c, 205.0);
        assert_eq!(config.simulator.model.random_fail_rate, 0.05);
        assert_eq!(config.simulator.bulk_records, 500);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = Config::default();
        config.trend.window_size = 0;
        config.save_to(&path).unwrap();
        assert!(matches!(Config::load_from(&path), Err(ConfigError::Invalid(_))));

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(Config::load_from(&path), Err(ConfigError::Parse(_))));
    }
}
