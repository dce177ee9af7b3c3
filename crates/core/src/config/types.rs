use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::accrual::AccrualConfig;
use crate::reconciler::ReconcilerConfig;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub accrual: AccrualConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    /// Seconds between store health checks; 0 disables them.
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval_secs: u64,
}

impl DatabaseConfig {
    pub fn health_check_interval(&self) -> Option<Duration> {
        (self.health_check_interval_secs > 0)
            .then(|| Duration::from_secs(self.health_check_interval_secs))
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            health_check_interval_secs: default_health_check_interval(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("gophermart.db")
}

fn default_health_check_interval() -> u64 {
    10
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Minimum level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.database.path, PathBuf::from("gophermart.db"));
        assert_eq!(
            config.database.health_check_interval(),
            Some(Duration::from_secs(10))
        );
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(config.accrual.base_url.is_empty());
        assert_eq!(config.accrual.fallback_retry_after_secs, 60);
        assert_eq!(config.reconciler.worker_count, 3);
    }

    #[test]
    fn test_health_check_can_be_disabled() {
        let database: DatabaseConfig = toml::from_str("health_check_interval_secs = 0").unwrap();
        assert_eq!(database.path, PathBuf::from("gophermart.db"));
        assert!(database.health_check_interval().is_none());
    }

    #[test]
    fn test_log_format_deserialize() {
        let logging: LoggingConfig = toml::from_str(r#"format = "json""#).unwrap();
        assert_eq!(logging.format, LogFormat::Json);
        assert_eq!(logging.level, "info");
    }
}
