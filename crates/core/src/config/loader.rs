use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Prefix for environment overrides, e.g. `GOPHERMART_RECONCILER__WORKER_COUNT=5`.
const ENV_PREFIX: &str = "GOPHERMART_";

/// Load configuration from file with environment variable overrides
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    extract(Figment::new().merge(Toml::file(path)))
}

/// Load configuration from environment variables only
pub fn load_config_from_env() -> Result<Config, ConfigError> {
    extract(Figment::new())
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

fn extract(figment: Figment) -> Result<Config, ConfigError> {
    figment
        .merge(legacy_env())
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Unprefixed variables used by existing deployments.
fn legacy_env() -> Env {
    Env::raw()
        .only(&["ACCRUAL_SYSTEM_ADDRESS", "DATABASE_URI"])
        .map(|key| {
            if key.as_str().eq_ignore_ascii_case("ACCRUAL_SYSTEM_ADDRESS") {
                "accrual.base_url".into()
            } else {
                "database.path".into()
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_str_valid() {
        let toml = r#"
[accrual]
base_url = "http://localhost:8081"

[reconciler]
worker_count = 5
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.accrual.base_url, "http://localhost:8081");
        assert_eq!(config.reconciler.worker_count, 5);
        assert_eq!(config.reconciler.job_queue_capacity, 10);
    }

    #[test]
    fn test_load_config_from_str_invalid() {
        let toml = r#"
[reconciler]
worker_count = "three"
"#;
        let result = load_config_from_str(toml);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[accrual]
base_url = "http://accrual:8080"

[database]
path = "/var/lib/gophermart/orders.db"

[logging]
level = "debug"
format = "json"
"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.accrual.base_url, "http://accrual:8080");
        assert_eq!(
            config.database.path.to_str(),
            Some("/var/lib/gophermart/orders.db")
        );
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, super::super::LogFormat::Json);
    }

    #[test]
    fn test_env_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "gophermart.toml",
                r#"
[accrual]
base_url = "http://from-file:8080"

[reconciler]
worker_count = 2
"#,
            )?;
            jail.set_env("GOPHERMART_RECONCILER__WORKER_COUNT", "7");
            jail.set_env("DATABASE_URI", "/tmp/legacy.db");
            jail.set_env("GOPHERMART_DATABASE__HEALTH_CHECK_INTERVAL_SECS", "30");

            let config = load_config(Path::new("gophermart.toml")).map_err(|e| e.to_string())?;
            assert_eq!(config.accrual.base_url, "http://from-file:8080");
            assert_eq!(config.reconciler.worker_count, 7);
            assert_eq!(config.database.path.to_str(), Some("/tmp/legacy.db"));
            assert_eq!(config.database.health_check_interval_secs, 30);
            Ok(())
        });
    }

    #[test]
    fn test_load_config_from_env_legacy_address() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("ACCRUAL_SYSTEM_ADDRESS", "http://legacy:8081");

            let config = load_config_from_env().map_err(|e| e.to_string())?;
            assert_eq!(config.accrual.base_url, "http://legacy:8081");
            assert_eq!(config.reconciler.poll_interval_ms, 1000);
            Ok(())
        });
    }
}
