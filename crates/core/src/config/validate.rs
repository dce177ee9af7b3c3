use super::{types::Config, ConfigError};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validate configuration
/// Currently validates:
/// - Accrual base URL is set and uses http(s)
/// - Accrual connect timeout is not 0
/// - Reconciler sizes and intervals are usable
/// - Log level is known
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    // Accrual validation
    let base_url = config.accrual.base_url.trim();
    if base_url.is_empty() {
        return Err(ConfigError::ValidationError(
            "accrual.base_url is required".to_string(),
        ));
    }
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::ValidationError(format!(
            "accrual.base_url must be an http(s) URL, got '{}'",
            base_url
        )));
    }
    if config.accrual.connect_timeout_ms == 0 {
        return Err(ConfigError::ValidationError(
            "accrual.connect_timeout_ms cannot be 0".to_string(),
        ));
    }

    // Reconciler validation
    config
        .reconciler
        .validate()
        .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

    // Logging validation
    let level = config.logging.level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        return Err(ConfigError::ValidationError(format!(
            "logging.level must be one of {}, got '{}'",
            LOG_LEVELS.join(", "),
            config.logging.level
        )));
    }

    Ok(())
}
