use super::{AppConfig, ConfigError};

/// Validate the full application config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_endpoint(config)?;
    validate_stream(config)?;
    validate_log_level(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_endpoint(config: &AppConfig) -> Result<(), ConfigError> {
    let endpoint = &config.endpoint;
    if endpoint.base_url.trim().is_empty() {
        return Err(validation_err("endpoint.base_url cannot be empty"));
    }
    if endpoint.model.trim().is_empty() {
        return Err(validation_err("endpoint.model cannot be empty"));
    }
    if endpoint.request_path.trim().is_empty() {
        return Err(validation_err("endpoint.request_path cannot be empty"));
    }
    endpoint.request_url().map_err(validation_err)?;
    if endpoint.connect_timeout_secs == 0 {
        return Err(validation_err(
            "endpoint.connect_timeout_secs must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_stream(config: &AppConfig) -> Result<(), ConfigError> {
    let stream = &config.stream;
    if stream.max_text_buffer_kib == 0 {
        return Err(validation_err(
            "stream.max_text_buffer_kib must be greater than 0",
        ));
    }
    if stream.channel_capacity == 0 {
        return Err(validation_err(
            "stream.channel_capacity must be greater than 0",
        ));
    }
    Ok(())
}

const VALID_LOG_LEVELS: &[&str] = &[
    "DISABLED", "DEBUG", "INFO", "WARNING", "WARN", "ERROR", "CRITICAL", "TRACE",
];

fn validate_log_level(config: &AppConfig) -> Result<(), ConfigError> {
    let level = config.features.log_level.to_uppercase();
    if !VALID_LOG_LEVELS.contains(&level.as_str()) {
        return Err(validation_err(format!(
            "features.log_level '{}' is not one of {VALID_LOG_LEVELS:?}",
            config.features.log_level
        )));
    }
    Ok(())
}
