pub mod validation;

use serde::{Deserialize, Serialize};

use self::validation::validate_config;

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Streaming endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_request_path")]
    pub request_path: String,
    /// Overall request deadline in seconds; 0 disables it.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Watchdog around each body read in seconds; 0 disables it.
    #[serde(default = "default_read_idle_timeout_secs")]
    pub read_idle_timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_request_path() -> String {
    "/responses".to_string()
}
fn default_timeout() -> u64 {
    180
}
fn default_connect_timeout_secs() -> u64 {
    5
}
fn default_read_idle_timeout_secs() -> u64 {
    120
}

impl EndpointConfig {
    /// Join `base_url` and `request_path` into the full request URL.
    ///
    /// # Errors
    ///
    /// Returns a message when the joined URL does not parse or is not
    /// http/https.
    pub fn request_url(&self) -> Result<url::Url, String> {
        let joined = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.request_path.trim_start_matches('/')
        );
        let parsed =
            url::Url::parse(&joined).map_err(|err| format!("invalid endpoint URL '{joined}': {err}"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(format!(
                "endpoint URL '{joined}' must use http or https"
            ));
        }
        Ok(parsed)
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            request_path: default_request_path(),
            timeout: default_timeout(),
            connect_timeout_secs: default_connect_timeout_secs(),
            read_idle_timeout_secs: default_read_idle_timeout_secs(),
        }
    }
}

/// Stream pipeline limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Cap on the logical text buffer, in KiB.
    #[serde(default = "default_max_text_buffer_kib")]
    pub max_text_buffer_kib: usize,
    /// Depth of the emitted-object channel between the session and its caller.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_max_text_buffer_kib() -> usize {
    512
}
fn default_channel_capacity() -> usize {
    64
}

impl StreamConfig {
    #[must_use]
    pub fn max_text_buffer_bytes(&self) -> usize {
        self.max_text_buffer_kib.saturating_mul(1024)
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_text_buffer_kib: default_max_text_buffer_kib(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Feature flags and settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "INFO".to_string()
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub endpoint: EndpointConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
}

/// Load configuration from a YAML file and validate it.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading the file fails, [`ConfigError::Yaml`]
/// when parsing fails, or [`ConfigError::Validation`] when semantic validation fails.
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: AppConfig = serde_yaml::from_str(&contents)?;
    validate_config(&config)?;
    Ok(config)
}
