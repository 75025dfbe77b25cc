//! Service configuration.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use co2mon_core::{FrameErrorPolicy, PollOptions};

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "co2mon.toml";

/// Service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Device and acquisition settings.
    pub device: DeviceConfig,
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Cloud upload settings. Uploading is disabled when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload: Option<UploadConfig>,
}

impl Config {
    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Load configuration from [`DEFAULT_CONFIG_PATH`], falling back to the
    /// defaults when the file does not exist.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = Path::new(DEFAULT_CONFIG_PATH);
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Validate the configuration and return every problem found.
    ///
    /// # Example
    ///
    /// ```
    /// use co2mon_service::Config;
    ///
    /// let config = Config::default();
    /// config.validate().expect("Default config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        errors.extend(self.device.validate());
        errors.extend(self.server.validate());
        if let Some(upload) = &self.upload {
            errors.extend(upload.validate());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }
}

/// Device and acquisition settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Seconds between the start of one poll cycle and the next.
    pub monitoring_cycle_seconds: u64,
    /// Maximum reads per poll cycle.
    pub max_requests: u32,
    /// Timeout for a single read in milliseconds.
    pub read_timeout_ms: u64,
    /// What to do when a frame fails validation.
    pub on_frame_error: FrameErrorPolicy,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            monitoring_cycle_seconds: 10,
            max_requests: co2mon_core::DEFAULT_MAX_REQUESTS,
            read_timeout_ms: 5000,
            on_frame_error: FrameErrorPolicy::default(),
        }
    }
}

impl DeviceConfig {
    /// The observation interval.
    pub fn monitoring_interval(&self) -> Duration {
        Duration::from_secs(self.monitoring_cycle_seconds)
    }

    /// Poll options for [`co2mon_core::Co2Monitor`].
    pub fn poll_options(&self) -> PollOptions {
        PollOptions::builder()
            .max_requests(self.max_requests)
            .read_timeout(Duration::from_millis(self.read_timeout_ms))
            .on_frame_error(self.on_frame_error)
            .build()
    }

    /// Validate device configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.monitoring_cycle_seconds == 0 {
            errors.push(ValidationError::new(
                "device.monitoring_cycle_seconds",
                "monitoring cycle must be at least 1 second",
            ));
        }
        if self.max_requests == 0 {
            errors.push(ValidationError::new(
                "device.max_requests",
                "at least one request per cycle is required",
            ));
        }
        if self.read_timeout_ms == 0 {
            errors.push(ValidationError::new(
                "device.read_timeout_ms",
                "read timeout must be greater than 0",
            ));
        }

        errors
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "127.0.0.1:31906").
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:31906".to_string(),
        }
    }
}

impl ServerConfig {
    /// Validate server configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.bind.is_empty() {
            errors.push(ValidationError::new(
                "server.bind",
                "bind address cannot be empty",
            ));
        } else {
            match self.bind.parse::<SocketAddr>() {
                Ok(addr) if addr.port() == 0 => {
                    errors.push(ValidationError::new("server.bind", "port cannot be 0"));
                }
                Ok(_) => {}
                Err(_) => errors.push(ValidationError::new(
                    "server.bind",
                    format!(
                        "invalid bind address '{}': expected format 'ip:port'",
                        self.bind
                    ),
                )),
            }
        }

        errors
    }
}

/// Cloud channel upload settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Channel that receives the data.
    pub channel_id: u64,
    /// Write key of the channel.
    pub write_key: String,
    /// Seconds between uploads.
    #[serde(default = "default_reporting_cycle")]
    pub reporting_cycle_seconds: u64,
    /// Base URL of the channel API.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Consecutive failures after which the service gives up.
    #[serde(default = "default_error_threshold")]
    pub error_threshold: u32,
    /// Connect and request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

fn default_reporting_cycle() -> u64 {
    60
}

fn default_endpoint() -> String {
    "http://ambidata.io".to_string()
}

fn default_error_threshold() -> u32 {
    10
}

fn default_timeout() -> u64 {
    5
}

impl UploadConfig {
    /// Create an upload configuration with default timing.
    pub fn new(channel_id: u64, write_key: impl Into<String>) -> Self {
        Self {
            channel_id,
            write_key: write_key.into(),
            reporting_cycle_seconds: default_reporting_cycle(),
            endpoint: default_endpoint(),
            error_threshold: default_error_threshold(),
            timeout_seconds: default_timeout(),
        }
    }

    /// The reporting interval.
    pub fn reporting_interval(&self) -> Duration {
        Duration::from_secs(self.reporting_cycle_seconds)
    }

    /// The connect and request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Validate upload configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.write_key.trim().is_empty() {
            errors.push(ValidationError::new(
                "upload.write_key",
                "write key cannot be empty",
            ));
        }
        if self.reporting_cycle_seconds == 0 {
            errors.push(ValidationError::new(
                "upload.reporting_cycle_seconds",
                "reporting cycle must be at least 1 second",
            ));
        }
        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            errors.push(ValidationError::new(
                "upload.endpoint",
                format!(
                    "endpoint must start with http:// or https://, got '{}'",
                    self.endpoint
                ),
            ));
        }
        if self.error_threshold == 0 {
            errors.push(ValidationError::new(
                "upload.error_threshold",
                "error threshold must be at least 1",
            ));
        }
        if self.timeout_seconds == 0 {
            errors.push(ValidationError::new(
                "upload.timeout_seconds",
                "timeout must be greater than 0",
            ));
        }

        errors
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `server.bind` or `upload.write_key`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}
