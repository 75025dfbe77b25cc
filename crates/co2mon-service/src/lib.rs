//! Logger service for USB HID CO2 monitors.
//!
//! This crate provides a service that:
//! - Runs background acquisition on the attached monitor
//! - Serves the latest readings as JSON over HTTP
//! - Optionally uploads readings to a cloud channel on a schedule
//!
//! # HTTP Endpoints
//!
//! - `GET /data` - Latest temperature and CO2 readings (CORS enabled)
//! - `GET /status` - Acquisition metrics and monitoring state
//!
//! # Configuration
//!
//! The service reads configuration from `co2mon.toml` in the working
//! directory, or from the path given on the command line:
//!
//! ```toml
//! [device]
//! monitoring_cycle_seconds = 10
//! max_requests = 50
//! read_timeout_ms = 5000
//! on_frame_error = "skip"   # or "abort-cycle"
//!
//! [server]
//! bind = "127.0.0.1:31906"
//!
//! # Optional; uploading is disabled when absent
//! [upload]
//! channel_id = 1234
//! write_key = "0123456789abcdef"
//! reporting_cycle_seconds = 60
//! ```

pub mod api;
pub mod config;
pub mod state;
pub mod uploader;

pub use config::{Config, ConfigError, DeviceConfig, ServerConfig, UploadConfig, ValidationError};
pub use state::AppState;
pub use uploader::{UploadError, UploadPayload, Uploader};
