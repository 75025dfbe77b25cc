//! Device access and background acquisition for USB HID CO2 monitors.
//!
//! This crate talks to the common USB CO2 monitor (vendor `0x04d9`,
//! product `0xa052`) over hidapi and keeps the latest CO2 and temperature
//! readings available to any number of reader threads.
//!
//! # Features
//!
//! - **Open + handshake**: [`HidTransport::open`] sends the key feature report
//! - **Poll cycles**: read until one CO2 and one temperature record arrive
//! - **Background monitoring**: [`Co2Monitor`] runs cycles on a dedicated thread
//! - **Latest-value store**: lock-per-slot [`ReadingStore`] for readers
//! - **Diagnostics**: per-packet failures are counted in [`PollMetrics`]
//! - **Mock transport**: [`MockTransport`] for testing without hardware
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use co2mon_core::Co2Monitor;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut monitor = Co2Monitor::open()?;
//!     monitor.start_monitoring(Duration::from_secs(10))?;
//!
//!     std::thread::sleep(Duration::from_secs(15));
//!     if let Some(co2) = monitor.co2() {
//!         println!("CO2: {} ppm", co2.value);
//!     }
//!     if let Some(temp) = monitor.temperature() {
//!         println!("Temperature: {:.2} °C", temp.value);
//!     }
//!
//!     monitor.close();
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod metrics;
pub mod mock;
pub mod monitor;
pub mod poll;
pub mod store;
pub mod transport;

// Re-export the protocol types crate
pub use co2mon_types as types;

// Core exports
pub use error::{Error, Result};
pub use metrics::{LastError, PollMetrics, PollMetricsSnapshot};
pub use mock::{MockProbe, MockResponse, MockTransport, MockTransportBuilder};
pub use monitor::{Co2Monitor, MonitoringHandle};
pub use poll::{
    Attempt, CycleOutcome, DEFAULT_MAX_REQUESTS, FrameErrorPolicy, PollOptions,
    PollOptionsBuilder, poll_cycle, poll_cycle_until, read_attempt, store_record,
};
pub use store::ReadingStore;
pub use transport::{
    DEFAULT_READ_TIMEOUT, FrameSource, HidTransport, KEY_REPORT_LEN, PRODUCT_ID, ReadOutcome,
    VENDOR_ID, send_key,
};
pub use types::{Co2Reading, Reading, TemperatureReading};
