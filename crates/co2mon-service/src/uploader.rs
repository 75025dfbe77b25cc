//! Periodic upload of the latest readings to a cloud data channel.
//!
//! Every reporting cycle the uploader posts one temperature/CO2 pair to
//! `{endpoint}/api/v2/channels/{channel_id}/dataarray`. Cycles where either
//! reading is still missing are skipped. Failed posts are counted; a success
//! resets the count, and reaching the configured threshold ends the uploader
//! with [`UploadError::TooManyFailures`].

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use co2mon_core::{Co2Reading, ReadingStore, TemperatureReading};

use crate::config::UploadConfig;

/// Errors raised while uploading readings.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// The HTTP client could not be built.
    #[error("Failed to create HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// The request did not complete.
    #[error("Error occurred while sending data: {0}")]
    Request(#[from] reqwest::Error),

    /// The channel answered with something other than 200 OK.
    #[error("Failed to send data: response code {status}")]
    Status { status: u16 },

    /// Too many consecutive uploads failed.
    #[error("Giving up after {failures} consecutive upload failures (last: {last})")]
    TooManyFailures { failures: u32, last: String },
}

/// Request body accepted by the channel's `dataarray` endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadPayload<'a> {
    #[serde(rename = "writeKey")]
    pub write_key: &'a str,
    pub data: [UploadRecord; 1],
}

/// One data point: `d1` is the temperature, `d2` the CO2 concentration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadRecord {
    /// Degrees Celsius formatted with two decimals.
    pub d1: String,
    /// Parts per million.
    pub d2: u16,
}

/// Posts readings to a cloud channel on a fixed schedule.
#[derive(Debug, Clone)]
pub struct Uploader {
    client: Client,
    url: String,
    write_key: String,
    interval: Duration,
    error_threshold: u32,
}

impl Uploader {
    /// Create an uploader from its configuration.
    pub fn new(config: &UploadConfig) -> Result<Self, UploadError> {
        let client = Client::builder()
            .connect_timeout(config.timeout())
            .timeout(config.timeout())
            .build()
            .map_err(UploadError::Client)?;

        Ok(Self {
            client,
            url: channel_url(&config.endpoint, config.channel_id),
            write_key: config.write_key.clone(),
            interval: config.reporting_interval(),
            error_threshold: config.error_threshold,
        })
    }

    /// Override the reporting interval.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// The URL readings are posted to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Build the request body for one reading pair.
    pub fn payload(&self, temperature: &TemperatureReading, co2: &Co2Reading) -> UploadPayload<'_> {
        UploadPayload {
            write_key: &self.write_key,
            data: [UploadRecord {
                d1: format!("{:.2}", temperature.value),
                d2: co2.value,
            }],
        }
    }

    /// Post one payload.
    pub async fn send(&self, payload: &UploadPayload<'_>) -> Result<(), UploadError> {
        let response = self.client.post(&self.url).json(payload).send().await?;
        let status = response.status();
        if status == StatusCode::OK {
            Ok(())
        } else {
            Err(UploadError::Status {
                status: status.as_u16(),
            })
        }
    }

    /// Upload every reporting cycle until `cancel` fires or too many
    /// consecutive uploads fail.
    pub async fn run(
        self,
        store: Arc<ReadingStore>,
        cancel: CancellationToken,
    ) -> Result<(), UploadError> {
        info!(
            "Uploading to {} every {:?} (error threshold: {})",
            self.url, self.interval, self.error_threshold
        );
        let mut failures = 0u32;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Uploader stopped");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.interval) => {}
            }

            let (Some(temperature), Some(co2)) = store.snapshot() else {
                debug!("Readings not available yet, skipping upload");
                continue;
            };

            match self.send(&self.payload(&temperature, &co2)).await {
                Ok(()) => {
                    if failures > 0 {
                        info!("Upload recovered after {} failure(s)", failures);
                    }
                    failures = 0;
                    debug!(
                        "Uploaded {:.2} °C, {} ppm",
                        temperature.value, co2.value
                    );
                }
                Err(e) => {
                    failures += 1;
                    warn!(
                        "Upload failed ({}/{}): {}",
                        failures, self.error_threshold, e
                    );
                    if failures >= self.error_threshold {
                        error!("Network error threshold reached, stopping uploader");
                        return Err(UploadError::TooManyFailures {
                            failures,
                            last: e.to_string(),
                        });
                    }
                }
            }
        }
    }
}

fn channel_url(endpoint: &str, channel_id: u64) -> String {
    format!(
        "{}/api/v2/channels/{}/dataarray",
        endpoint.trim_end_matches('/'),
        channel_id
    )
}
