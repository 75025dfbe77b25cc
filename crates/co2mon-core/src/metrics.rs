//! Acquisition metrics.
//!
//! Validation failures inside the acquisition thread never reach the caller
//! as errors. They are logged and counted here instead, and the last one is
//! kept so a status endpoint can show what went wrong.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use co2mon_types::FrameError;

/// Thread-safe counters updated by the acquisition loop.
#[derive(Debug, Default)]
pub struct PollMetrics {
    cycles: AtomicU64,
    aborted_cycles: AtomicU64,
    frames: AtomicU64,
    timeouts: AtomicU64,
    short_reads: AtomicU64,
    transport_errors: AtomicU64,
    marker_errors: AtomicU64,
    checksum_errors: AtomicU64,
    unrecognized: AtomicU64,
    temperature_records: AtomicU64,
    co2_records: AtomicU64,
    last_error: Mutex<Option<LastError>>,
}

/// The most recent per-packet failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastError {
    /// Human readable description, including the decrypted bytes for frame errors.
    pub message: String,
    /// When the failure happened.
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
}

impl PollMetrics {
    /// Create new empty metrics.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_cycle(&self, aborted: bool) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        if aborted {
            self.aborted_cycles.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_frame(&self) {
        self.frames.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_short_read(&self) {
        self.short_reads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_transport_error(&self, message: String) {
        self.transport_errors.fetch_add(1, Ordering::Relaxed);
        self.set_last_error(message);
    }

    pub(crate) fn record_frame_error(&self, err: &FrameError) {
        let counter = match err {
            FrameError::MarkerMismatch { .. } => &self.marker_errors,
            FrameError::Checksum { .. } => &self.checksum_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.set_last_error(err.to_string());
    }

    pub(crate) fn record_unrecognized(&self) {
        self.unrecognized.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_temperature(&self) {
        self.temperature_records.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_co2(&self) {
        self.co2_records.fetch_add(1, Ordering::Relaxed);
    }

    fn set_last_error(&self, message: String) {
        *self.last_error.lock() = Some(LastError {
            message,
            at: OffsetDateTime::now_utc(),
        });
    }

    /// Get a snapshot of the current metrics.
    pub fn snapshot(&self) -> PollMetricsSnapshot {
        PollMetricsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            aborted_cycles: self.aborted_cycles.load(Ordering::Relaxed),
            frames: self.frames.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            short_reads: self.short_reads.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
            marker_errors: self.marker_errors.load(Ordering::Relaxed),
            checksum_errors: self.checksum_errors.load(Ordering::Relaxed),
            unrecognized: self.unrecognized.load(Ordering::Relaxed),
            temperature_records: self.temperature_records.load(Ordering::Relaxed),
            co2_records: self.co2_records.load(Ordering::Relaxed),
            last_error: self.last_error.lock().clone(),
        }
    }
}

/// Serializable copy of [`PollMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollMetricsSnapshot {
    /// Completed poll cycles, including aborted ones.
    pub cycles: u64,
    /// Cycles ended early by a frame error.
    pub aborted_cycles: u64,
    /// Complete 8-byte reports received.
    pub frames: u64,
    /// Reads that returned nothing within the timeout.
    pub timeouts: u64,
    /// Reads that returned fewer than 8 bytes.
    pub short_reads: u64,
    /// Reads that failed at the transport.
    pub transport_errors: u64,
    /// Frames rejected for a bad marker byte.
    pub marker_errors: u64,
    /// Frames rejected for a bad checksum.
    pub checksum_errors: u64,
    /// Valid frames with a record code that is not published.
    pub unrecognized: u64,
    /// Temperature records stored.
    pub temperature_records: u64,
    /// CO2 records stored.
    pub co2_records: u64,
    /// Most recent per-packet failure.
    pub last_error: Option<LastError>,
}

impl PollMetricsSnapshot {
    /// Frames rejected by validation.
    pub fn frame_errors(&self) -> u64 {
        self.marker_errors + self.checksum_errors
    }
}
