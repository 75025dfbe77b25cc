//! Poll cycles: read, decode, classify, store.
//!
//! A poll cycle issues up to [`PollOptions::max_requests`] sequential reads
//! and stops early once it has stored one temperature and one CO2 record.
//! Timeouts, short reads and transport errors count as "no record this
//! attempt". Frame validation failures are logged and counted, and then
//! handled according to [`FrameErrorPolicy`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use co2mon_types::{Reading, Record, RecordType, classify_validated};

use crate::error::{Error, Result};
use crate::metrics::PollMetrics;
use crate::store::ReadingStore;
use crate::transport::{DEFAULT_READ_TIMEOUT, FrameSource, ReadOutcome};

/// Default number of reads per poll cycle.
pub const DEFAULT_MAX_REQUESTS: u32 = 50;

/// What to do with the rest of a cycle after a frame fails validation.
///
/// Either way the readings already stored earlier in the cycle are kept and
/// monitoring continues with the next cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FrameErrorPolicy {
    /// Drop the offending frame and keep reading.
    #[default]
    #[serde(rename = "skip")]
    SkipFrame,
    /// End the current cycle immediately.
    #[serde(rename = "abort-cycle")]
    AbortCycle,
}

/// Options for poll cycles.
///
/// ```
/// use std::time::Duration;
/// use co2mon_core::{FrameErrorPolicy, PollOptions};
///
/// let options = PollOptions::builder()
///     .max_requests(20)
///     .read_timeout(Duration::from_secs(2))
///     .on_frame_error(FrameErrorPolicy::AbortCycle)
///     .build();
/// assert!(options.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOptions {
    /// Maximum reads per cycle. Default: 50.
    pub max_requests: u32,
    /// Timeout for each read. Default: 5 seconds.
    pub read_timeout: Duration,
    /// Handling of frames that fail validation. Default: skip the frame.
    pub on_frame_error: FrameErrorPolicy,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_MAX_REQUESTS,
            read_timeout: DEFAULT_READ_TIMEOUT,
            on_frame_error: FrameErrorPolicy::default(),
        }
    }
}

impl PollOptions {
    /// Create a new builder for PollOptions.
    pub fn builder() -> PollOptionsBuilder {
        PollOptionsBuilder::default()
    }

    /// Validate the options and return an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.max_requests == 0 {
            return Err(Error::invalid_config("max_requests must be > 0"));
        }
        if self.read_timeout.is_zero() {
            return Err(Error::invalid_config("read_timeout must be > 0"));
        }
        Ok(())
    }
}

/// Builder for PollOptions.
#[derive(Debug, Clone, Default)]
pub struct PollOptionsBuilder {
    options: PollOptions,
}

impl PollOptionsBuilder {
    /// Set the maximum number of reads per cycle.
    #[must_use]
    pub fn max_requests(mut self, max_requests: u32) -> Self {
        self.options.max_requests = max_requests;
        self
    }

    /// Set the per-read timeout.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.options.read_timeout = timeout;
        self
    }

    /// Set the frame error policy.
    #[must_use]
    pub fn on_frame_error(mut self, policy: FrameErrorPolicy) -> Self {
        self.options.on_frame_error = policy;
        self
    }

    /// Build the PollOptions.
    #[must_use]
    pub fn build(self) -> PollOptions {
        self.options
    }
}

/// Result of a single read attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Attempt {
    /// A frame that decrypted and validated.
    Record(Record),
    /// Nothing arrived within the timeout.
    Timeout,
    /// A truncated report of the given length.
    Short(usize),
}

/// Read one report, decrypt it and classify it.
///
/// Validation failures are returned as [`Error::Frame`].
pub fn read_attempt<S: FrameSource + ?Sized>(source: &mut S, timeout: Duration) -> Result<Attempt> {
    match source.read_frame(timeout)? {
        ReadOutcome::Frame(raw) => {
            let decrypted = raw.decrypt();
            trace!("raw: {} dec: {}", raw, decrypted);
            Ok(Attempt::Record(classify_validated(&decrypted)?))
        }
        ReadOutcome::Timeout => Ok(Attempt::Timeout),
        ReadOutcome::Short(len) => Ok(Attempt::Short(len)),
    }
}

/// Stamp a record with the current time and put it in the store.
///
/// Returns the stored record type, or `None` for unrecognized records,
/// which leave the store untouched.
pub fn store_record(store: &ReadingStore, record: &Record) -> Option<RecordType> {
    match *record {
        Record::Temperature(celsius) => {
            debug!("Temperature: {:.2} °C", celsius);
            store.set_temperature(Reading::now(celsius));
        }
        Record::Co2(ppm) => {
            debug!("CO2: {} ppm", ppm);
            store.set_co2(Reading::now(ppm));
        }
        Record::Unrecognized(code) => {
            trace!("Ignoring record type {:#04x}", code);
        }
    }
    record.record_type()
}

/// Summary of one poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleOutcome {
    /// Reads issued.
    pub attempts: u32,
    /// A temperature record was stored.
    pub got_temperature: bool,
    /// A CO2 record was stored.
    pub got_co2: bool,
    /// A frame error ended the cycle early.
    pub aborted: bool,
    /// A stop request ended the cycle early.
    pub cancelled: bool,
}

impl CycleOutcome {
    /// Both quantities were refreshed.
    pub fn is_complete(&self) -> bool {
        self.got_temperature && self.got_co2
    }
}

/// Run one poll cycle against `source`.
///
/// Never fails: every per-attempt problem is logged, counted in `metrics`,
/// and reflected in the returned outcome.
pub fn poll_cycle<S: FrameSource + ?Sized>(
    source: &mut S,
    store: &ReadingStore,
    metrics: &PollMetrics,
    options: &PollOptions,
) -> CycleOutcome {
    poll_cycle_until(source, store, metrics, options, || false)
}

/// Like [`poll_cycle`], but checks `stop` before every read and ends the
/// cycle as soon as it returns `true`. A read already in progress always
/// runs to completion or timeout.
pub fn poll_cycle_until<S, F>(
    source: &mut S,
    store: &ReadingStore,
    metrics: &PollMetrics,
    options: &PollOptions,
    stop: F,
) -> CycleOutcome
where
    S: FrameSource + ?Sized,
    F: Fn() -> bool,
{
    let mut outcome = CycleOutcome::default();

    while outcome.attempts < options.max_requests && !outcome.is_complete() {
        if stop() {
            outcome.cancelled = true;
            break;
        }
        outcome.attempts += 1;

        match read_attempt(source, options.read_timeout) {
            Ok(Attempt::Record(record)) => {
                metrics.record_frame();
                match store_record(store, &record) {
                    Some(RecordType::Temperature) => {
                        metrics.record_temperature();
                        outcome.got_temperature = true;
                    }
                    Some(RecordType::Co2) => {
                        metrics.record_co2();
                        outcome.got_co2 = true;
                    }
                    None => metrics.record_unrecognized(),
                }
            }
            Ok(Attempt::Timeout) => {
                metrics.record_timeout();
                trace!("Read timed out after {:?}", options.read_timeout);
            }
            Ok(Attempt::Short(len)) => {
                metrics.record_short_read();
                debug!("Short read: {} of 8 bytes", len);
            }
            Err(Error::Frame(err)) => {
                metrics.record_frame();
                metrics.record_frame_error(&err);
                warn!("Rejected frame: {}", err);
                if options.on_frame_error == FrameErrorPolicy::AbortCycle {
                    outcome.aborted = true;
                    break;
                }
            }
            Err(err) => {
                warn!("Read failed (attempt {}): {}", outcome.attempts, err);
                metrics.record_transport_error(err.to_string());
            }
        }
    }

    metrics.record_cycle(outcome.aborted);
    debug!(
        "Poll cycle finished after {} read(s): temperature={}, co2={}, aborted={}",
        outcome.attempts, outcome.got_temperature, outcome.got_co2, outcome.aborted
    );
    outcome
}
