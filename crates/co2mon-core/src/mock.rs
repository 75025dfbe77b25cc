//! Mock transport for testing.
//!
//! [`MockTransport`] implements [`FrameSource`] by replaying a script of
//! responses, so the acquisition loop can be tested without hardware.
//!
//! # Features
//!
//! - **Scripted traffic**: encrypted frames, timeouts, short reads, failures
//! - **Repeat mode**: cycle through the script forever
//! - **Latency simulation**: add a delay to every read
//! - **Handshake control**: choose how many key bytes the device acknowledges
//! - **Probe**: observe reads after the transport moved into another thread

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use co2mon_types::{DecryptedFrame, KEY, RawFrame, RecordType, encrypt};

use crate::error::{Error, Result};
use crate::transport::{FrameSource, ReadOutcome};

/// One scripted reply to a read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockResponse {
    /// Deliver this raw report.
    Frame(RawFrame),
    /// Report that nothing arrived.
    Timeout,
    /// Deliver a truncated report of the given length.
    Short(usize),
    /// Fail the read with a transport error.
    Fail(String),
}

impl MockResponse {
    /// Encrypt a decrypted frame the way the device would send it.
    pub fn record(frame: DecryptedFrame) -> Self {
        MockResponse::Frame(encrypt(&frame, &KEY))
    }

    /// A valid CO2 record.
    pub fn co2(ppm: u16) -> Self {
        Self::record(DecryptedFrame::new(RecordType::Co2.code(), ppm))
    }

    /// A valid temperature record carrying a raw payload (1/16 K).
    pub fn temperature_raw(raw: u16) -> Self {
        Self::record(DecryptedFrame::new(RecordType::Temperature.code(), raw))
    }

    /// A valid temperature record closest to `celsius`.
    pub fn temperature(celsius: f64) -> Self {
        let raw = ((celsius + 273.15) / 0.0625).round().clamp(0.0, f64::from(u16::MAX)) as u16;
        Self::temperature_raw(raw)
    }

    /// A valid record with a code this crate does not publish.
    pub fn unrecognized(code: u8, payload: u16) -> Self {
        Self::record(DecryptedFrame::new(code, payload))
    }

    /// A record whose marker byte has been replaced.
    pub fn bad_marker(code: u8, payload: u16, marker: u8) -> Self {
        let mut bytes = DecryptedFrame::new(code, payload).0;
        bytes[4] = marker;
        Self::record(DecryptedFrame(bytes))
    }

    /// A record whose checksum byte is off by one.
    pub fn bad_checksum(code: u8, payload: u16) -> Self {
        let mut bytes = DecryptedFrame::new(code, payload).0;
        bytes[3] = bytes[3].wrapping_add(1);
        Self::record(DecryptedFrame(bytes))
    }
}

#[derive(Debug, Default)]
struct ProbeState {
    script: Mutex<VecDeque<MockResponse>>,
    repeat: AtomicBool,
    reads: AtomicU64,
    active_reads: AtomicUsize,
    max_concurrent_reads: AtomicUsize,
    feature_reports: Mutex<Vec<Vec<u8>>>,
}

/// Shared view into a [`MockTransport`].
///
/// Clones observe and control the same transport, even after it has been
/// moved into the acquisition thread.
#[derive(Debug, Clone, Default)]
pub struct MockProbe {
    state: Arc<ProbeState>,
}

impl MockProbe {
    /// Total number of reads performed.
    pub fn reads(&self) -> u64 {
        self.state.reads.load(Ordering::SeqCst)
    }

    /// Highest number of reads that were ever in flight at once.
    pub fn max_concurrent_reads(&self) -> usize {
        self.state.max_concurrent_reads.load(Ordering::SeqCst)
    }

    /// The most recent feature report sent to the device.
    pub fn last_feature_report(&self) -> Option<Vec<u8>> {
        self.state.feature_reports.lock().last().cloned()
    }

    /// Append a response to the script.
    pub fn push(&self, response: MockResponse) {
        self.state.script.lock().push_back(response);
    }

    /// Replace the whole script.
    pub fn set_script(&self, responses: impl IntoIterator<Item = MockResponse>) {
        let mut script = self.state.script.lock();
        script.clear();
        script.extend(responses);
    }

    /// Number of responses not yet consumed.
    pub fn remaining(&self) -> usize {
        self.state.script.lock().len()
    }

    fn next_response(&self) -> Option<MockResponse> {
        let mut script = self.state.script.lock();
        let response = script.pop_front()?;
        if self.state.repeat.load(Ordering::SeqCst) {
            script.push_back(response.clone());
        }
        Some(response)
    }
}

/// A scripted CO2 monitor.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use co2mon_core::mock::{MockResponse, MockTransport};
/// use co2mon_core::{FrameSource, ReadOutcome};
///
/// let mut transport = MockTransport::builder()
///     .response(MockResponse::co2(800))
///     .build();
///
/// let outcome = transport.read_frame(Duration::from_secs(1)).unwrap();
/// assert!(matches!(outcome, ReadOutcome::Frame(_)));
/// assert_eq!(
///     transport.read_frame(Duration::from_secs(1)).unwrap(),
///     ReadOutcome::Timeout
/// );
/// ```
#[derive(Debug)]
pub struct MockTransport {
    probe: MockProbe,
    read_latency: Duration,
    handshake_ack: Option<usize>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// A transport with an empty script: every read times out.
    pub fn new() -> Self {
        MockTransportBuilder::default().build()
    }

    /// Create a builder.
    pub fn builder() -> MockTransportBuilder {
        MockTransportBuilder::default()
    }

    /// A probe sharing this transport's state.
    pub fn probe(&self) -> MockProbe {
        self.probe.clone()
    }
}

impl FrameSource for MockTransport {
    fn send_feature_report(&mut self, data: &[u8]) -> Result<usize> {
        self.probe.state.feature_reports.lock().push(data.to_vec());
        Ok(self.handshake_ack.unwrap_or(data.len()))
    }

    fn read_frame(&mut self, _timeout: Duration) -> Result<ReadOutcome> {
        let state = &self.probe.state;
        let active = state.active_reads.fetch_add(1, Ordering::SeqCst) + 1;
        state.max_concurrent_reads.fetch_max(active, Ordering::SeqCst);
        state.reads.fetch_add(1, Ordering::SeqCst);

        if !self.read_latency.is_zero() {
            thread::sleep(self.read_latency);
        }
        let response = self.probe.next_response();
        state.active_reads.fetch_sub(1, Ordering::SeqCst);

        match response {
            Some(MockResponse::Frame(frame)) => Ok(ReadOutcome::Frame(frame)),
            Some(MockResponse::Short(len)) => Ok(ReadOutcome::Short(len)),
            Some(MockResponse::Fail(message)) => Err(Error::Transport(message)),
            Some(MockResponse::Timeout) | None => Ok(ReadOutcome::Timeout),
        }
    }
}

/// Builder for [`MockTransport`].
#[derive(Debug, Default)]
pub struct MockTransportBuilder {
    responses: Vec<MockResponse>,
    repeat: bool,
    read_latency: Duration,
    handshake_ack: Option<usize>,
}

impl MockTransportBuilder {
    /// Append one scripted response.
    #[must_use]
    pub fn response(mut self, response: MockResponse) -> Self {
        self.responses.push(response);
        self
    }

    /// Append several scripted responses.
    #[must_use]
    pub fn responses(mut self, responses: impl IntoIterator<Item = MockResponse>) -> Self {
        self.responses.extend(responses);
        self
    }

    /// Replay the script forever instead of timing out once it is exhausted.
    #[must_use]
    pub fn repeat(mut self, repeat: bool) -> Self {
        self.repeat = repeat;
        self
    }

    /// Delay every read by `latency`.
    #[must_use]
    pub fn read_latency(mut self, latency: Duration) -> Self {
        self.read_latency = latency;
        self
    }

    /// Acknowledge this many bytes of every feature report.
    #[must_use]
    pub fn handshake_ack(mut self, len: usize) -> Self {
        self.handshake_ack = Some(len);
        self
    }

    /// Build the transport.
    #[must_use]
    pub fn build(self) -> MockTransport {
        let probe = MockProbe::default();
        probe.state.repeat.store(self.repeat, Ordering::SeqCst);
        probe.set_script(self.responses);
        MockTransport {
            probe,
            read_latency: self.read_latency,
            handshake_ack: self.handshake_ack,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use co2mon_types::{Record, classify_validated};

    fn decode(outcome: ReadOutcome) -> Record {
        match outcome {
            ReadOutcome::Frame(raw) => classify_validated(&raw.decrypt()).unwrap(),
            other => panic!("expected frame, got {other:?}"),
        }
    }

    #[test]
    fn test_scripted_records_decode() {
        let mut transport = MockTransport::builder()
            .responses([MockResponse::co2(1234), MockResponse::temperature(21.5)])
            .build();
        let timeout = Duration::from_millis(10);

        assert_eq!(decode(transport.read_frame(timeout).unwrap()), Record::Co2(1234));
        match decode(transport.read_frame(timeout).unwrap()) {
            Record::Temperature(celsius) => assert!((celsius - 21.5).abs() < 0.0625),
            other => panic!("expected temperature, got {other:?}"),
        }
    }

    #[test]
    fn test_exhausted_script_times_out() {
        let mut transport = MockTransport::new();
        assert_eq!(
            transport.read_frame(Duration::ZERO).unwrap(),
            ReadOutcome::Timeout
        );
        assert_eq!(transport.probe().reads(), 1);
    }

    #[test]
    fn test_repeat_cycles_script() {
        let mut transport = MockTransport::builder()
            .response(MockResponse::Short(3))
            .repeat(true)
            .build();
        for _ in 0..3 {
            assert_eq!(
                transport.read_frame(Duration::ZERO).unwrap(),
                ReadOutcome::Short(3)
            );
        }
        assert_eq!(transport.probe().remaining(), 1);
    }

    #[test]
    fn test_fail_response_is_transport_error() {
        let mut transport = MockTransport::builder()
            .response(MockResponse::Fail("unplugged".to_string()))
            .build();
        let err = transport.read_frame(Duration::ZERO).unwrap_err();
        assert!(matches!(err, Error::Transport(ref m) if m == "unplugged"));
    }

    #[test]
    fn test_probe_push_reaches_moved_transport() {
        let mut transport = MockTransport::new();
        let probe = transport.probe();

        let handle = thread::spawn(move || {
            let first = transport.read_frame(Duration::ZERO).unwrap();
            (transport, first)
        });
        let (mut transport, first) = handle.join().unwrap();
        assert_eq!(first, ReadOutcome::Timeout);

        probe.push(MockResponse::co2(450));
        assert_eq!(decode(transport.read_frame(Duration::ZERO).unwrap()), Record::Co2(450));
        assert_eq!(probe.reads(), 2);
        assert_eq!(probe.max_concurrent_reads(), 1);
    }

    #[test]
    fn test_corrupt_responses_fail_validation() {
        let mut transport = MockTransport::builder()
            .responses([
                MockResponse::bad_marker(0x50, 500, 0x00),
                MockResponse::bad_checksum(0x42, 4700),
            ])
            .build();
        for _ in 0..2 {
            let ReadOutcome::Frame(raw) = transport.read_frame(Duration::ZERO).unwrap() else {
                panic!("expected frame");
            };
            assert!(raw.decrypt().validate().is_err());
        }
    }
}
