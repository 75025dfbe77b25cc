//! Device transport and key handshake.
//!
//! [`FrameSource`] abstracts the two operations the monitor needs from the
//! device, so the acquisition loop can run against [`HidTransport`] or a
//! [`MockTransport`](crate::mock::MockTransport).
//!
//! A transport is exclusively owned. Only one thread reads from it at a
//! time; the monitor moves it into the acquisition thread while running and
//! takes it back on stop.

use std::time::Duration;

use hidapi::{HidApi, HidDevice};
use tracing::{debug, info};

use co2mon_types::{FRAME_LEN, KEY, Key, RawFrame};

use crate::error::{Error, Result};

/// USB vendor id of the supported monitor.
pub const VENDOR_ID: u16 = 0x04d9;

/// USB product id of the supported monitor.
pub const PRODUCT_ID: u16 = 0xa052;

/// Upper bound for a single blocking read.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(5000);

/// Length of the key feature report: report id 0 followed by the key.
pub const KEY_REPORT_LEN: usize = FRAME_LEN + 1;

/// Result of a single read attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A complete 8-byte report.
    Frame(RawFrame),
    /// Nothing arrived within the timeout.
    Timeout,
    /// A report shorter than a frame; carries the received length.
    Short(usize),
}

/// A device that accepts feature reports and produces input reports.
pub trait FrameSource: Send {
    /// Send a feature report and return the number of bytes the device
    /// acknowledged.
    fn send_feature_report(&mut self, data: &[u8]) -> Result<usize>;

    /// Block for at most `timeout` waiting for one input report.
    fn read_frame(&mut self, timeout: Duration) -> Result<ReadOutcome>;
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn send_feature_report(&mut self, data: &[u8]) -> Result<usize> {
        (**self).send_feature_report(data)
    }

    fn read_frame(&mut self, timeout: Duration) -> Result<ReadOutcome> {
        (**self).read_frame(timeout)
    }
}

/// Perform the key exchange that authorises subsequent reads.
///
/// The key is sent as a 9-byte feature report with a leading zero report
/// id. Any acknowledgement other than the full 9 bytes is fatal.
pub fn send_key<S: FrameSource + ?Sized>(source: &mut S, key: &Key) -> Result<()> {
    let mut report = [0u8; KEY_REPORT_LEN];
    report[1..].copy_from_slice(key);

    let acknowledged = source.send_feature_report(&report)?;
    if acknowledged != report.len() {
        return Err(Error::Handshake {
            sent: report.len(),
            acknowledged,
        });
    }
    debug!("Key handshake acknowledged ({} bytes)", acknowledged);
    Ok(())
}

/// A monitor connected over hidapi.
///
/// Dropping the transport closes the device and then releases the HID
/// library context.
pub struct HidTransport {
    // Field order matters: the device must be closed before the context.
    device: HidDevice,
    #[allow(dead_code)]
    api: HidApi,
    vendor_id: u16,
    product_id: u16,
}

impl std::fmt::Debug for HidTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HidTransport")
            .field("vendor_id", &format_args!("{:#06x}", self.vendor_id))
            .field("product_id", &format_args!("{:#06x}", self.product_id))
            .finish_non_exhaustive()
    }
}

impl HidTransport {
    /// Open the monitor and perform the key handshake.
    pub fn open() -> Result<Self> {
        Self::open_device(VENDOR_ID, PRODUCT_ID)
    }

    /// Open a device with an explicit vendor/product pair and perform the
    /// key handshake.
    pub fn open_device(vendor_id: u16, product_id: u16) -> Result<Self> {
        let api = HidApi::new()?;
        let device = api
            .open(vendor_id, product_id)
            .map_err(|e| Error::DeviceNotFound {
                vendor_id,
                product_id,
                reason: e.to_string(),
            })?;

        let mut transport = Self {
            device,
            api,
            vendor_id,
            product_id,
        };
        send_key(&mut transport, &KEY)?;

        info!(
            "Opened CO2 monitor {:04x}:{:04x}",
            transport.vendor_id, transport.product_id
        );
        Ok(transport)
    }
}

impl FrameSource for HidTransport {
    fn send_feature_report(&mut self, data: &[u8]) -> Result<usize> {
        // hidapi only reports failure; a successful call wrote the whole report.
        self.device.send_feature_report(data)?;
        Ok(data.len())
    }

    fn read_frame(&mut self, timeout: Duration) -> Result<ReadOutcome> {
        let mut buf = [0u8; FRAME_LEN];
        let timeout_ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
        let len = self.device.read_timeout(&mut buf, timeout_ms)?;
        Ok(match len {
            0 => ReadOutcome::Timeout,
            FRAME_LEN => ReadOutcome::Frame(RawFrame(buf)),
            n => ReadOutcome::Short(n),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;

    #[test]
    fn test_send_key_prefixes_report_id() {
        let mut transport = MockTransport::new();
        let probe = transport.probe();

        send_key(&mut transport, &KEY).unwrap();

        let report = probe.last_feature_report().unwrap();
        assert_eq!(report.len(), KEY_REPORT_LEN);
        assert_eq!(report[0], 0);
        assert_eq!(&report[1..], &KEY);
    }

    #[test]
    fn test_send_key_rejects_partial_ack() {
        let mut transport = MockTransport::builder().handshake_ack(8).build();

        let err = send_key(&mut transport, &KEY).unwrap_err();
        assert!(matches!(
            err,
            Error::Handshake {
                sent: 9,
                acknowledged: 8
            }
        ));
        assert!(err.is_open_error());
    }

    #[test]
    fn test_send_key_rejects_oversized_ack() {
        let mut transport = MockTransport::builder().handshake_ack(10).build();
        assert!(matches!(
            send_key(&mut transport, &KEY),
            Err(Error::Handshake {
                acknowledged: 10,
                ..
            })
        ));
    }

    #[test]
    fn test_boxed_source_delegates() {
        let mut boxed: Box<dyn FrameSource> = Box::new(MockTransport::new());
        send_key(&mut boxed, &KEY).unwrap();
        assert_eq!(
            boxed.read_frame(Duration::from_millis(1)).unwrap(),
            ReadOutcome::Timeout
        );
    }
}
