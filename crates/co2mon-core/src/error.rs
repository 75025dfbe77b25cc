//! Error types for co2mon-core.
//!
//! Errors fall into two groups with different propagation rules:
//!
//! | Error | When | Handling |
//! |-------|------|----------|
//! | [`Error::DeviceNotFound`] | `open` | Fatal, returned to the caller |
//! | [`Error::Hid`] | `open`, reads | Fatal at open; per-attempt during polling |
//! | [`Error::Handshake`] | `open` | Fatal, returned to the caller |
//! | [`Error::Frame`] | polling | Logged and counted, never stops monitoring |
//! | [`Error::Transport`] | reads | Logged and counted, treated as no data |
//! | [`Error::InvalidConfig`] | setup | Fix the options and retry |
//! | [`Error::Io`] | `start_monitoring` | The acquisition thread could not be spawned |
//!
//! Nothing inside the acquisition thread is allowed to end the monitoring
//! lifecycle. Readers of the store never see errors at all; an empty slot
//! means no valid reading has arrived yet.

use thiserror::Error;

use co2mon_types::FrameError;

/// Errors that can occur when talking to a CO2 monitor.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// No device with the expected vendor/product pair could be opened.
    #[error("Cannot open the CO2 device (vendor_id: {vendor_id:#06x}, product_id: {product_id:#06x}): {reason}")]
    DeviceNotFound {
        /// USB vendor id that was searched for.
        vendor_id: u16,
        /// USB product id that was searched for.
        product_id: u16,
        /// Underlying cause reported by the HID library.
        reason: String,
    },

    /// Error reported by the HID library.
    #[error("HID error: {0}")]
    Hid(#[from] hidapi::HidError),

    /// The device did not acknowledge the key feature report in full.
    #[error("Unable to send the key: device acknowledged {acknowledged} of {sent} bytes")]
    Handshake {
        /// Length of the feature report that was sent.
        sent: usize,
        /// Length the device acknowledged.
        acknowledged: usize,
    },

    /// A decrypted frame failed validation.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// Transport-level failure not covered by the HID library.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error, e.g. while spawning the acquisition thread.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Whether this error belongs to the fatal open-time category.
    pub fn is_open_error(&self) -> bool {
        matches!(
            self,
            Error::DeviceNotFound { .. } | Error::Hid(_) | Error::Handshake { .. }
        )
    }
}

/// Result type alias using co2mon-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use co2mon_types::DecryptedFrame;

    #[test]
    fn test_error_display() {
        let err = Error::DeviceNotFound {
            vendor_id: 0x04d9,
            product_id: 0xa052,
            reason: "no such device".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("0x04d9"));
        assert!(message.contains("0xa052"));
        assert!(message.contains("no such device"));

        let err = Error::Handshake {
            sent: 9,
            acknowledged: 4,
        };
        assert_eq!(
            err.to_string(),
            "Unable to send the key: device acknowledged 4 of 9 bytes"
        );

        let err = Error::invalid_config("max_requests must be > 0");
        assert_eq!(
            err.to_string(),
            "Invalid configuration: max_requests must be > 0"
        );
    }

    #[test]
    fn test_frame_error_conversion_is_transparent() {
        let mut bytes = DecryptedFrame::new(0x50, 600).0;
        bytes[4] = 0x0e;
        let frame_err = DecryptedFrame(bytes).validate().unwrap_err();
        let expected = frame_err.to_string();

        let err: Error = frame_err.into();
        assert!(matches!(err, Error::Frame(FrameError::MarkerMismatch { .. })));
        assert_eq!(err.to_string(), expected);
        assert!(!err.is_open_error());
    }

    #[test]
    fn test_open_error_classification() {
        assert!(
            Error::Handshake {
                sent: 9,
                acknowledged: 0
            }
            .is_open_error()
        );
        assert!(!Error::Transport("boom".to_string()).is_open_error());
        assert!(!Error::invalid_config("x").is_open_error());
    }

    #[test]
    fn test_hid_error_conversion() {
        fn _assert_from_impl<T: From<hidapi::HidError>>() {}
        _assert_from_impl::<Error>();
    }
}
