//! Error types for frame validation in co2mon-types.

use thiserror::Error;

use crate::frame::DecryptedFrame;

/// A decrypted frame failed one of the protocol's integrity checks.
///
/// Both variants carry the full decrypted frame so the offending bytes can
/// be logged. They indicate that a framing or key assumption no longer holds,
/// which is different from a transport timeout.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Byte 4 of the decrypted frame is not the fixed `0x0d` marker.
    #[error("Marker byte is {marker:#04x}, expected 0x0d (data: {frame})")]
    MarkerMismatch {
        /// The marker byte that was found.
        marker: u8,
        /// The decrypted frame.
        frame: DecryptedFrame,
    },

    /// Byte 3 of the decrypted frame does not match the sum of bytes 0..3.
    #[error("Checksum error: expected {expected:#04x}, got {actual:#04x} (data: {frame})")]
    Checksum {
        /// Low byte of the sum of the first three bytes.
        expected: u8,
        /// Checksum byte carried by the frame.
        actual: u8,
        /// The decrypted frame.
        frame: DecryptedFrame,
    },
}

impl FrameError {
    /// The decrypted frame that failed validation.
    pub fn frame(&self) -> &DecryptedFrame {
        match self {
            FrameError::MarkerMismatch { frame, .. } | FrameError::Checksum { frame, .. } => frame,
        }
    }
}

/// Result type alias using co2mon-types' FrameError type.
pub type FrameResult<T> = std::result::Result<T, FrameError>;
