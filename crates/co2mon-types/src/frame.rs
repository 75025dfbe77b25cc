//! Frame decryption and validation.
//!
//! The monitor sends 8-byte input reports that are scrambled with a fixed
//! key. Decryption happens in two stages:
//!
//! 1. **Shuffle-XOR**: byte `i` of the raw report is XORed with the key byte
//!    at `SHUFFLE[i]` and stored at that position.
//! 2. **Rotate-subtract**: each byte is rotated right by three bits across
//!    its neighbour and the nibble-swapped constant state is subtracted.
//!
//! A decrypted frame has the layout:
//!
//! | Byte | Meaning |
//! |------|---------|
//! | 0 | Record type code |
//! | 1-2 | Payload (u16 BE) |
//! | 3 | Checksum (low byte of bytes 0 + 1 + 2) |
//! | 4 | Marker, always `0x0d` |
//! | 5-7 | Unused |

use core::fmt;

use crate::error::{FrameError, FrameResult};

/// Length of every frame exchanged with the device.
pub const FRAME_LEN: usize = 8;

/// Key sent to the device during the handshake and used for decryption.
pub const KEY: Key = [0xc4, 0xc6, 0xc0, 0x92, 0x40, 0x23, 0xdc, 0x96];

/// Constant state subtracted in the rotate stage (ASCII `"Htemp99e"`).
pub const CONSTANT_STATE: [u8; FRAME_LEN] = *b"Htemp99e";

/// Destination index of each raw byte in the shuffle stage.
pub const SHUFFLE: [u8; FRAME_LEN] = [2, 4, 0, 7, 1, 6, 5, 3];

/// Fixed marker carried in byte 4 of every valid decrypted frame.
pub const MARKER: u8 = 0x0d;

/// An 8-byte decryption key.
pub type Key = [u8; FRAME_LEN];

/// One input report as received from the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RawFrame(pub [u8; FRAME_LEN]);

impl RawFrame {
    /// Build a raw frame from a received buffer.
    ///
    /// Returns `None` unless exactly [`FRAME_LEN`] bytes are supplied.
    pub fn from_slice(data: &[u8]) -> Option<Self> {
        <[u8; FRAME_LEN]>::try_from(data).ok().map(Self)
    }

    /// The raw bytes.
    pub fn as_bytes(&self) -> &[u8; FRAME_LEN] {
        &self.0
    }

    /// Decrypt this frame with the device key.
    pub fn decrypt(&self) -> DecryptedFrame {
        decrypt(self, &KEY)
    }
}

impl From<[u8; FRAME_LEN]> for RawFrame {
    fn from(bytes: [u8; FRAME_LEN]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for RawFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_hex(f, &self.0)
    }
}

/// The output of [`decrypt`].
///
/// A decrypted frame may still be garbage; call [`DecryptedFrame::validate`]
/// before trusting its contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DecryptedFrame(pub [u8; FRAME_LEN]);

impl DecryptedFrame {
    /// Build a well-formed frame for a record code and payload.
    ///
    /// The checksum and marker are filled in, so the result always passes
    /// [`validate`](Self::validate).
    ///
    /// ```
    /// use co2mon_types::DecryptedFrame;
    ///
    /// let frame = DecryptedFrame::new(0x50, 1000);
    /// assert_eq!(frame.as_bytes(), &[0x50, 0x03, 0xE8, 0x3B, 0x0D, 0, 0, 0]);
    /// assert!(frame.validate().is_ok());
    /// ```
    pub fn new(code: u8, payload: u16) -> Self {
        let [hi, lo] = payload.to_be_bytes();
        let checksum = code.wrapping_add(hi).wrapping_add(lo);
        Self([code, hi, lo, checksum, MARKER, 0, 0, 0])
    }

    /// The decrypted bytes.
    pub fn as_bytes(&self) -> &[u8; FRAME_LEN] {
        &self.0
    }

    /// Record type code (byte 0).
    pub fn code(&self) -> u8 {
        self.0[0]
    }

    /// Big-endian payload carried in bytes 1 and 2.
    pub fn payload(&self) -> u16 {
        u16::from_be_bytes([self.0[1], self.0[2]])
    }

    /// Checksum byte carried by the frame (byte 3).
    pub fn checksum(&self) -> u8 {
        self.0[3]
    }

    /// Marker byte (byte 4).
    pub fn marker(&self) -> u8 {
        self.0[4]
    }

    /// Low byte of the sum of bytes 0, 1 and 2.
    pub fn expected_checksum(&self) -> u8 {
        self.0[..3].iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
    }

    /// Check the fixed marker, then the checksum.
    ///
    /// A bad marker is reported even when the checksum also fails.
    pub fn validate(&self) -> FrameResult<()> {
        if self.marker() != MARKER {
            return Err(FrameError::MarkerMismatch {
                marker: self.marker(),
                frame: *self,
            });
        }
        let expected = self.expected_checksum();
        if self.checksum() != expected {
            return Err(FrameError::Checksum {
                expected,
                actual: self.checksum(),
                frame: *self,
            });
        }
        Ok(())
    }
}

impl fmt::Display for DecryptedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_hex(f, &self.0)
    }
}

fn write_hex(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            f.write_str(" ")?;
        }
        write!(f, "{b:02x}")?;
    }
    Ok(())
}

/// Nibble-swapped constant state, as subtracted in the rotate stage.
fn rotated_state(i: usize) -> u8 {
    CONSTANT_STATE[i].rotate_left(4)
}

/// Decrypt one raw frame.
///
/// Pure and infallible: every input produces eight bytes. Validity is
/// checked separately by [`DecryptedFrame::validate`].
pub fn decrypt(raw: &RawFrame, key: &Key) -> DecryptedFrame {
    let mut working = [0u8; FRAME_LEN];
    for (i, &idx) in SHUFFLE.iter().enumerate() {
        let idx = usize::from(idx);
        working[idx] = raw.0[i] ^ key[idx];
    }

    let mut result = [0u8; FRAME_LEN];
    for i in 0..FRAME_LEN {
        let prev = working[(i + FRAME_LEN - 1) % FRAME_LEN];
        let mixed = (working[i] >> 3) | (prev << 5);
        result[i] = mixed.wrapping_sub(rotated_state(i));
    }
    DecryptedFrame(result)
}

/// Inverse of [`decrypt`]: scramble a decrypted frame back into the bytes the
/// device would have sent.
///
/// Used to synthesise device traffic for mocks and tests.
pub fn encrypt(frame: &DecryptedFrame, key: &Key) -> RawFrame {
    let mut mixed = [0u8; FRAME_LEN];
    for (i, slot) in mixed.iter_mut().enumerate() {
        *slot = frame.0[i].wrapping_add(rotated_state(i));
    }

    let mut working = [0u8; FRAME_LEN];
    for (i, slot) in working.iter_mut().enumerate() {
        *slot = (mixed[i] << 3) | (mixed[(i + 1) % FRAME_LEN] >> 5);
    }

    let mut raw = [0u8; FRAME_LEN];
    for (i, &idx) in SHUFFLE.iter().enumerate() {
        let idx = usize::from(idx);
        raw[i] = working[idx] ^ key[idx];
    }
    RawFrame(raw)
}
