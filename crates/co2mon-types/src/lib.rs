//! Platform-agnostic protocol types for USB HID CO2 monitors.
//!
//! These monitors (vendor `0x04d9`, product `0xa052`) report CO2 and
//! temperature as scrambled 8-byte HID input reports. This crate contains
//! everything needed to turn those reports into readings without touching
//! the device:
//!
//! - The decryption key, constant state and shuffle table
//! - [`decrypt`] and its inverse [`encrypt`]
//! - Frame validation ([`DecryptedFrame::validate`])
//! - Record classification ([`classify`])
//! - Timestamped [`Reading`] values
//!
//! # Example
//!
//! ```
//! use co2mon_types::{RawFrame, Record, classify_validated};
//!
//! let raw = RawFrame([0x30, 0xE4, 0x66, 0x20, 0x97, 0x46, 0xBF, 0x1A]);
//! let record = classify_validated(&raw.decrypt()).unwrap();
//! assert_eq!(record, Record::Co2(1000));
//! ```

pub mod error;
pub mod frame;
pub mod reading;
pub mod record;

pub use error::{FrameError, FrameResult};
pub use frame::{
    CONSTANT_STATE, DecryptedFrame, FRAME_LEN, KEY, Key, MARKER, RawFrame, SHUFFLE, decrypt,
    encrypt,
};
pub use reading::{Co2Reading, Reading, TemperatureReading};
pub use record::{Record, RecordType, classify, classify_validated, temperature_celsius};
