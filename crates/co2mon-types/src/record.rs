//! Classification of decrypted frames into sensor records.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::FrameResult;
use crate::frame::DecryptedFrame;

/// Offset between Kelvin and degrees Celsius.
const KELVIN_OFFSET: f64 = 273.15;

/// Kelvin per raw temperature count.
const TEMPERATURE_SCALE: f64 = 0.0625;

/// Record types published by this crate.
///
/// The device emits other codes too (humidity on some models, status
/// records); those are reported as [`Record::Unrecognized`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum RecordType {
    /// Ambient temperature, 1/16 K per count.
    Temperature = 0x42,
    /// CO2 concentration in ppm.
    Co2 = 0x50,
}

impl RecordType {
    /// The record type for a code byte, if it is one we publish.
    ///
    /// ```
    /// use co2mon_types::RecordType;
    ///
    /// assert_eq!(RecordType::from_code(0x42), Some(RecordType::Temperature));
    /// assert_eq!(RecordType::from_code(0x50), Some(RecordType::Co2));
    /// assert_eq!(RecordType::from_code(0x41), None);
    /// ```
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x42 => Some(RecordType::Temperature),
            0x50 => Some(RecordType::Co2),
            _ => None,
        }
    }

    /// The wire code of this record type.
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordType::Temperature => write!(f, "temperature"),
            RecordType::Co2 => write!(f, "CO2"),
        }
    }
}

/// A classified frame with its payload converted to physical units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Record {
    /// Temperature in degrees Celsius.
    Temperature(f64),
    /// CO2 concentration in ppm.
    Co2(u16),
    /// Any other record code. Not an error.
    Unrecognized(u8),
}

impl Record {
    /// The published record type, or `None` for unrecognized codes.
    pub fn record_type(&self) -> Option<RecordType> {
        match self {
            Record::Temperature(_) => Some(RecordType::Temperature),
            Record::Co2(_) => Some(RecordType::Co2),
            Record::Unrecognized(_) => None,
        }
    }

    /// The wire code this record was classified from.
    pub fn code(&self) -> u8 {
        match self {
            Record::Temperature(_) => RecordType::Temperature.code(),
            Record::Co2(_) => RecordType::Co2.code(),
            Record::Unrecognized(code) => *code,
        }
    }
}

/// Convert a raw temperature payload to degrees Celsius.
pub fn temperature_celsius(raw: u16) -> f64 {
    f64::from(raw) * TEMPERATURE_SCALE - KELVIN_OFFSET
}

/// Interpret a frame that has already passed validation.
pub fn classify(frame: &DecryptedFrame) -> Record {
    let raw = frame.payload();
    match RecordType::from_code(frame.code()) {
        Some(RecordType::Temperature) => Record::Temperature(temperature_celsius(raw)),
        Some(RecordType::Co2) => Record::Co2(raw),
        None => Record::Unrecognized(frame.code()),
    }
}

/// Validate a frame and classify it.
pub fn classify_validated(frame: &DecryptedFrame) -> FrameResult<Record> {
    frame.validate()?;
    Ok(classify(frame))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FrameError;

    #[test]
    fn test_classify_temperature() {
        let frame = DecryptedFrame([0x42, 0x12, 0x34, 0x88, 0x0d, 0, 0, 0]);
        let expected = f64::from(0x1234u16) * 0.0625 - 273.15;
        match classify_validated(&frame).unwrap() {
            Record::Temperature(celsius) => {
                assert!((celsius - expected).abs() < 1e-9);
                assert!((celsius - 18.1).abs() < 1e-9);
            }
            other => panic!("expected temperature, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_co2_is_untransformed() {
        let frame = DecryptedFrame::new(0x50, 1000);
        assert_eq!(frame.as_bytes()[1..3], [0x03, 0xE8]);
        assert_eq!(classify_validated(&frame).unwrap(), Record::Co2(1000));
    }

    #[test]
    fn test_classify_unrecognized_code() {
        let frame = DecryptedFrame::new(0x41, 4200);
        let record = classify_validated(&frame).unwrap();
        assert_eq!(record, Record::Unrecognized(0x41));
        assert_eq!(record.record_type(), None);
        assert_eq!(record.code(), 0x41);
    }

    #[test]
    fn test_classify_validated_rejects_bad_frame() {
        let mut bytes = DecryptedFrame::new(0x50, 800).0;
        bytes[4] = 0;
        assert!(matches!(
            classify_validated(&DecryptedFrame(bytes)),
            Err(FrameError::MarkerMismatch { marker: 0, .. })
        ));
    }

    #[test]
    fn test_temperature_conversion_bounds() {
        assert!((temperature_celsius(0) + 273.15).abs() < 1e-9);
        assert!((temperature_celsius(u16::MAX) - 3822.7875).abs() < 1e-9);
        assert!((temperature_celsius(4726) - 22.225).abs() < 1e-9);
    }

    #[test]
    fn test_record_type_codes() {
        assert_eq!(RecordType::Temperature.code(), 0x42);
        assert_eq!(RecordType::Co2.code(), 0x50);
        assert_eq!(Record::Co2(1).code(), 0x50);
        assert_eq!(RecordType::Co2.to_string(), "CO2");
    }
}
