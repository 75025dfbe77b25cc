//! Timestamped sensor readings.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A value paired with the wall-clock time it was captured.
///
/// Readings are never mutated; a newer reading replaces an older one.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Reading<T> {
    /// The measured value.
    pub value: T,
    /// When the frame carrying this value was decoded.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub captured_at: OffsetDateTime,
}

impl<T> Reading<T> {
    /// Create a reading captured at an explicit time.
    pub fn new(value: T, captured_at: OffsetDateTime) -> Self {
        Self { value, captured_at }
    }

    /// Create a reading stamped with the current UTC time.
    pub fn now(value: T) -> Self {
        Self::new(value, OffsetDateTime::now_utc())
    }

    /// Seconds since the Unix epoch at capture time.
    pub fn unix_timestamp(&self) -> i64 {
        self.captured_at.unix_timestamp()
    }
}

/// CO2 concentration in ppm.
pub type Co2Reading = Reading<u16>;

/// Temperature in degrees Celsius.
pub type TemperatureReading = Reading<f64>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reading_unix_timestamp() {
        let at = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let reading = Reading::new(800u16, at);
        assert_eq!(reading.unix_timestamp(), 1_700_000_000);
        assert_eq!(reading.value, 800);
    }

    #[test]
    fn test_reading_now_is_recent() {
        let before = OffsetDateTime::now_utc();
        let reading = Reading::now(21.5f64);
        assert!(reading.captured_at >= before);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_reading_serialization() {
        let reading = Reading::new(1000u16, OffsetDateTime::UNIX_EPOCH);
        let json = serde_json::to_string(&reading).unwrap();
        assert_eq!(json, r#"{"value":1000,"captured_at":"1970-01-01T00:00:00Z"}"#);

        let back: Co2Reading = serde_json::from_str(&json).unwrap();
        assert_eq!(back, reading);
    }
}
