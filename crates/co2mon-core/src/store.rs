//! Latest-value cache shared between the acquisition thread and readers.
//!
//! Each quantity lives in its own slot behind its own lock, so a temperature
//! update never contends with a CO2 read. Slots hold small `Copy` snapshots:
//! writers replace them wholesale and readers copy them out, so no lock is
//! ever held for longer than one copy.
//!
//! There is no ordering between the two slots. A reader may see a CO2 value
//! newer than the temperature next to it.

use parking_lot::RwLock;

use co2mon_types::{Co2Reading, Reading, TemperatureReading};

/// The most recent reading of each published quantity.
#[derive(Debug, Default)]
pub struct ReadingStore {
    co2: RwLock<Option<Co2Reading>>,
    temperature: RwLock<Option<TemperatureReading>>,
}

impl ReadingStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// The latest CO2 reading, or `None` if none has arrived yet.
    pub fn co2(&self) -> Option<Co2Reading> {
        *self.co2.read()
    }

    /// The latest temperature reading, or `None` if none has arrived yet.
    pub fn temperature(&self) -> Option<TemperatureReading> {
        *self.temperature.read()
    }

    /// Replace the CO2 slot.
    pub fn set_co2(&self, reading: Reading<u16>) {
        *self.co2.write() = Some(reading);
    }

    /// Replace the temperature slot.
    pub fn set_temperature(&self, reading: Reading<f64>) {
        *self.temperature.write() = Some(reading);
    }

    /// Both slots, each read independently.
    pub fn snapshot(&self) -> (Option<TemperatureReading>, Option<Co2Reading>) {
        (self.temperature(), self.co2())
    }
}
