use crate::frame_decoder::{FieldDescriptor, Readings, LIFETIME_ENERGY};
use std::collections::HashMap;

/// Last known value of every telemetry field.
///
/// The lifetime energy counter is present from construction onwards: it is seeded from the sink
/// before polling starts and afterwards only replaced by decoded frames, never zeroed.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryStore {
    values: HashMap<&'static str, f64>,
}

impl TelemetryStore {
    /// Creates a store seeded with the lifetime energy (kWh) read back from the sink.
    pub fn with_lifetime_energy(kwh: f64) -> Self {
        let mut values = HashMap::new();
        values.insert(LIFETIME_ENERGY, kwh);
        Self { values }
    }

    pub fn get(&self, field: &str) -> Option<f64> {
        self.values.get(field).copied()
    }

    pub fn lifetime_energy(&self) -> f64 {
        self.get(LIFETIME_ENERGY).unwrap_or_default()
    }

    /// Overwrites the store with a freshly decoded frame.
    pub fn apply(&mut self, readings: Readings) {
        self.values.extend(readings);
    }

    /// Marks the inverter offline: every mapped field except the lifetime energy becomes 0.
    pub fn degrade(&mut self, mapping: &[FieldDescriptor]) {
        for field in mapping.iter().filter(|field| field.name != LIFETIME_ENERGY) {
            self.values.insert(field.name, 0.0);
        }
    }
}
