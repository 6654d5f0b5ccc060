//! Readings produced by a sync read.

use serde::{Deserialize, Serialize};

/// Load, speed and position of one device, as raw register values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Telemetry {
    /// Present load (2 bytes).
    pub load: u16,
    /// Present velocity (4 bytes).
    pub speed: u32,
    /// Present position (4 bytes).
    pub position: u32,
}

impl Telemetry {
    /// Load as the signed value the device reports.
    pub fn load_signed(&self) -> i16 {
        self.load as i16
    }
    /// Velocity as the signed value the device reports.
    pub fn speed_signed(&self) -> i32 {
        self.speed as i32
    }
    /// Position as the signed value the device reports.
    pub fn position_signed(&self) -> i32 {
        self.position as i32
    }
}

/// Telemetry keyed by device id, in the order the ids were requested.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryMap {
    readings: Vec<(u8, Telemetry)>,
}

impl TelemetryMap {
    pub(crate) fn with_capacity(capacity: usize) -> TelemetryMap {
        TelemetryMap {
            readings: Vec::with_capacity(capacity),
        }
    }
    pub(crate) fn insert(&mut self, id: u8, reading: Telemetry) {
        match self.readings.iter_mut().find(|(i, _)| *i == id) {
            Some((_, r)) => *r = reading,
            None => self.readings.push((id, reading)),
        }
    }
    /// Reading of device `id`.
    pub fn get(&self, id: u8) -> Option<&Telemetry> {
        self.readings.iter().find(|(i, _)| *i == id).map(|(_, r)| r)
    }
    /// Number of devices read.
    pub fn len(&self) -> usize {
        self.readings.len()
    }
    /// `true` when no device was read.
    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
    /// Device ids, in request order.
    pub fn ids(&self) -> impl Iterator<Item = u8> + '_ {
        self.readings.iter().map(|(id, _)| *id)
    }
    /// `(id, reading)` pairs, in request order.
    pub fn iter(&self) -> impl Iterator<Item = (u8, &Telemetry)> + '_ {
        self.readings.iter().map(|(id, r)| (*id, r))
    }
}

impl IntoIterator for TelemetryMap {
    type Item = (u8, Telemetry);
    type IntoIter = std::vec::IntoIter<(u8, Telemetry)>;

    fn into_iter(self) -> Self::IntoIter {
        self.readings.into_iter()
    }
}
