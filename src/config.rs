//! Bus configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default Dynamixel X-series baud rate.
pub const DEFAULT_BAUD_RATE: u32 = 1_000_000;
/// Default USB serial adapter latency timer, in milliseconds.
pub const DEFAULT_LATENCY_TIMER_MS: u64 = 16;

/// Where the bus lives and how fast it runs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Serial device node, e.g. `/dev/ttyUSB0`.
    pub device_name: String,
    /// Line speed in baud.
    pub baud_rate: u32,
    /// Latency added by the serial adapter to every response, in milliseconds.
    pub latency_timer_ms: u64,
}

impl Default for BusConfig {
    fn default() -> BusConfig {
        BusConfig {
            device_name: String::from("/dev/ttyUSB0"),
            baud_rate: DEFAULT_BAUD_RATE,
            latency_timer_ms: DEFAULT_LATENCY_TIMER_MS,
        }
    }
}

impl BusConfig {
    /// Configuration for `device_name` at `baud_rate`.
    pub fn new(device_name: impl Into<String>, baud_rate: u32) -> BusConfig {
        BusConfig {
            device_name: device_name.into(),
            baud_rate,
            ..BusConfig::default()
        }
    }
    /// How long to wait for `packet_length` response bytes.
    pub fn packet_timeout(&self, packet_length: usize) -> Duration {
        // 10 bits on the wire per byte
        let tx_time_per_byte_us = 10_000_000 / u64::from(self.baud_rate.max(1));
        Duration::from_micros(tx_time_per_byte_us * (packet_length as u64 + 3))
            + Duration::from_millis(self.latency_timer_ms)
    }
}
