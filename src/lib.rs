//! Synchronized bulk I/O for chains of Robotis Dynamixel motors (protocol 2.0).
//!
//! A [`Controller`] owns the half-duplex bus and serializes every exchange on
//! it. Besides per-device torque control it offers the two group operations
//! of the protocol: a sync write sends one register value to many motors in
//! a single packet, and a sync read collects load, speed and position from
//! many motors in a single exchange.
//!
//! ## Example
//!
//! ```no_run
//! use dynamixel_sync::BusConfig;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let c = dynamixel_sync::with_serial_port(BusConfig::new("/dev/ttyUSB0", 1_000_000));
//!     c.setup()?;
//!     c.enable_torque(&[1, 2]);
//!
//!     loop {
//!         let telemetry = c.sync_read(&[1])?;
//!         let pos = telemetry.get(1).map_or(0, |t| t.position_signed());
//!         c.sync_write_goal_position(&[2], &[pos])?;
//!     }
//! }
//! ```
#![deny(missing_docs)]

extern crate embedded_hal as hal;

pub mod config;
mod controller;
mod error;
pub mod event;
#[macro_use]
pub mod motors;
pub mod port;
mod protocol;
mod telemetry;

#[cfg(test)]
mod sim;

pub use config::BusConfig;
pub use controller::{Connection, ConnectionState, Controller, DEFAULT_PAYLOAD_WIDTH};
pub use error::{
    CommError, ConnectionError, ConnectionErrorKind, DeviceError, ParamAddError, ReadError, WriteError,
    COMM_SUCCESS,
};
pub use event::{BusEvent, EventSink, LogSink, TorqueOutcome};
pub use protocol::{SyncRead, SyncWrite, TransactionState};
pub use telemetry::{Telemetry, TelemetryMap};

use port::{HalPort, SerialPortHandler};

/// Create a controller for a host serial device described by `config`.
///
/// The port is opened by [`Controller::setup`].
pub fn with_serial_port(config: BusConfig) -> Controller<SerialPortHandler> {
    let port = SerialPortHandler::new(config.baud_rate);
    Controller::new(port, config)
}

/// Create a controller for the Dynamixel protocol V2 using a serial RX/TX
/// already configured at `baud_rate`.
pub fn with_protocol_v2<RX, TX>(rx: RX, tx: TX, baud_rate: u32) -> Controller<HalPort<RX, TX>>
where
    HalPort<RX, TX>: port::Port,
{
    let config = BusConfig::new("uart", baud_rate);
    Controller::new(HalPort::new(rx, tx, baud_rate), config)
}
