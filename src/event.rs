//! Diagnostics emitted while driving the bus.
//!
//! Events are a side channel: every outcome is also part of the return value
//! of the operation that produced it.

use std::fmt;

use crate::error::{CommError, ConnectionErrorKind, DeviceError, ParamAddError, ReadError};
use crate::telemetry::Telemetry;

/// Outcome of one torque write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TorqueOutcome {
    /// The device acknowledged the write.
    Success,
    /// The exchange failed.
    CommError(CommError),
    /// The device answered with its error byte set.
    DeviceError(DeviceError),
}

impl TorqueOutcome {
    /// `true` for [`TorqueOutcome::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, TorqueOutcome::Success)
    }
}

impl fmt::Display for TorqueOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TorqueOutcome::Success => f.write_str("ok"),
            TorqueOutcome::CommError(e) => write!(f, "{} ({})", e, e.code()),
            TorqueOutcome::DeviceError(e) => write!(f, "{} (0x{:02X})", e, e.0),
        }
    }
}

/// Something worth reporting happened on the bus.
#[derive(Clone, Debug, PartialEq)]
pub enum BusEvent {
    /// The port is open and running at `baud_rate`.
    Connected {
        /// Device node.
        device_name: String,
        /// Line speed.
        baud_rate: u32,
    },
    /// `setup` failed.
    ConnectionFailed {
        /// Device node.
        device_name: String,
        /// Requested line speed.
        baud_rate: u32,
        /// Failed step.
        kind: ConnectionErrorKind,
        /// Transport error text.
        cause: String,
    },
    /// One torque write finished.
    TorqueSet {
        /// Target device.
        id: u8,
        /// Requested torque state.
        enable: bool,
        /// Result of the write.
        outcome: TorqueOutcome,
    },
    /// A sync transaction could not be built.
    ParamAddFailed {
        /// The error.
        error: ParamAddError,
    },
    /// A sync write went out.
    SyncWriteCompleted {
        /// Target register.
        address: u16,
        /// Number of devices written.
        count: usize,
    },
    /// A sync write could not be delivered.
    SyncWriteFailed {
        /// Target register.
        address: u16,
        /// The failure.
        error: CommError,
    },
    /// A device's telemetry was decoded.
    TelemetryRead {
        /// Source device.
        id: u8,
        /// Decoded values.
        reading: Telemetry,
    },
    /// A sync read failed.
    SyncReadFailed {
        /// The failure.
        error: ReadError,
    },
}

/// Receiver of [`BusEvent`]s.
pub trait EventSink: Send + Sync {
    /// Handle one event. Must not block for long: the bus is held meanwhile.
    fn emit(&self, event: &BusEvent);
}

impl<F> EventSink for F
where
    F: Fn(&BusEvent) + Send + Sync,
{
    fn emit(&self, event: &BusEvent) {
        self(event)
    }
}

/// Forwards events to the [`log`] facade.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: &BusEvent) {
        match event {
            BusEvent::Connected {
                device_name,
                baud_rate,
            } => log::info!("connected to {} at {} baud", device_name, baud_rate),
            BusEvent::ConnectionFailed {
                device_name,
                baud_rate,
                kind,
                cause,
            } => log::error!("{} {} at {} baud: {}", kind, device_name, baud_rate, cause),
            BusEvent::TorqueSet { id, enable, outcome } => {
                let state = if *enable { "on" } else { "off" };
                if outcome.is_success() {
                    log::info!("id {}: torque {}", id, state);
                } else {
                    log::warn!("id {}: torque {} failed: {}", id, state, outcome);
                }
            }
            BusEvent::ParamAddFailed { error } => log::error!("{}", error),
            BusEvent::SyncWriteCompleted { address, count } => {
                log::debug!("sync write at {} reached {} devices", address, count)
            }
            BusEvent::SyncWriteFailed { address, error } => {
                log::error!("sync write at {} failed: {} ({})", address, error, error.code())
            }
            BusEvent::TelemetryRead { id, reading } => log::debug!(
                "id {}: load {}, speed {}, position {}",
                id,
                reading.load,
                reading.speed,
                reading.position
            ),
            BusEvent::SyncReadFailed { error } => log::error!("sync read failed: {}", error),
        }
    }
}
