use std::fmt;
use std::io;

use thiserror::Error;

/// Result code reported by a successful exchange.
pub const COMM_SUCCESS: i32 = 0;

/// Why `setup` could not bring the bus up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// The device node could not be opened.
    OpenFailed,
    /// The port refused the requested baud rate.
    BaudRateRejected,
}

impl fmt::Display for ConnectionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionErrorKind::OpenFailed => f.write_str("failed to open port"),
            ConnectionErrorKind::BaudRateRejected => f.write_str("baud rate rejected"),
        }
    }
}

/// Failure of a connection setup attempt.
#[derive(Debug, Error)]
#[error("{kind} {device_name} at {baud_rate} baud")]
pub struct ConnectionError {
    /// What went wrong.
    pub kind: ConnectionErrorKind,
    /// Device node that was being configured.
    pub device_name: String,
    /// Requested baud rate.
    pub baud_rate: u32,
    /// Underlying transport error.
    #[source]
    pub cause: io::Error,
}

/// Communication-layer failure of one exchange.
///
/// Codes follow the Robotis SDK numbering so that logs can be compared
/// against other tooling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum CommError {
    /// The port rejected the outgoing bytes.
    #[error("[TxRxResult] Failed transmit instruction packet!")]
    TxFail,
    /// The port failed while receiving.
    #[error("[TxRxResult] Failed get status packet from device!")]
    RxFail,
    /// The instruction packet could not be built.
    #[error("[TxRxResult] Incorrect instruction packet!")]
    TxError,
    /// Nothing was received before the packet timeout.
    #[error("[TxRxResult] There is no status packet!")]
    RxTimeout,
    /// Bytes were received but did not form a valid status packet.
    #[error("[TxRxResult] Incorrect status packet!")]
    RxCorrupt,
    /// The port is not open.
    #[error("[TxRxResult] Port is not available!")]
    NotAvailable,
}

impl CommError {
    /// Numeric result code, never [`COMM_SUCCESS`].
    pub fn code(&self) -> i32 {
        match self {
            CommError::TxFail => -1001,
            CommError::RxFail => -1002,
            CommError::TxError => -2000,
            CommError::RxTimeout => -3001,
            CommError::RxCorrupt => -3002,
            CommError::NotAvailable => -9000,
        }
    }
    /// Decode a numeric result code. `None` for success and unknown codes.
    pub fn from_code(code: i32) -> Option<CommError> {
        match code {
            -1001 => Some(CommError::TxFail),
            -1002 => Some(CommError::RxFail),
            -2000 => Some(CommError::TxError),
            -3001 => Some(CommError::RxTimeout),
            -3002 => Some(CommError::RxCorrupt),
            -9000 => Some(CommError::NotAvailable),
            _ => None,
        }
    }
}

/// Error byte reported by a device in its status packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceError(pub u8);

impl DeviceError {
    const ALERT: u8 = 0x80;

    /// The device flags a hardware error (overload, overheating, voltage...).
    pub fn is_alert(&self) -> bool {
        self.0 & Self::ALERT != 0
    }
    /// Error number without the alert bit.
    pub fn code(&self) -> u8 {
        self.0 & !Self::ALERT
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_alert() {
            f.write_str("[RxPacketError] Hardware error occurred. Check the error at Control Table (Hardware Error Status)!")?;
            if self.code() == 0 {
                return Ok(());
            }
            f.write_str(" ")?;
        }
        let text = match self.code() {
            1 => "[RxPacketError] Failed to process the instruction packet!",
            2 => "[RxPacketError] Undefined instruction or incorrect instruction!",
            3 => "[RxPacketError] CRC doesn't match!",
            4 => "[RxPacketError] The data value is out of range!",
            5 => "[RxPacketError] The data length does not match as expected!",
            6 => "[RxPacketError] The data value exceeds the limit value!",
            7 => "[RxPacketError] Writing or Reading is not available to target address!",
            _ => "[RxPacketError] Unknown error code!",
        };
        f.write_str(text)
    }
}

impl std::error::Error for DeviceError {}

/// Local failure while populating a sync transaction. Nothing was sent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum ParamAddError {
    /// The id is already part of the transaction.
    #[error("id {0} is already in the transaction")]
    Duplicate(u8),
    /// The id cannot address a single device.
    #[error("id {0} is not a device id")]
    InvalidId(u8),
    /// The id has no value to write.
    #[error("no value given for id {0}")]
    MissingPayload(u8),
    /// More values than ids were given.
    #[error("{0} values have no matching id")]
    UnmatchedPayloads(usize),
    /// The payload width is not 1, 2 or 4 bytes.
    #[error("unsupported payload width {0}")]
    UnsupportedWidth(u16),
    /// The payload does not have the declared width.
    #[error("payload for id {id} is {actual} bytes, expected {expected}")]
    PayloadWidth {
        /// Target device.
        id: u8,
        /// Declared width.
        expected: u16,
        /// Given width.
        actual: usize,
    },
    /// The value does not fit in the payload width.
    #[error("value {value} for id {id} does not fit in {width} bytes")]
    ValueOutOfRange {
        /// Target device.
        id: u8,
        /// Rejected value.
        value: u32,
        /// Payload width.
        width: u16,
    },
    /// The packet would exceed the maximum packet length.
    #[error("no room left in the packet for id {0}")]
    Capacity(u8),
}

impl ParamAddError {
    /// The device the failure is attributed to, if any.
    pub fn id(&self) -> Option<u8> {
        match *self {
            ParamAddError::Duplicate(id)
            | ParamAddError::InvalidId(id)
            | ParamAddError::MissingPayload(id)
            | ParamAddError::Capacity(id)
            | ParamAddError::PayloadWidth { id, .. }
            | ParamAddError::ValueOutOfRange { id, .. } => Some(id),
            ParamAddError::UnmatchedPayloads(_) | ParamAddError::UnsupportedWidth(_) => None,
        }
    }
}

/// Failure of a sync write.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum WriteError {
    /// The transaction could not be built; nothing was sent.
    #[error("sync write aborted: {0}")]
    ParamAdd(#[from] ParamAddError),
    /// The packet could not be delivered.
    #[error("sync write failed: {0}")]
    CommFailure(#[from] CommError),
}

/// Failure of a sync read.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum ReadError {
    /// The request could not be built; nothing was sent.
    #[error("sync read aborted: {0}")]
    ParamAdd(#[from] ParamAddError),
    /// The exchange failed.
    #[error("sync read failed: {0}")]
    CommFailure(#[from] CommError),
    /// A device answered with fewer bytes than requested.
    #[error("incomplete data from id {0}")]
    MissingData(u8),
}
