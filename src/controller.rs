use std::time::Duration;

use parking_lot::Mutex;

use crate::config::BusConfig;
use crate::error::{CommError, ConnectionError, ConnectionErrorKind, ParamAddError, ReadError, WriteError};
use crate::event::{BusEvent, EventSink, LogSink, TorqueOutcome};
use crate::motors::XL_430::{
    GoalPosition, PresentLoad, PresentPosition, PresentVelocity, TorqueEnable, TELEMETRY_SPAN, TORQUE_OFF,
    TORQUE_ON,
};
use crate::motors::Register;
use crate::port::Port;
use crate::protocol::{self, SyncRead, SyncWrite, MAX_ID, STATUS_PACKET_MIN_LEN};
use crate::telemetry::{Telemetry, TelemetryMap};

/// Payload width used for position commands.
pub const DEFAULT_PAYLOAD_WIDTH: u16 = 4;

/// Whether the port has been set up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// `setup` has not succeeded yet.
    Closed,
    /// The port is open at the configured baud rate.
    Open,
}

/// Snapshot of the bus connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Connection {
    /// Device node.
    pub device_name: String,
    /// Line speed.
    pub baud_rate: u32,
    /// Open or closed.
    pub state: ConnectionState,
}

struct Bus<P> {
    port: P,
    connection: Connection,
}

impl<P: Port> Bus<P> {
    fn port(&mut self) -> Result<&mut P, CommError> {
        match self.connection.state {
            ConnectionState::Open => Ok(&mut self.port),
            ConnectionState::Closed => Err(CommError::NotAvailable),
        }
    }
    fn write(&mut self, id: u8, address: u16, data: &[u8], timeout: Duration) -> TorqueOutcome {
        if id > MAX_ID {
            return TorqueOutcome::CommError(CommError::TxError);
        }
        let status = self
            .port()
            .and_then(|port| protocol::write_tx_rx(port, id, address, data, timeout));
        match status {
            Err(e) => TorqueOutcome::CommError(e),
            Ok(status) => match status.error {
                Some(e) => TorqueOutcome::DeviceError(e),
                None => TorqueOutcome::Success,
            },
        }
    }
}

/// Drives a chain of Dynamixel actuators over one half-duplex bus.
///
/// The controller owns the port behind a mutex: every operation holds it
/// from the first parameter it builds to the last byte it receives, so a
/// `Controller` can be shared between threads (e.g. in an `Arc`) and
/// exchanges never interleave on the wire. Nothing is retried.
pub struct Controller<P> {
    bus: Mutex<Bus<P>>,
    config: BusConfig,
    events: Box<dyn EventSink>,
}

impl<P: Port> Controller<P> {
    /// Controller reporting through the `log` facade.
    pub fn new(port: P, config: BusConfig) -> Controller<P> {
        Controller::with_event_sink(port, config, LogSink)
    }
    /// Controller reporting to `events`.
    pub fn with_event_sink<S>(port: P, config: BusConfig, events: S) -> Controller<P>
    where
        S: EventSink + 'static,
    {
        let connection = Connection {
            device_name: config.device_name.clone(),
            baud_rate: config.baud_rate,
            state: ConnectionState::Closed,
        };
        Controller {
            bus: Mutex::new(Bus { port, connection }),
            config,
            events: Box::new(events),
        }
    }
    /// Bus configuration.
    pub fn config(&self) -> &BusConfig {
        &self.config
    }
    /// Current connection state.
    pub fn connection(&self) -> Connection {
        self.bus.lock().connection.clone()
    }
    /// Open the port and set its baud rate.
    ///
    /// Fails without retrying. A failure closes the bus, even one that was
    /// open before, until a later `setup` succeeds.
    pub fn setup(&self) -> Result<(), ConnectionError> {
        let mut bus = self.bus.lock();
        let device_name = self.config.device_name.clone();
        let baud_rate = self.config.baud_rate;

        let result = bus
            .port
            .open(&device_name)
            .map_err(|cause| (ConnectionErrorKind::OpenFailed, cause))
            .and_then(|()| {
                bus.port
                    .set_baud_rate(baud_rate)
                    .map_err(|cause| (ConnectionErrorKind::BaudRateRejected, cause))
            });

        match result {
            Ok(()) => {
                bus.connection.state = ConnectionState::Open;
                self.events.emit(&BusEvent::Connected {
                    device_name,
                    baud_rate,
                });
                Ok(())
            }
            Err((kind, cause)) => {
                bus.connection.state = ConnectionState::Closed;
                self.events.emit(&BusEvent::ConnectionFailed {
                    device_name: device_name.clone(),
                    baud_rate,
                    kind,
                    cause: cause.to_string(),
                });
                Err(ConnectionError {
                    kind,
                    device_name,
                    baud_rate,
                    cause,
                })
            }
        }
    }
    /// Turn torque on for each of `ids`, in order.
    ///
    /// One write per device; a failing device does not stop the batch.
    pub fn enable_torque(&self, ids: &[u8]) -> Vec<(u8, TorqueOutcome)> {
        self.set_torque(ids, true)
    }
    /// Turn torque off for each of `ids`, in order.
    pub fn disable_torque(&self, ids: &[u8]) -> Vec<(u8, TorqueOutcome)> {
        self.set_torque(ids, false)
    }
    fn set_torque(&self, ids: &[u8], enable: bool) -> Vec<(u8, TorqueOutcome)> {
        let mut bus = self.bus.lock();
        let value = if enable { TORQUE_ON } else { TORQUE_OFF };
        let timeout = self.config.packet_timeout(STATUS_PACKET_MIN_LEN);

        let mut outcomes = Vec::with_capacity(ids.len());
        for &id in ids {
            let outcome = bus.write(id, TorqueEnable.address(), &[value], timeout);
            self.events.emit(&BusEvent::TorqueSet { id, enable, outcome });
            outcomes.push((id, outcome));
        }
        outcomes
    }
    /// Write `values[i]` to `ids[i]` at `address`, all in one packet.
    ///
    /// Each value is sent as `width` (1, 2 or 4) little-endian bytes. The
    /// packet either goes out whole or not at all: any bad id or value
    /// aborts before transmission, and an empty batch is not sent at all
    /// ([`CommError::NotAvailable`]). Devices do not acknowledge a sync
    /// write, so device-side errors are not reported.
    pub fn sync_write(&self, ids: &[u8], values: &[u32], address: u16, width: u16) -> Result<(), WriteError> {
        let mut bus = self.bus.lock();

        let mut transaction = SyncWrite::new(address, width);
        if let Err(error) = populate_sync_write(&mut transaction, ids, values, width) {
            transaction.abort();
            self.events.emit(&BusEvent::ParamAddFailed { error });
            return Err(error.into());
        }

        let count = transaction.len();
        let result = bus.port().and_then(|port| transaction.tx_packet(port));
        transaction.clear();

        match result {
            Ok(()) => {
                self.events.emit(&BusEvent::SyncWriteCompleted { address, count });
                Ok(())
            }
            Err(error) => {
                self.events.emit(&BusEvent::SyncWriteFailed { address, error });
                Err(error.into())
            }
        }
    }
    /// Send goal positions to `ids` in one packet.
    pub fn sync_write_goal_position(&self, ids: &[u8], positions: &[i32]) -> Result<(), WriteError> {
        let values: Vec<u32> = positions.iter().map(|&p| p as u32).collect();
        self.sync_write(ids, &values, GoalPosition.address(), DEFAULT_PAYLOAD_WIDTH)
    }
    /// Read load, speed and position of every device in `ids` with one exchange.
    ///
    /// Either every device answers or the whole read fails. An empty `ids`
    /// fails with [`CommError::NotAvailable`] without touching the bus.
    pub fn sync_read(&self, ids: &[u8]) -> Result<TelemetryMap, ReadError> {
        let mut bus = self.bus.lock();

        let mut request = SyncRead::new(PresentLoad.address(), TELEMETRY_SPAN);
        for &id in ids {
            if let Err(error) = request.add_param(id) {
                request.abort();
                self.events.emit(&BusEvent::ParamAddFailed { error });
                return Err(error.into());
            }
        }

        let timeout = self
            .config
            .packet_timeout(STATUS_PACKET_MIN_LEN + usize::from(TELEMETRY_SPAN));
        let result = bus
            .port()
            .and_then(|port| request.tx_rx_packet(port, timeout))
            .map_err(ReadError::from)
            .and_then(|()| self.collect_telemetry(&request, ids));
        request.clear();

        if let Err(error) = &result {
            self.events.emit(&BusEvent::SyncReadFailed { error: *error });
        }
        result
    }
    fn collect_telemetry(&self, request: &SyncRead, ids: &[u8]) -> Result<TelemetryMap, ReadError> {
        let mut readings = TelemetryMap::with_capacity(ids.len());
        for &id in ids {
            let field = |register: &dyn Register| {
                request
                    .get_data(id, register.address(), register.length())
                    .ok_or(ReadError::MissingData(id))
            };
            let reading = Telemetry {
                load: field(&PresentLoad)? as u16,
                speed: field(&PresentVelocity)?,
                position: field(&PresentPosition)?,
            };
            self.events.emit(&BusEvent::TelemetryRead { id, reading });
            readings.insert(id, reading);
        }
        Ok(readings)
    }
}

fn populate_sync_write(
    transaction: &mut SyncWrite,
    ids: &[u8],
    values: &[u32],
    width: u16,
) -> Result<(), ParamAddError> {
    if !matches!(width, 1 | 2 | 4) {
        return Err(ParamAddError::UnsupportedWidth(width));
    }
    if values.len() > ids.len() {
        return Err(ParamAddError::UnmatchedPayloads(values.len() - ids.len()));
    }
    if let Some(&id) = ids.get(values.len()) {
        return Err(ParamAddError::MissingPayload(id));
    }
    for (&id, &value) in ids.iter().zip(values) {
        let data = encode_value(value, width).ok_or(ParamAddError::ValueOutOfRange { id, value, width })?;
        transaction.add_param(id, &data)?;
    }
    Ok(())
}

/// Little-endian bytes of `value`, `None` if it needs more than `width` bytes.
fn encode_value(value: u32, width: u16) -> Option<Vec<u8>> {
    let bytes = value.to_le_bytes();
    let width = usize::from(width);
    if bytes[width..].iter().any(|&b| b != 0) {
        return None;
    }
    Some(bytes[..width].to_vec())
}
