//! Multi-device transactions: one packet, many devices.

use std::time::Duration;

use super::v2::{self, InstructionPacket, MAX_ID, RXPACKET_MAX_LEN, STATUS_PACKET_MIN_LEN, TXPACKET_MAX_LEN};
use crate::error::{CommError, ParamAddError};
use crate::port::Port;

/// Lifecycle of a sync transaction.
///
/// `Empty → Populating → Transmitted → Cleared`, or `Aborted` when a
/// parameter could not be added. An aborted transaction never reaches the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionState {
    /// Nothing added yet.
    Empty,
    /// Parameters are being added.
    Populating,
    /// The packet went out.
    Transmitted,
    /// Parameters were dropped; the transaction may be populated again.
    Cleared,
    /// Populating failed; nothing was sent.
    Aborted,
}

fn check_id(id: u8) -> Result<(), ParamAddError> {
    if id > MAX_ID {
        return Err(ParamAddError::InvalidId(id));
    }
    Ok(())
}

/// Writes the same register range on several devices with one packet.
#[derive(Debug)]
pub struct SyncWrite {
    address: u16,
    data_length: u16,
    params: Vec<(u8, Vec<u8>)>,
    state: TransactionState,
}

impl SyncWrite {
    /// A transaction writing `data_length` bytes at `address`.
    pub fn new(address: u16, data_length: u16) -> SyncWrite {
        SyncWrite {
            address,
            data_length,
            params: Vec::new(),
            state: TransactionState::Empty,
        }
    }
    /// Current lifecycle state.
    pub fn state(&self) -> TransactionState {
        self.state
    }
    /// Number of devices in the transaction.
    pub fn len(&self) -> usize {
        self.params.len()
    }
    /// `true` when no device has been added.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
    /// Queue `data` for device `id`.
    ///
    /// `data` must be exactly `data_length` bytes and `id` must not already
    /// be part of the transaction. The packet, byte stuffing included, must
    /// still fit in 1024 bytes once `data` is added.
    pub fn add_param(&mut self, id: u8, data: &[u8]) -> Result<(), ParamAddError> {
        check_id(id)?;
        if data.len() != usize::from(self.data_length) {
            return Err(ParamAddError::PayloadWidth {
                id,
                expected: self.data_length,
                actual: data.len(),
            });
        }
        if self.params.iter().any(|(i, _)| *i == id) {
            return Err(ParamAddError::Duplicate(id));
        }

        self.params.push((id, data.to_vec()));
        if self.packet().encoded_len() > TXPACKET_MAX_LEN {
            self.params.pop();
            return Err(ParamAddError::Capacity(id));
        }
        self.state = TransactionState::Populating;
        Ok(())
    }
    /// Drop every parameter after a failed [`add_param`](SyncWrite::add_param).
    pub fn abort(&mut self) {
        self.params.clear();
        self.state = TransactionState::Aborted;
    }
    /// Drop every parameter so the transaction can be populated again.
    pub fn clear(&mut self) {
        self.params.clear();
        self.state = TransactionState::Cleared;
    }
    /// Broadcast the packet. Devices do not answer a sync write.
    pub fn tx_packet<P>(&mut self, port: &mut P) -> Result<(), CommError>
    where
        P: Port + ?Sized,
    {
        if self.params.is_empty() || self.state != TransactionState::Populating {
            return Err(CommError::NotAvailable);
        }
        v2::tx_packet(port, &self.packet())?;
        self.state = TransactionState::Transmitted;
        Ok(())
    }
    fn packet(&self) -> InstructionPacket {
        let mut bytes = Vec::with_capacity(self.params.len() * (1 + usize::from(self.data_length)));
        for (id, data) in &self.params {
            bytes.push(*id);
            bytes.extend(data);
        }
        InstructionPacket::sync_write(self.address, self.data_length, &bytes)
    }
}

/// Reads the same register range from several devices with one request.
#[derive(Debug)]
pub struct SyncRead {
    address: u16,
    data_length: u16,
    ids: Vec<u8>,
    data: Vec<(u8, Vec<u8>)>,
    state: TransactionState,
}

impl SyncRead {
    /// A request reading `data_length` bytes from `address`.
    pub fn new(address: u16, data_length: u16) -> SyncRead {
        SyncRead {
            address,
            data_length,
            ids: Vec::new(),
            data: Vec::new(),
            state: TransactionState::Empty,
        }
    }
    /// Current lifecycle state.
    pub fn state(&self) -> TransactionState {
        self.state
    }
    /// Number of devices in the request.
    pub fn len(&self) -> usize {
        self.ids.len()
    }
    /// `true` when no device has been added.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
    /// Ask device `id` for its data.
    pub fn add_param(&mut self, id: u8) -> Result<(), ParamAddError> {
        check_id(id)?;
        if self.ids.contains(&id) {
            return Err(ParamAddError::Duplicate(id));
        }
        if STATUS_PACKET_MIN_LEN + usize::from(self.data_length) > RXPACKET_MAX_LEN {
            return Err(ParamAddError::Capacity(id));
        }

        self.ids.push(id);
        if self.packet().encoded_len() > TXPACKET_MAX_LEN {
            self.ids.pop();
            return Err(ParamAddError::Capacity(id));
        }
        self.state = TransactionState::Populating;
        Ok(())
    }
    /// Drop every parameter after a failed [`add_param`](SyncRead::add_param).
    pub fn abort(&mut self) {
        self.ids.clear();
        self.data.clear();
        self.state = TransactionState::Aborted;
    }
    /// Drop every parameter and received data.
    pub fn clear(&mut self) {
        self.ids.clear();
        self.data.clear();
        self.state = TransactionState::Cleared;
    }
    /// Send the request and collect one status packet per device, in order.
    ///
    /// `timeout` bounds the wait for each response. Any missing or corrupt
    /// response fails the whole exchange.
    pub fn tx_rx_packet<P>(&mut self, port: &mut P, timeout: Duration) -> Result<(), CommError>
    where
        P: Port + ?Sized,
    {
        if self.ids.is_empty() || self.state != TransactionState::Populating {
            return Err(CommError::NotAvailable);
        }
        self.data.clear();

        v2::tx_packet(port, &self.packet())?;
        self.state = TransactionState::Transmitted;

        let mut data = Vec::with_capacity(self.ids.len());
        for &id in &self.ids {
            // device error bits are not reported per device by sync read
            let status = v2::rx_packet(port, id, timeout)?;
            data.push((id, status.parameters));
        }
        self.data = data;
        Ok(())
    }
    fn packet(&self) -> InstructionPacket {
        InstructionPacket::sync_read(self.address, self.data_length, &self.ids)
    }
    /// `true` if `length` bytes at `address` were received from `id`.
    pub fn is_available(&self, id: u8, address: u16, length: u16) -> bool {
        self.slice(id, address, length).is_some()
    }
    /// Little-endian value of `length` (1, 2 or 4) bytes at `address` from `id`.
    pub fn get_data(&self, id: u8, address: u16, length: u16) -> Option<u32> {
        let bytes = self.slice(id, address, length)?;
        match length {
            1 => Some(u32::from(bytes[0])),
            2 => Some(u32::from(pack!(bytes[0], bytes[1]))),
            4 => Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
            _ => None,
        }
    }
    fn slice(&self, id: u8, address: u16, length: u16) -> Option<&[u8]> {
        let end = u32::from(address) + u32::from(length);
        if address < self.address || end > u32::from(self.address) + u32::from(self.data_length) {
            return None;
        }
        let (_, data) = self.data.iter().find(|(i, _)| *i == id)?;
        let offset = usize::from(address - self.address);
        data.get(offset..offset + usize::from(length))
    }
}
