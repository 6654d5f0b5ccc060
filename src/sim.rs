//! Simulated buses for tests.

use std::collections::{BTreeMap, VecDeque};
use std::io;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::DeviceError;
use crate::port::Port;
use crate::protocol::{ReceivedInstruction, StatusPacket};

/// Replays canned input and records what is written.
pub(crate) struct ScriptedPort {
    input: VecDeque<u8>,
    written: Vec<u8>,
}

impl ScriptedPort {
    pub(crate) fn new(input: Vec<u8>) -> ScriptedPort {
        ScriptedPort {
            input: input.into(),
            written: Vec::new(),
        }
    }
    pub(crate) fn written(&self) -> &[u8] {
        &self.written
    }
    pub(crate) fn remaining(&self) -> Vec<u8> {
        self.input.iter().copied().collect()
    }
}

impl Port for ScriptedPort {
    fn open(&mut self, _device_name: &str) -> io::Result<()> {
        Ok(())
    }
    fn set_baud_rate(&mut self, _baud_rate: u32) -> io::Result<()> {
        Ok(())
    }
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.written.extend_from_slice(bytes);
        Ok(())
    }
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.input.len());
        for (slot, b) in buf.iter_mut().zip(self.input.drain(..n)) {
            *slot = b;
        }
        Ok(n)
    }
}

const TABLE_SIZE: usize = 256;

struct Device {
    table: Vec<u8>,
    error: u8,
    silent: bool,
}

impl Device {
    fn new() -> Device {
        Device {
            table: vec![0; TABLE_SIZE],
            error: 0,
            silent: false,
        }
    }
    fn write(&mut self, address: usize, data: &[u8]) {
        if let Some(slot) = self.table.get_mut(address..address + data.len()) {
            slot.copy_from_slice(data);
        }
    }
    fn status(&self, id: u8, parameters: Vec<u8>) -> Option<Vec<u8>> {
        if self.silent {
            return None;
        }
        let error = match self.error {
            0 => None,
            e => Some(DeviceError(e)),
        };
        Some(
            StatusPacket {
                id,
                error,
                parameters,
            }
            .to_bytes(),
        )
    }
}

#[derive(Default)]
struct SimState {
    devices: BTreeMap<u8, Device>,
    outbox: VecDeque<u8>,
    exchanges: Vec<Vec<u8>>,
    overlaps: usize,
    device_name: Option<String>,
    baud_rate: Option<u32>,
    missing_node: bool,
    rejected_baud: Option<u32>,
}

impl SimState {
    fn handle(&mut self, packet: &ReceivedInstruction) {
        let params = &packet.parameters;
        let address = |p: &[u8]| usize::from(pack!(p[0], p[1]));
        match packet.instruction {
            0x03 if params.len() >= 2 => {
                let response = self.devices.get_mut(&packet.id).and_then(|device| {
                    device.write(address(params), &params[2..]);
                    device.status(packet.id, vec![])
                });
                self.outbox.extend(response.into_iter().flatten());
            }
            0x83 if params.len() >= 4 => {
                let start = address(params);
                let len = usize::from(pack!(params[2], params[3]));
                for block in params[4..].chunks(len + 1) {
                    if let Some(device) = self.devices.get_mut(&block[0]) {
                        device.write(start, &block[1..]);
                    }
                }
            }
            0x82 if params.len() >= 4 => {
                let start = address(params);
                let len = usize::from(pack!(params[2], params[3]));
                for &id in &params[4..] {
                    let response = self
                        .devices
                        .get(&id)
                        .and_then(|device| device.status(id, device.table[start..start + len].to_vec()));
                    self.outbox.extend(response.into_iter().flatten());
                }
            }
            _ => {}
        }
    }
}

/// A bus of simulated X-series devices.
///
/// Clones share the same bus, so a test can keep a handle while the
/// controller owns another.
#[derive(Clone, Default)]
pub(crate) struct SimBus {
    state: Arc<Mutex<SimState>>,
}

impl SimBus {
    pub(crate) fn with_devices(ids: &[u8]) -> SimBus {
        let bus = SimBus::default();
        {
            let mut state = bus.state.lock();
            for &id in ids {
                state.devices.insert(id, Device::new());
            }
        }
        bus
    }
    pub(crate) fn set_register(&self, id: u8, address: u16, data: &[u8]) {
        if let Some(device) = self.state.lock().devices.get_mut(&id) {
            device.write(usize::from(address), data);
        }
    }
    pub(crate) fn register(&self, id: u8, address: u16, len: usize) -> Vec<u8> {
        let state = self.state.lock();
        let start = usize::from(address);
        state.devices[&id].table[start..start + len].to_vec()
    }
    /// The device stops answering.
    pub(crate) fn silence(&self, id: u8) {
        if let Some(device) = self.state.lock().devices.get_mut(&id) {
            device.silent = true;
        }
    }
    pub(crate) fn set_device_error(&self, id: u8, error: u8) {
        if let Some(device) = self.state.lock().devices.get_mut(&id) {
            device.error = error;
        }
    }
    pub(crate) fn remove_device_node(&self) {
        self.state.lock().missing_node = true;
    }
    pub(crate) fn reject_baud_rate(&self, baud_rate: u32) {
        self.state.lock().rejected_baud = Some(baud_rate);
    }
    pub(crate) fn opened(&self) -> Option<(String, u32)> {
        let state = self.state.lock();
        Some((state.device_name.clone()?, state.baud_rate?))
    }
    /// Instruction packets seen so far.
    pub(crate) fn exchanges(&self) -> Vec<ReceivedInstruction> {
        self.state
            .lock()
            .exchanges
            .iter()
            .filter_map(|bytes| ReceivedInstruction::from_bytes(bytes))
            .collect()
    }
    pub(crate) fn exchange_count(&self) -> usize {
        self.state.lock().exchanges.len()
    }
    /// Exchanges that started while a previous response was still unread.
    pub(crate) fn overlaps(&self) -> usize {
        self.state.lock().overlaps
    }
}

impl Port for SimBus {
    fn open(&mut self, device_name: &str) -> io::Result<()> {
        let mut state = self.state.lock();
        if state.missing_node {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{}: no such file or directory", device_name),
            ));
        }
        state.device_name = Some(device_name.to_string());
        Ok(())
    }
    fn set_baud_rate(&mut self, baud_rate: u32) -> io::Result<()> {
        let mut state = self.state.lock();
        if state.rejected_baud == Some(baud_rate) {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "unsupported baud rate"));
        }
        state.baud_rate = Some(baud_rate);
        Ok(())
    }
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut state = self.state.lock();
        if !state.outbox.is_empty() {
            state.overlaps += 1;
        }
        state.exchanges.push(bytes.to_vec());
        match ReceivedInstruction::from_bytes(bytes) {
            Some(packet) => state.handle(&packet),
            None => state.overlaps += 1,
        }
        Ok(())
    }
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        let n = buf.len().min(state.outbox.len());
        for (slot, b) in buf.iter_mut().zip(state.outbox.drain(..n)) {
            *slot = b;
        }
        Ok(n)
    }
}
