use std::time::{Duration, Instant};

use crate::error::{CommError, DeviceError};
use crate::port::Port;

/// Addresses every device; used by the sync instructions.
pub(crate) const BROADCAST_ID: u8 = 0xFE;
/// Highest id a single device can have.
pub(crate) const MAX_ID: u8 = 0xFC;
pub(crate) const TXPACKET_MAX_LEN: usize = 1024;
pub(crate) const RXPACKET_MAX_LEN: usize = 1024;
/// Status packet carrying no parameters.
pub(crate) const STATUS_PACKET_MIN_LEN: usize = 11;

const HEADER: [u8; 4] = [0xFF, 0xFF, 0xFD, 0x00];
const STUFFING_PATTERN: [u8; 3] = [0xFF, 0xFF, 0xFD];
const STATUS: u8 = 0x55;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Instruction {
    WriteData = 0x03,
    SyncRead = 0x82,
    SyncWrite = 0x83,
}

/// Packet header are constructed as follows [0xFF, 0xFF, 0xFD, 0x00, ID, `LEN_L`, `LEN_H`]
#[derive(Debug)]
struct PacketHeader {
    _id: u8,
    length: u16,
}
impl PacketHeader {
    fn from_bytes(bytes: &[u8]) -> Option<PacketHeader> {
        if bytes.len() < PacketHeader::length() || bytes[..4] != HEADER {
            return None;
        }

        Some(PacketHeader {
            _id: bytes[4],
            length: pack!(bytes[5], bytes[6]),
        })
    }
    const fn length() -> usize {
        7
    }
}

#[derive(Debug)]
pub(crate) struct InstructionPacket {
    id: u8,
    instruction: Instruction,
    parameters: Vec<u8>,
}
impl InstructionPacket {
    fn new(id: u8, instruction: Instruction, parameters: Vec<u8>) -> InstructionPacket {
        InstructionPacket {
            id,
            instruction,
            parameters,
        }
    }
    /// Write `data` starting at `addr` on a single device.
    pub(crate) fn write_data(id: u8, addr: u16, data: &[u8]) -> InstructionPacket {
        let (addr_l, addr_h) = unpack!(addr);

        let mut parameters = vec![addr_l, addr_h];
        parameters.extend_from_slice(data);

        InstructionPacket::new(id, Instruction::WriteData, parameters)
    }
    /// `params` is the concatenation of `[ID, DATA...]` blocks.
    pub(crate) fn sync_write(addr: u16, len: u16, params: &[u8]) -> InstructionPacket {
        let (addr_l, addr_h) = unpack!(addr);
        let (len_l, len_h) = unpack!(len);

        let mut parameters = vec![addr_l, addr_h, len_l, len_h];
        parameters.extend_from_slice(params);

        InstructionPacket::new(BROADCAST_ID, Instruction::SyncWrite, parameters)
    }
    pub(crate) fn sync_read(addr: u16, len: u16, ids: &[u8]) -> InstructionPacket {
        let (addr_l, addr_h) = unpack!(addr);
        let (len_l, len_h) = unpack!(len);

        let mut parameters = vec![addr_l, addr_h, len_l, len_h];
        parameters.extend_from_slice(ids);

        InstructionPacket::new(BROADCAST_ID, Instruction::SyncRead, parameters)
    }
    /// [0xFF, 0xFF, 0xFD, 0x00, ID, LEN_L, LEN_H, INST, PARAM 1, PARAM 2, ..., PARAM N, CRC_L, CRC_H]
    pub(crate) fn as_bytes(&self) -> Vec<u8> {
        let body = self.stuffed_body();

        // instruction and parameters, plus the CRC
        let length = (body.len() + 2) as u16;
        let (len_l, len_h) = unpack!(length);

        let mut buff = Vec::with_capacity(PacketHeader::length() + body.len() + 2);
        buff.extend(&HEADER);
        buff.extend(&[self.id, len_l, len_h]);
        buff.extend(body);

        let (crc_l, crc_h) = unpack!(crc(&buff));
        buff.push(crc_l);
        buff.push(crc_h);

        buff
    }
    /// Size of the packet on the wire, stuffing included.
    pub(crate) fn encoded_len(&self) -> usize {
        PacketHeader::length() + self.stuffed_body().len() + 2
    }
    fn stuffed_body(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(self.parameters.len() + 1);
        body.push(self.instruction as u8);
        body.extend(&self.parameters);
        stuff(&body)
    }
}

/// An instruction packet as seen by a device.
#[cfg(test)]
#[derive(Debug)]
pub(crate) struct ReceivedInstruction {
    pub(crate) id: u8,
    pub(crate) instruction: u8,
    pub(crate) parameters: Vec<u8>,
}

#[cfg(test)]
impl ReceivedInstruction {
    /// Parse one complete instruction packet.
    pub(crate) fn from_bytes(bytes: &[u8]) -> Option<ReceivedInstruction> {
        let header = PacketHeader::from_bytes(bytes)?;
        let end = PacketHeader::length() + header.length as usize;
        if bytes.len() != end || header.length < 3 {
            return None;
        }
        if crc(&bytes[..end - 2]) != pack!(bytes[end - 2], bytes[end - 1]) {
            return None;
        }
        let body = destuff(&bytes[PacketHeader::length()..end - 2]);
        Some(ReceivedInstruction {
            id: bytes[4],
            instruction: body[0],
            parameters: body[1..].to_vec(),
        })
    }
}

/// Status Packet are constructed as follows:
/// [0xFF, 0xFF, 0xFD, 0x00, ID, `LEN_L`, `LEN_H`, 0x55, ERROR, PARAM 1, PARAM 2, ..., PARAM N, `CRC_L`, `CRC_H`]
#[derive(Debug)]
pub(crate) struct StatusPacket {
    pub(crate) id: u8,
    pub(crate) error: Option<DeviceError>,
    pub(crate) parameters: Vec<u8>,
}
impl StatusPacket {
    fn from_bytes(bytes: &[u8]) -> Result<StatusPacket, CommError> {
        let end = bytes.len();
        if end < STATUS_PACKET_MIN_LEN {
            return Err(CommError::RxCorrupt);
        }
        if crc(&bytes[..end - 2]) != pack!(bytes[end - 2], bytes[end - 1]) {
            return Err(CommError::RxCorrupt);
        }
        if bytes[7] != STATUS {
            return Err(CommError::RxCorrupt);
        }

        let body = destuff(&bytes[7..end - 2]);
        let error = match body[1] {
            0 => None,
            e => Some(DeviceError(e)),
        };
        Ok(StatusPacket {
            id: bytes[4],
            error,
            parameters: body[2..].to_vec(),
        })
    }
    #[cfg(test)]
    pub(crate) fn to_bytes(&self) -> Vec<u8> {
        let mut body = vec![STATUS, self.error.map_or(0, |e| e.0)];
        body.extend(&self.parameters);
        let body = stuff(&body);

        let length = (body.len() + 2) as u16;
        let (len_l, len_h) = unpack!(length);
        let mut bytes = HEADER.to_vec();
        bytes.extend(&[self.id, len_l, len_h]);
        bytes.extend(body);
        let (crc_l, crc_h) = unpack!(crc(&bytes));
        bytes.extend(vec![crc_l, crc_h]);
        bytes
    }
}

/// Send one instruction packet.
pub(crate) fn tx_packet<P>(port: &mut P, packet: &InstructionPacket) -> Result<(), CommError>
where
    P: Port + ?Sized,
{
    let bytes = packet.as_bytes();
    if bytes.len() > TXPACKET_MAX_LEN {
        return Err(CommError::TxError);
    }
    port.clear_input().map_err(|_| CommError::TxFail)?;
    port.write_all(&bytes).map_err(|_| CommError::TxFail)
}

/// Receive the status packet sent by `id`.
///
/// Garbage before a header and packets from other devices are skipped.
/// Never reads past the end of the packet it returns, so consecutive
/// responses of one exchange can be collected with consecutive calls.
pub(crate) fn rx_packet<P>(port: &mut P, id: u8, timeout: Duration) -> Result<StatusPacket, CommError>
where
    P: Port + ?Sized,
{
    let deadline = Instant::now() + timeout;
    let mut bytes: Vec<u8> = Vec::with_capacity(STATUS_PACKET_MIN_LEN);
    let mut chunk = [0u8; 64];
    let mut expired = false;

    loop {
        match find_header(&bytes) {
            Some(0) => {}
            Some(start) => {
                bytes.drain(..start);
            }
            None => {
                // keep a possible partial header
                let cut = bytes.len().saturating_sub(HEADER.len() - 1);
                bytes.drain(..cut);
            }
        }

        let wanted = match PacketHeader::from_bytes(&bytes) {
            Some(header) => {
                let total = PacketHeader::length() + header.length as usize;
                if total > RXPACKET_MAX_LEN || total < STATUS_PACKET_MIN_LEN {
                    // not a real header, resync past it
                    bytes.remove(0);
                    continue;
                }
                if bytes.len() >= total {
                    let packet = StatusPacket::from_bytes(&bytes[..total])?;
                    if packet.id == id {
                        return Ok(packet);
                    }
                    bytes.drain(..total);
                    continue;
                }
                total
            }
            None => PacketHeader::length(),
        };

        // the last read before the deadline still gets parsed
        if expired {
            return Err(if bytes.is_empty() {
                CommError::RxTimeout
            } else {
                CommError::RxCorrupt
            });
        }
        let room = (wanted - bytes.len()).min(chunk.len());
        let n = port.read(&mut chunk[..room]).map_err(|_| CommError::RxFail)?;
        bytes.extend_from_slice(&chunk[..n]);
        expired = Instant::now() >= deadline;
    }
}

/// Write `data` at `addr` on device `id` and wait for its acknowledgment.
pub(crate) fn write_tx_rx<P>(
    port: &mut P,
    id: u8,
    addr: u16,
    data: &[u8],
    timeout: Duration,
) -> Result<StatusPacket, CommError>
where
    P: Port + ?Sized,
{
    tx_packet(port, &InstructionPacket::write_data(id, addr, data))?;
    rx_packet(port, id, timeout)
}

fn find_header(bytes: &[u8]) -> Option<usize> {
    bytes.windows(HEADER.len()).position(|w| w == HEADER)
}

fn stuff(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len());
    for (i, &b) in body.iter().enumerate() {
        out.push(b);
        if i >= 2 && body[i - 2..=i] == STUFFING_PATTERN {
            out.push(0xFD);
        }
    }
    out
}

fn destuff(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len());
    let mut i = 0;
    while i < body.len() {
        out.push(body[i]);
        if i >= 2 && body[i - 2..=i] == STUFFING_PATTERN && body.get(i + 1) == Some(&0xFD) {
            i += 1;
        }
        i += 1;
    }
    out
}

fn crc(bytes: &[u8]) -> u16 {
    crc16::State::<crc16::BUYPASS>::calculate(bytes)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sim::ScriptedPort;
    use rand::{random, Rng};

    #[test]
    fn parse_status_packet() {
        let bytes = [0xFF, 0xFF, 0xFD, 0x00, 42, 6, 0, 0x55, 0, 0, 23, 4, 242];
        let sp = StatusPacket::from_bytes(&bytes).unwrap();
        assert_eq!(sp.id, 42, "check id");
        assert!(sp.error.is_none(), "check error code");
        assert_eq!(sp.parameters, vec![0, 23], "check parameters");
    }
    #[test]
    fn parse_random_status_packet() {
        let rp = random_status_packet();
        let bytes = rp.to_bytes();

        let sp = StatusPacket::from_bytes(&bytes).unwrap();
        assert_eq!(sp.id, rp.id, "check id");
        assert_eq!(sp.error, rp.error, "check error code");
        assert_eq!(sp.parameters, rp.parameters, "check parameters");
    }
    #[test]
    fn status_error() {
        let error: u8 = random();
        let error = if error == 0 { 1 } else { error };
        let mut bytes = vec![0xFF, 0xFF, 0xFD, 0x00, 42, 6, 0, 0x55, error, 0, 23];
        let crc = crc(&bytes);
        let (crc_l, crc_h) = unpack!(crc);
        bytes.extend(vec![crc_l, crc_h]);
        let sp = StatusPacket::from_bytes(&bytes).unwrap();

        assert_eq!(sp.error, Some(DeviceError(error)));
    }
    #[test]
    fn bad_checksum() {
        let bytes = [0xFF, 0xFF, 0xFD, 0x00, 42, 6, 0, 0x55, 0, 0, 23, 4, 243];
        assert_eq!(StatusPacket::from_bytes(&bytes).unwrap_err(), CommError::RxCorrupt);
    }
    #[test]
    fn write_packet() {
        // goal position 512 on id 1
        let packet = InstructionPacket::write_data(1, 116, &512u32.to_le_bytes());
        assert_eq!(
            packet.as_bytes(),
            vec![0xFF, 0xFF, 0xFD, 0x00, 0x01, 0x09, 0x00, 0x03, 0x74, 0x00, 0x00, 0x02, 0x00, 0x00, 0xCA, 0x89]
        );
    }
    #[test]
    fn sync_write_packet() {
        let params = [0x01, 0x96, 0x00, 0x00, 0x00, 0x02, 0xAA, 0x00, 0x00, 0x00];
        let packet = InstructionPacket::sync_write(116, 4, &params);
        assert_eq!(
            packet.as_bytes(),
            vec![
                0xFF, 0xFF, 0xFD, 0x00, 0xFE, 0x11, 0x00, 0x83, 0x74, 0x00, 0x04, 0x00, 0x01, 0x96, 0x00,
                0x00, 0x00, 0x02, 0xAA, 0x00, 0x00, 0x00, 0x82, 0x87
            ]
        );
    }
    #[test]
    fn sync_read_packet() {
        let packet = InstructionPacket::sync_read(132, 4, &[1, 2]);
        assert_eq!(
            packet.as_bytes(),
            vec![0xFF, 0xFF, 0xFD, 0x00, 0xFE, 0x09, 0x00, 0x82, 0x84, 0x00, 0x04, 0x00, 0x01, 0x02, 0xCE, 0xFA]
        );
    }
    #[test]
    fn stuffing() {
        assert_eq!(stuff(&[0x03, 0xFF, 0xFF, 0xFD, 0x01]), vec![0x03, 0xFF, 0xFF, 0xFD, 0xFD, 0x01]);
        assert_eq!(destuff(&[0x03, 0xFF, 0xFF, 0xFD, 0xFD, 0x01]), vec![0x03, 0xFF, 0xFF, 0xFD, 0x01]);

        let packet = InstructionPacket::write_data(3, 0xFFFF, &[0xFD]);
        let bytes = packet.as_bytes();
        assert_eq!(pack!(bytes[5], bytes[6]), 7, "stuffed byte is counted");
        let parsed = ReceivedInstruction::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.parameters, vec![0xFF, 0xFF, 0xFD]);
    }
    #[test]
    fn receive_skips_noise_and_other_ids() {
        let other = StatusPacket {
            id: 7,
            error: None,
            parameters: vec![1],
        };
        let wanted = StatusPacket {
            id: 3,
            error: None,
            parameters: vec![0xFF, 0xFF, 0xFD, 9],
        };
        let mut input = vec![0x00, 0xFF, 0x12];
        input.extend(other.to_bytes());
        input.extend(wanted.to_bytes());
        let mut port = ScriptedPort::new(input);

        let sp = rx_packet(&mut port, 3, Duration::from_millis(20)).unwrap();
        assert_eq!(sp.parameters, vec![0xFF, 0xFF, 0xFD, 9]);
        assert!(port.remaining().is_empty());
    }
    #[test]
    fn receive_stops_at_packet_end() {
        let first = StatusPacket {
            id: 1,
            error: None,
            parameters: vec![10, 20],
        };
        let second = StatusPacket {
            id: 2,
            error: Some(DeviceError(0x80)),
            parameters: vec![30, 40],
        };
        let mut input = first.to_bytes();
        input.extend(second.to_bytes());
        let mut port = ScriptedPort::new(input);

        assert_eq!(rx_packet(&mut port, 1, Duration::from_millis(20)).unwrap().parameters, vec![10, 20]);
        let sp = rx_packet(&mut port, 2, Duration::from_millis(20)).unwrap();
        assert_eq!(sp.error, Some(DeviceError(0x80)));
        assert_eq!(sp.parameters, vec![30, 40]);
    }
    #[test]
    fn receive_timeout() {
        let mut port = ScriptedPort::new(vec![]);
        assert_eq!(
            rx_packet(&mut port, 1, Duration::from_millis(2)).unwrap_err(),
            CommError::RxTimeout
        );

        let truncated = StatusPacket {
            id: 1,
            error: None,
            parameters: vec![1, 2, 3],
        }
        .to_bytes();
        let mut port = ScriptedPort::new(truncated[..9].to_vec());
        assert_eq!(
            rx_packet(&mut port, 1, Duration::from_millis(2)).unwrap_err(),
            CommError::RxCorrupt
        );
    }
    #[test]
    fn receive_gives_up_on_endless_noise() {
        struct Noise;
        impl Port for Noise {
            fn open(&mut self, _device_name: &str) -> std::io::Result<()> {
                Ok(())
            }
            fn set_baud_rate(&mut self, _baud_rate: u32) -> std::io::Result<()> {
                Ok(())
            }
            fn write_all(&mut self, _bytes: &[u8]) -> std::io::Result<()> {
                Ok(())
            }
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                buf[0] = 0x00;
                Ok(1)
            }
        }

        let start = Instant::now();
        assert_eq!(
            rx_packet(&mut Noise, 1, Duration::from_millis(5)).unwrap_err(),
            CommError::RxCorrupt
        );
        assert!(start.elapsed() < Duration::from_millis(250), "took {:?}", start.elapsed());
    }
    #[test]
    fn encoded_len_counts_stuffing() {
        let plain = InstructionPacket::write_data(3, 0x0000, &[0xFD]);
        assert_eq!(plain.encoded_len(), plain.as_bytes().len());
        let stuffed = InstructionPacket::write_data(3, 0xFFFF, &[0xFD]);
        assert_eq!(stuffed.encoded_len(), plain.encoded_len() + 1);
        assert_eq!(stuffed.encoded_len(), stuffed.as_bytes().len());
    }
    #[test]
    fn oversized_packet_is_not_sent() {
        let mut port = ScriptedPort::new(vec![]);
        let packet = InstructionPacket::sync_write(116, 4, &vec![0u8; TXPACKET_MAX_LEN]);
        assert_eq!(tx_packet(&mut port, &packet).unwrap_err(), CommError::TxError);
        assert!(port.written().is_empty());
    }
    fn random_status_packet() -> StatusPacket {
        let id: u8 = random();
        let parameters = random_parameters();
        let error = random_error();
        StatusPacket {
            id,
            error,
            parameters,
        }
    }
    fn random_error() -> Option<DeviceError> {
        match rand::thread_rng().gen_range(0u8..8) {
            0 => None,
            e => Some(DeviceError(e)),
        }
    }
    fn random_parameters() -> Vec<u8> {
        let size: u8 = random();
        (0..size).map(|_| random()).collect()
    }
}
