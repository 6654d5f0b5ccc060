//! Byte-stream transports the bus runs over.

use std::fmt;
use std::io::{self, Read, Write};
use std::time::Duration;

use hal::serial;
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};

/// Half-duplex byte transport.
pub trait Port: Send {
    /// Open the device node `device_name`.
    fn open(&mut self, device_name: &str) -> io::Result<()>;
    /// Change the line speed.
    fn set_baud_rate(&mut self, baud_rate: u32) -> io::Result<()>;
    /// Send all of `bytes`.
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;
    /// Read whatever is available into `buf`, up to its length.
    ///
    /// Returns `Ok(0)` when nothing has arrived yet.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    /// Drop any unread input.
    fn clear_input(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<P: Port + ?Sized> Port for Box<P> {
    fn open(&mut self, device_name: &str) -> io::Result<()> {
        (**self).open(device_name)
    }
    fn set_baud_rate(&mut self, baud_rate: u32) -> io::Result<()> {
        (**self).set_baud_rate(baud_rate)
    }
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        (**self).write_all(bytes)
    }
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }
    fn clear_input(&mut self) -> io::Result<()> {
        (**self).clear_input()
    }
}

const READ_TIMEOUT: Duration = Duration::from_millis(1);

fn not_open() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "serial port is not open")
}

/// [`Port`] over a host serial device (USB2Dynamixel, U2D2...).
pub struct SerialPortHandler {
    port: Option<Box<dyn SerialPort>>,
    baud_rate: u32,
}

impl SerialPortHandler {
    /// A closed handler that will open at `baud_rate`.
    pub fn new(baud_rate: u32) -> SerialPortHandler {
        SerialPortHandler {
            port: None,
            baud_rate,
        }
    }
    fn port(&mut self) -> io::Result<&mut (dyn SerialPort + 'static)> {
        self.port.as_deref_mut().ok_or_else(not_open)
    }
}

impl fmt::Debug for SerialPortHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialPortHandler")
            .field("open", &self.port.is_some())
            .field("baud_rate", &self.baud_rate)
            .finish()
    }
}

impl Port for SerialPortHandler {
    fn open(&mut self, device_name: &str) -> io::Result<()> {
        let port = serialport::new(device_name, self.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(READ_TIMEOUT)
            .open()?;
        log::debug!("opened {} at {} baud", device_name, self.baud_rate);
        self.port = Some(port);
        Ok(())
    }
    fn set_baud_rate(&mut self, baud_rate: u32) -> io::Result<()> {
        SerialPort::set_baud_rate(self.port()?, baud_rate)?;
        self.baud_rate = baud_rate;
        Ok(())
    }
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let port = self.port()?;
        Write::write_all(&mut *port, bytes)?;
        Write::flush(port)
    }
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match Read::read(self.port()?, buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e),
        }
    }
    fn clear_input(&mut self) -> io::Result<()> {
        SerialPort::clear(self.port()?, ClearBuffer::Input)?;
        Ok(())
    }
}

/// [`Port`] over an `embedded-hal` serial RX/TX pair.
///
/// The UART is configured by the HAL, so the line speed is fixed at
/// construction: any other rate is rejected.
#[derive(Debug)]
pub struct HalPort<RX, TX> {
    rx: RX,
    tx: TX,
    baud_rate: u32,
}

impl<RX, TX> HalPort<RX, TX> {
    /// Wrap a UART already running at `baud_rate`.
    pub fn new(rx: RX, tx: TX, baud_rate: u32) -> HalPort<RX, TX> {
        HalPort { rx, tx, baud_rate }
    }
    /// Give back the RX/TX halves.
    pub fn release(self) -> (RX, TX) {
        (self.rx, self.tx)
    }
}

fn hal_error<E: fmt::Debug>(e: E) -> io::Error {
    io::Error::new(io::ErrorKind::Other, format!("serial error: {:?}", e))
}

impl<RX, TX> Port for HalPort<RX, TX>
where
    RX: serial::Read<u8> + Send,
    TX: serial::Write<u8> + Send,
    RX::Error: fmt::Debug,
    TX::Error: fmt::Debug,
{
    fn open(&mut self, _device_name: &str) -> io::Result<()> {
        Ok(())
    }
    fn set_baud_rate(&mut self, baud_rate: u32) -> io::Result<()> {
        if baud_rate == self.baud_rate {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("UART runs at {} baud, cannot switch to {}", self.baud_rate, baud_rate),
            ))
        }
    }
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        for &b in bytes {
            nb::block!(self.tx.write(b)).map_err(hal_error)?;
        }
        nb::block!(self.tx.flush()).map_err(hal_error)
    }
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut n = 0;
        while n < buf.len() {
            match self.rx.read() {
                Ok(b) => {
                    buf[n] = b;
                    n += 1;
                }
                Err(nb::Error::WouldBlock) => break,
                Err(nb::Error::Other(e)) => return Err(hal_error(e)),
            }
        }
        Ok(n)
    }
}
