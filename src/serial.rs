//! Serial line [`Transport`] built on `tokio-serial`'s blocking port API.
//!
//! The controllers talk 8N1 without flow control; only the baud rate and the
//! read timeout vary between installations.

use crate::transport::{read_frame, Transport, TransportError};
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};
use tokio_serial::{ClearBuffer, SerialPort};

/// The parity used for serial communication.
pub const PARITY: &tokio_serial::Parity = &tokio_serial::Parity::None;
/// The number of stop bits used for serial communication.
pub const STOP_BITS: &tokio_serial::StopBits = &tokio_serial::StopBits::One;
/// The number of data bits used for serial communication.
pub const DATA_BITS: &tokio_serial::DataBits = &tokio_serial::DataBits::Eight;
/// Read timeout of a single exchange unless configured otherwise.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Creates a `tokio_serial::SerialPortBuilder` with the specified settings.
///
/// # Arguments
///
/// * `device` - The path to the serial port device (e.g., `/dev/ttyUSB0`).
/// * `baud_rate` - The baud rate for the serial communication.
pub fn serial_port_builder(device: &str, baud_rate: u32) -> tokio_serial::SerialPortBuilder {
    tokio_serial::new(device, baud_rate)
        .parity(*PARITY)
        .stop_bits(*STOP_BITS)
        .data_bits(*DATA_BITS)
        .flow_control(tokio_serial::FlowControl::None)
}

/// The port operations an exchange relies on.
pub trait Port: Read + Write {
    /// Drops received bytes that were not read yet.
    fn clear_input(&mut self) -> io::Result<()>;

    /// Sets how long a single read may block.
    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()>;
}

impl Port for Box<dyn SerialPort> {
    fn clear_input(&mut self) -> io::Result<()> {
        SerialPort::clear(&**self, ClearBuffer::Input).map_err(io::Error::from)
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        SerialPort::set_timeout(&mut **self, timeout).map_err(io::Error::from)
    }
}

/// An open serial port performing one exchange per call.
pub struct SerialTransport<P = Box<dyn SerialPort>> {
    port: P,
    timeout: Duration,
}

impl<P> std::fmt::Debug for SerialTransport<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl SerialTransport {
    /// Wraps an already configured port. Its current timeout becomes the
    /// exchange timeout.
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        let timeout = port.timeout();
        Self::with_port(port, timeout)
    }

    /// Opens `device` with the controller's line settings.
    pub fn open(device: &str, baud_rate: u32, timeout: Duration) -> Result<Self, TransportError> {
        let port = serial_port_builder(device, baud_rate)
            .timeout(timeout)
            .open()
            .map_err(io::Error::from)?;
        Ok(Self::with_port(port, timeout))
    }
}

impl<P: Port> SerialTransport<P> {
    /// Wraps `port`, waiting at most `timeout` for each response.
    pub fn with_port(port: P, timeout: Duration) -> Self {
        Self { port, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Sets the window a single exchange waits for its response.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn into_inner(self) -> P {
        self.port
    }
}

/// Reads from the port without blocking past `deadline`.
struct Windowed<'a, P> {
    port: &'a mut P,
    deadline: Instant,
}

impl<P: Port> Read for Windowed<'_, P> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(io::ErrorKind::TimedOut.into());
        }
        self.port.set_read_timeout(remaining)?;
        self.port.read(buf)
    }
}

impl<P: Port> Transport for SerialTransport<P> {
    fn exchange(&mut self, request: &[u8]) -> Result<Vec<u8>, TransportError> {
        self.discard_input()?;
        self.port.write_all(request)?;
        self.port.flush()?;
        let mut reader = Windowed {
            deadline: Instant::now() + self.timeout,
            port: &mut self.port,
        };
        read_frame(&mut reader, self.timeout)
    }

    fn discard_input(&mut self) -> Result<(), TransportError> {
        self.port.clear_input()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::testing::response_frame;
    use assert_matches::assert_matches;
    use std::collections::VecDeque;

    const TIMEOUT: Duration = Duration::from_millis(200);

    #[derive(Debug, PartialEq)]
    enum Op {
        Clear,
        Write(Vec<u8>),
        Read,
    }

    /// A port whose device answers every write with `reply`.
    #[derive(Default)]
    struct MockPort {
        input: VecDeque<u8>,
        reply: Vec<u8>,
        ops: Vec<Op>,
        read_timeouts: Vec<Duration>,
    }

    impl Read for MockPort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.ops.push(Op::Read);
            if self.input.is_empty() {
                return Err(io::ErrorKind::TimedOut.into());
            }
            let n = buf.len().min(self.input.len());
            for (slot, byte) in buf.iter_mut().zip(self.input.drain(..n)) {
                *slot = byte;
            }
            Ok(n)
        }
    }

    impl Write for MockPort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.ops.push(Op::Write(buf.to_vec()));
            self.input.extend(&self.reply);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Port for MockPort {
        fn clear_input(&mut self) -> io::Result<()> {
            self.ops.push(Op::Clear);
            self.input.clear();
            Ok(())
        }

        fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()> {
            self.read_timeouts.push(timeout);
            Ok(())
        }
    }

    const REQUEST: [u8; 8] = [0x01, 0x03, 0x01, 0x00, 0x00, 0x01, 0x85, 0xF6];

    #[test]
    fn stale_input_is_cleared_before_writing() {
        let stale = response_frame(1, 3, &[7]);
        let fresh = response_frame(1, 3, &[42]);
        let port = MockPort {
            input: stale.into_iter().collect(),
            reply: fresh.clone(),
            ..Default::default()
        };
        let mut transport = SerialTransport::with_port(port, TIMEOUT);

        assert_eq!(transport.exchange(&REQUEST).unwrap(), fresh);

        let port = transport.into_inner();
        assert_eq!(port.ops[0], Op::Clear);
        assert_eq!(port.ops[1], Op::Write(REQUEST.to_vec()));
        assert!(port.ops[2..].iter().all(|op| *op == Op::Read));
        assert!(port.ops.len() > 2);
    }

    #[test]
    fn every_exchange_clears_input() {
        let port = MockPort {
            reply: response_frame(1, 3, &[42]),
            ..Default::default()
        };
        let mut transport = SerialTransport::with_port(port, TIMEOUT);
        transport.exchange(&REQUEST).unwrap();
        transport.exchange(&REQUEST).unwrap();

        let port = transport.into_inner();
        let clears = port.ops.iter().filter(|op| **op == Op::Clear).count();
        assert_eq!(clears, 2);
    }

    #[test]
    fn reads_never_wait_past_the_window() {
        let port = MockPort {
            reply: response_frame(1, 3, &[1, 2, 3]),
            ..Default::default()
        };
        let mut transport = SerialTransport::with_port(port, TIMEOUT);
        transport.exchange(&REQUEST).unwrap();

        let port = transport.into_inner();
        assert!(!port.read_timeouts.is_empty());
        assert!(port.read_timeouts.iter().all(|timeout| *timeout <= TIMEOUT));
        assert!(port.read_timeouts.windows(2).all(|pair| pair[1] <= pair[0]));
    }

    #[test]
    fn silent_device_times_out() {
        let mut transport = SerialTransport::with_port(MockPort::default(), TIMEOUT);
        assert_matches!(
            transport.exchange(&REQUEST),
            Err(TransportError::Timeout(timeout)) if timeout == TIMEOUT
        );
    }
}
