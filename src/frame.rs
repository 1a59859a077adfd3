//! Modbus RTU framing of register read requests and their responses.
//!
//! ```text
//! request:   [slave][function][address hi][address lo][quantity hi][quantity lo][crc lo][crc hi]
//! response:  [slave][function][byte count][data ...][crc lo][crc hi]
//! exception: [slave][function | 0x80][exception code][crc lo][crc hi]
//! ```

use crate::{
    error::{Error, Result},
    protocol::{Address, FunctionCode},
};

/// Maximum number of registers a single read may request.
pub const MAX_READ_QUANTITY: u16 = 125;

/// Length of a read request frame.
pub const REQUEST_FRAME_LEN: usize = 8;

/// The shortest well-formed response, an exception frame.
pub const MIN_RESPONSE_LEN: usize = 5;

/// The longest read response: 125 registers.
pub const MAX_RESPONSE_LEN: usize = 5 + 2 * MAX_READ_QUANTITY as usize;

const EXCEPTION_FLAG: u8 = 0x80;

/// Invalid request parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EncodingError {
    #[error("Register quantity {0} is outside the valid range of 1 to {max}", max = MAX_READ_QUANTITY)]
    QuantityOutOfRange(u16),
}

/// A response frame that cannot be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("Response of {0} bytes is shorter than the minimum frame")]
    TooShort(usize),
    #[error("Invalid CRC: expected = 0x{expected:04X}, actual = 0x{actual:04X}")]
    Crc { expected: u16, actual: u16 },
    #[error("Response from slave {actual} while waiting for slave {expected}")]
    SlaveMismatch { expected: u8, actual: u8 },
    #[error("Function code 0x{actual:02X} does not echo request code 0x{expected:02X}")]
    FunctionMismatch { expected: u8, actual: u8 },
    #[error("Invalid byte count: expected {expected}, got {actual}")]
    ByteCount { expected: usize, actual: u8 },
    #[error("Length mismatch: expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },
}

/// Exception codes a slave answers with when it rejects a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum ExceptionCode {
    #[error("Illegal function")]
    IllegalFunction,
    #[error("Illegal data address")]
    IllegalDataAddress,
    #[error("Illegal data value")]
    IllegalDataValue,
    #[error("Server device failure")]
    ServerDeviceFailure,
    #[error("Acknowledge")]
    Acknowledge,
    #[error("Server device busy")]
    ServerDeviceBusy,
    #[error("Memory parity error")]
    MemoryParityError,
    #[error("Gateway path unavailable")]
    GatewayPathUnavailable,
    #[error("Gateway target device failed to respond")]
    GatewayTargetDevice,
    #[error("Unknown exception code 0x{0:02X}")]
    Unknown(u8),
}

impl ExceptionCode {
    /// The code as it appears on the wire.
    pub const fn code(self) -> u8 {
        match self {
            Self::IllegalFunction => 0x01,
            Self::IllegalDataAddress => 0x02,
            Self::IllegalDataValue => 0x03,
            Self::ServerDeviceFailure => 0x04,
            Self::Acknowledge => 0x05,
            Self::ServerDeviceBusy => 0x06,
            Self::MemoryParityError => 0x08,
            Self::GatewayPathUnavailable => 0x0A,
            Self::GatewayTargetDevice => 0x0B,
            Self::Unknown(code) => code,
        }
    }
}

impl From<u8> for ExceptionCode {
    fn from(code: u8) -> Self {
        match code {
            0x01 => Self::IllegalFunction,
            0x02 => Self::IllegalDataAddress,
            0x03 => Self::IllegalDataValue,
            0x04 => Self::ServerDeviceFailure,
            0x05 => Self::Acknowledge,
            0x06 => Self::ServerDeviceBusy,
            0x08 => Self::MemoryParityError,
            0x0A => Self::GatewayPathUnavailable,
            0x0B => Self::GatewayTargetDevice,
            other => Self::Unknown(other),
        }
    }
}

/// A single register read, built per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterRequest {
    pub address: u16,
    pub function: FunctionCode,
    pub quantity: u16,
}

impl RegisterRequest {
    pub fn new(function: FunctionCode, address: u16, quantity: u16) -> Self {
        Self {
            address,
            function,
            quantity,
        }
    }

    /// Encodes the request frame for `slave`.
    pub fn encode(&self, slave: Address) -> std::result::Result<Vec<u8>, EncodingError> {
        encode_read_request(slave, self.function, self.address, self.quantity)
    }

    /// Validates a response frame against this request.
    pub fn decode_response(&self, slave: Address, frame: &[u8]) -> Result<Vec<u16>> {
        decode_read_response(frame, slave, self.function, self.quantity)
    }
}

/// Calculate the CRC-16/MODBUS checksum (polynomial 0xA001, initial 0xFFFF).
///
/// On the wire the checksum is sent low byte first.
#[must_use]
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc = 0xFFFF;
    for byte in data {
        crc ^= u16::from(*byte);
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Builds the 8-byte read request frame.
pub fn encode_read_request(
    slave: Address,
    function: FunctionCode,
    address: u16,
    quantity: u16,
) -> std::result::Result<Vec<u8>, EncodingError> {
    if !(1..=MAX_READ_QUANTITY).contains(&quantity) {
        return Err(EncodingError::QuantityOutOfRange(quantity));
    }
    let mut frame = Vec::with_capacity(REQUEST_FRAME_LEN);
    frame.push(*slave);
    frame.push(function.code());
    frame.extend_from_slice(&address.to_be_bytes());
    frame.extend_from_slice(&quantity.to_be_bytes());
    let crc = crc16(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    Ok(frame)
}

/// Number of bytes of the response frame starting with `header`.
///
/// Returns `None` while the header is too short to tell: an exception is
/// recognised after 2 bytes, a normal response needs its byte count.
pub fn response_frame_len(header: &[u8]) -> Option<usize> {
    match header {
        [_, function, ..] if function & EXCEPTION_FLAG != 0 => Some(MIN_RESPONSE_LEN),
        [_, _, byte_count, ..] => Some(MIN_RESPONSE_LEN + *byte_count as usize),
        _ => None,
    }
}

/// Validates a read response and extracts its register words.
///
/// The CRC is verified before any other field so that a corrupted frame is
/// always reported as [`FrameError`], never as a device exception.
pub fn decode_read_response(
    frame: &[u8],
    slave: Address,
    function: FunctionCode,
    quantity: u16,
) -> Result<Vec<u16>> {
    if frame.len() < MIN_RESPONSE_LEN {
        return Err(FrameError::TooShort(frame.len()).into());
    }
    let (body, crc_bytes) = frame.split_at(frame.len() - 2);
    let expected = u16::from_le_bytes([crc_bytes[0], crc_bytes[1]]);
    let actual = crc16(body);
    if expected != actual {
        return Err(FrameError::Crc { expected, actual }.into());
    }
    if body[0] != *slave {
        return Err(FrameError::SlaveMismatch {
            expected: *slave,
            actual: body[0],
        }
        .into());
    }
    if body[1] == function.code() | EXCEPTION_FLAG {
        if frame.len() != MIN_RESPONSE_LEN {
            return Err(FrameError::Length {
                expected: MIN_RESPONSE_LEN,
                actual: frame.len(),
            }
            .into());
        }
        return Err(Error::DeviceException(ExceptionCode::from(body[2])));
    }
    if body[1] != function.code() {
        return Err(FrameError::FunctionMismatch {
            expected: function.code(),
            actual: body[1],
        }
        .into());
    }
    let byte_count = 2 * quantity as usize;
    if body[2] as usize != byte_count {
        return Err(FrameError::ByteCount {
            expected: byte_count,
            actual: body[2],
        }
        .into());
    }
    if frame.len() != MIN_RESPONSE_LEN + byte_count {
        return Err(FrameError::Length {
            expected: MIN_RESPONSE_LEN + byte_count,
            actual: frame.len(),
        }
        .into());
    }
    Ok(body[3..]
        .chunks_exact(2)
        .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
        .collect())
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use assert_matches::assert_matches;

    fn slave() -> Address {
        Address::try_from(1).unwrap()
    }

    #[test]
    fn test_calc_crc16() {
        assert_eq!(crc16(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x01]), 0x0A84);
        assert_eq!(crc16(&[0x01, 0x03, 0x02, 0x00, 0x2A]), 0x9B39);
        assert_eq!(crc16(&[0x01, 0x83, 0x02]), 0xF1C0);
    }

    #[test]
    fn encode_request() {
        assert_eq!(
            encode_read_request(slave(), FunctionCode::ReadHoldingRegisters, 0x0000, 1).unwrap(),
            vec![0x01, 0x03, 0x00, 0x00, 0x00, 0x01, 0x84, 0x0A]
        );
        assert_eq!(
            encode_read_request(slave(), FunctionCode::ReadHoldingRegisters, 0x0100, 1).unwrap(),
            vec![0x01, 0x03, 0x01, 0x00, 0x00, 0x01, 0x85, 0xF6]
        );
        assert_eq!(
            encode_read_request(slave(), FunctionCode::ReadHoldingRegisters, 0x000C, 8).unwrap(),
            vec![0x01, 0x03, 0x00, 0x0C, 0x00, 0x08, 0x84, 0x0F]
        );
    }

    #[test]
    fn encode_request_quantity_range() {
        let function = FunctionCode::ReadInputRegisters;
        assert_matches!(
            encode_read_request(slave(), function, 0, 0),
            Err(EncodingError::QuantityOutOfRange(0))
        );
        assert!(encode_read_request(slave(), function, 0, 1).is_ok());
        assert!(encode_read_request(slave(), function, 0, 125).is_ok());
        assert_matches!(
            encode_read_request(slave(), function, 0, 126),
            Err(EncodingError::QuantityOutOfRange(126))
        );
    }

    #[test]
    fn decode_response() {
        let frame = [0x01, 0x03, 0x02, 0x00, 0x2A, 0x39, 0x9B];
        assert_eq!(
            decode_read_response(&frame, slave(), FunctionCode::ReadHoldingRegisters, 1).unwrap(),
            vec![42]
        );
    }

    #[test]
    fn round_trip() {
        let words = [0x4142, 0x4344, 0x0000, 0xFFFF, 0x8005];
        for function in [
            FunctionCode::ReadHoldingRegisters,
            FunctionCode::ReadInputRegisters,
        ] {
            for address in [0x0000, 0x0100, 0xFFFF] {
                for quantity in 1..=words.len() as u16 {
                    let request = RegisterRequest::new(function, address, quantity);
                    let encoded = request.encode(slave()).unwrap();
                    assert_eq!(encoded.len(), REQUEST_FRAME_LEN);
                    let echo = response_frame(encoded[0], encoded[1], &words[..quantity as usize]);
                    assert_eq!(
                        request.decode_response(slave(), &echo).unwrap(),
                        &words[..quantity as usize]
                    );
                }
            }
        }
    }

    #[test]
    fn every_single_bit_flip_is_rejected() {
        let frame = response_frame(0x01, 0x03, &[0x4142, 0x4344]);
        for byte in 0..frame.len() {
            for bit in 0..8 {
                let mut corrupted = frame.clone();
                corrupted[byte] ^= 1 << bit;
                assert_matches!(
                    decode_read_response(
                        &corrupted,
                        slave(),
                        FunctionCode::ReadHoldingRegisters,
                        2
                    ),
                    Err(Error::Frame(..)),
                    "flipped bit {bit} of byte {byte}"
                );
            }
        }
    }

    #[test]
    fn decode_exception() {
        let frame = exception_frame(0x01, 0x03, 0x02);
        assert_eq!(frame, vec![0x01, 0x83, 0x02, 0xC0, 0xF1]);
        assert_matches!(
            decode_read_response(&frame, slave(), FunctionCode::ReadHoldingRegisters, 1),
            Err(Error::DeviceException(ExceptionCode::IllegalDataAddress))
        );
        let frame = exception_frame(0x01, 0x04, 0x06);
        assert_matches!(
            decode_read_response(&frame, slave(), FunctionCode::ReadInputRegisters, 1),
            Err(Error::DeviceException(ExceptionCode::ServerDeviceBusy))
        );
    }

    #[test]
    fn decode_mismatched_fields() {
        let function = FunctionCode::ReadHoldingRegisters;
        assert_matches!(
            decode_read_response(&[0x01, 0x03, 0x02], slave(), function, 1),
            Err(Error::Frame(FrameError::TooShort(3)))
        );
        assert_matches!(
            decode_read_response(&response_frame(0x02, 0x03, &[42]), slave(), function, 1),
            Err(Error::Frame(FrameError::SlaveMismatch {
                expected: 1,
                actual: 2
            }))
        );
        assert_matches!(
            decode_read_response(&response_frame(0x01, 0x04, &[42]), slave(), function, 1),
            Err(Error::Frame(FrameError::FunctionMismatch {
                expected: 0x03,
                actual: 0x04
            }))
        );
        assert_matches!(
            decode_read_response(&response_frame(0x01, 0x03, &[42]), slave(), function, 2),
            Err(Error::Frame(FrameError::ByteCount {
                expected: 4,
                actual: 2
            }))
        );
        // An exception for a different function is not ours.
        assert_matches!(
            decode_read_response(&exception_frame(0x01, 0x04, 0x02), slave(), function, 1),
            Err(Error::Frame(FrameError::FunctionMismatch { .. }))
        );
    }

    #[test]
    fn decode_length_mismatch() {
        // Byte count claims one register but two follow.
        let mut frame = vec![0x01, 0x03, 0x02, 0x00, 0x2A, 0x00, 0x2B];
        let crc = crc16(&frame);
        frame.extend_from_slice(&crc.to_le_bytes());
        assert_matches!(
            decode_read_response(&frame, slave(), FunctionCode::ReadHoldingRegisters, 1),
            Err(Error::Frame(FrameError::Length {
                expected: 7,
                actual: 9
            }))
        );
    }

    #[test]
    fn frame_length_from_header() {
        assert_eq!(response_frame_len(&[]), None);
        assert_eq!(response_frame_len(&[0x01, 0x03]), None);
        assert_eq!(response_frame_len(&[0x01, 0x83]), Some(5));
        assert_eq!(response_frame_len(&[0x01, 0x03, 0x02]), Some(7));
        assert_eq!(response_frame_len(&[0x01, 0x03, 0x10, 0x00]), Some(21));
    }

    #[test]
    fn exception_codes() {
        for code in 0..=u8::MAX {
            assert_eq!(ExceptionCode::from(code).code(), code);
        }
    }
}
