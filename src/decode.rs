//! Conversions from raw register words to typed values.
//!
//! All functions are pure: no I/O and no retries. Multi-register values are
//! assembled in register order, each register contributing its high byte
//! first.

use std::fmt;

/// Errors raised when raw words do not fit the requested decoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Expected {expected} register(s), got {actual}")]
    WordCount { expected: usize, actual: usize },
    #[error("Register contents are not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("Expected a {expected} value, got {actual:?}")]
    Type {
        expected: &'static str,
        actual: DecodedValue,
    },
}

/// A value decoded from one or more registers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedValue {
    /// Unsigned number, not scaled.
    Unsigned(u16),
    /// Signed-magnitude number.
    SignedMagnitude(i16),
    /// UTF-8 text.
    Text(String),
    /// Raw byte sequence.
    Bytes(Vec<u8>),
    /// Two version components.
    Version(u16, u16),
}

impl fmt::Display for DecodedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsigned(value) => write!(f, "{value}"),
            Self::SignedMagnitude(value) => write!(f, "{value}"),
            Self::Text(text) => write!(f, "{text}"),
            Self::Bytes(bytes) => {
                write!(f, "0x")?;
                for byte in bytes {
                    write!(f, "{byte:02X}")?;
                }
                Ok(())
            }
            Self::Version(major, minor) => write!(f, "({major}, {minor})"),
        }
    }
}

impl TryFrom<DecodedValue> for u16 {
    type Error = DecodeError;

    fn try_from(value: DecodedValue) -> Result<Self, Self::Error> {
        match value {
            DecodedValue::Unsigned(value) => Ok(value),
            actual => Err(DecodeError::Type {
                expected: "unsigned",
                actual,
            }),
        }
    }
}

impl TryFrom<DecodedValue> for i16 {
    type Error = DecodeError;

    fn try_from(value: DecodedValue) -> Result<Self, Self::Error> {
        match value {
            DecodedValue::SignedMagnitude(value) => Ok(value),
            actual => Err(DecodeError::Type {
                expected: "signed-magnitude",
                actual,
            }),
        }
    }
}

impl TryFrom<DecodedValue> for String {
    type Error = DecodeError;

    fn try_from(value: DecodedValue) -> Result<Self, Self::Error> {
        match value {
            DecodedValue::Text(text) => Ok(text),
            actual => Err(DecodeError::Type {
                expected: "text",
                actual,
            }),
        }
    }
}

impl TryFrom<DecodedValue> for Vec<u8> {
    type Error = DecodeError;

    fn try_from(value: DecodedValue) -> Result<Self, Self::Error> {
        match value {
            DecodedValue::Bytes(bytes) => Ok(bytes),
            actual => Err(DecodeError::Type {
                expected: "bytes",
                actual,
            }),
        }
    }
}

impl TryFrom<DecodedValue> for (u16, u16) {
    type Error = DecodeError;

    fn try_from(value: DecodedValue) -> Result<Self, Self::Error> {
        match value {
            DecodedValue::Version(major, minor) => Ok((major, minor)),
            actual => Err(DecodeError::Type {
                expected: "version",
                actual,
            }),
        }
    }
}

/// Divides a raw register value by `10^decimal_places`.
pub fn scale(word: u16, decimal_places: u8) -> f64 {
    f64::from(word) / 10f64.powi(i32::from(decimal_places))
}

/// Bits 8-15 of a register.
pub const fn high_byte(word: u16) -> u8 {
    (word >> 8) as u8
}

/// Bits 0-7 of a register.
pub const fn low_byte(word: u16) -> u8 {
    (word & 0x00FF) as u8
}

/// Interprets one byte as a 7-bit magnitude with the sign in bit 7.
pub const fn signed_magnitude(byte: u8) -> i16 {
    let magnitude = (byte & 0x7F) as i16;
    if byte & 0x80 != 0 {
        -magnitude
    } else {
        magnitude
    }
}

/// Splits a register into two signed-magnitude sub-fields.
///
/// Returns `(low, high)`: `low` is taken from bits 0-7 (sign in bit 7),
/// `high` from bits 8-15 (sign in bit 15). The controllers pack the battery
/// temperature into the low and their own temperature into the high half.
pub const fn split_signed_magnitude(word: u16) -> (i16, i16) {
    (
        signed_magnitude(low_byte(word)),
        signed_magnitude(high_byte(word)),
    )
}

/// Concatenates two registers, most significant first.
pub const fn words_to_u32(high: u16, low: u16) -> u32 {
    ((high as u32) << 16) | low as u32
}

/// Flattens registers into bytes, high byte first.
pub fn words_to_bytes(words: &[u16]) -> Vec<u8> {
    words.iter().flat_map(|word| word.to_be_bytes()).collect()
}

/// Interprets the register bytes as UTF-8 text.
///
/// Trailing NUL and space padding is removed.
pub fn words_to_string(words: &[u16]) -> Result<String, DecodeError> {
    let text = String::from_utf8(words_to_bytes(words))?;
    Ok(text.trim_end_matches(['\0', ' ']).to_string())
}

/// Returns two adjacent registers as an ordered pair.
pub fn words_to_version(words: &[u16]) -> Result<(u16, u16), DecodeError> {
    match words {
        [major, minor] => Ok((*major, *minor)),
        _ => Err(DecodeError::WordCount {
            expected: 2,
            actual: words.len(),
        }),
    }
}
