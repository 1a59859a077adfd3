use crate::{
    decode::DecodeError,
    frame::{EncodingError, ExceptionCode, FrameError},
    transport::TransportError,
};

/// Represents all possible errors of a register read.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The request parameters are invalid. Never retried.
    #[error(transparent)]
    Encoding(#[from] EncodingError),

    /// The exchange itself failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The response frame is corrupted or does not match the request.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// The slave rejected the request.
    #[error("Modbus exception: {0}")]
    DeviceException(#[from] ExceptionCode),

    /// The registers were read but do not decode to the requested value.
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Classification of an [`Error`], used to decide whether to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum ErrorKind {
    Encoding,
    Timeout,
    ShortRead,
    Port,
    Frame,
    /// A [`ExceptionCode::ServerDeviceBusy`] answer.
    DeviceBusy,
    /// Any other exception answer.
    DeviceException,
    Decode,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Encoding(..) => ErrorKind::Encoding,
            Error::Transport(TransportError::Timeout(..)) => ErrorKind::Timeout,
            Error::Transport(TransportError::ShortRead { .. }) => ErrorKind::ShortRead,
            Error::Transport(TransportError::Port(..)) => ErrorKind::Port,
            Error::Frame(..) => ErrorKind::Frame,
            Error::DeviceException(ExceptionCode::ServerDeviceBusy) => ErrorKind::DeviceBusy,
            Error::DeviceException(..) => ErrorKind::DeviceException,
            Error::Decode(..) => ErrorKind::Decode,
        }
    }
}

/// The result type of register reads.
pub type Result<T> = std::result::Result<T, Error>;
