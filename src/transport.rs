//! A single request/response exchange with the slave.
//!
//! The [`Transport`] trait is the seam between the retry logic and the
//! serial line: an implementation performs exactly one exchange attempt per
//! call and reports what went wrong, nothing more. [`read_frame`] assembles a
//! response from any byte stream and is shared by the serial implementation.

use crate::frame::{response_frame_len, MAX_RESPONSE_LEN, MIN_RESPONSE_LEN};
use std::io::{self, Read};
use std::time::{Duration, Instant};

/// Failures of a single exchange.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Nothing was received within the window.
    #[error("No response within {0:?}")]
    Timeout(Duration),

    /// A response started but never completed.
    #[error("Incomplete response: received {received} of {expected} bytes")]
    ShortRead { expected: usize, received: usize },

    /// The underlying device failed, e.g. it was disconnected.
    #[error("Serial port error: {0}")]
    Port(#[from] io::Error),
}

/// One exchange attempt over a byte-oriented link.
pub trait Transport {
    /// Writes `request` and returns the complete response frame.
    ///
    /// Implementations discard stale input before writing, so a late answer
    /// to an earlier request can never be taken for this one.
    fn exchange(&mut self, request: &[u8]) -> Result<Vec<u8>, TransportError>;

    /// Drops bytes that were received but not yet read.
    fn discard_input(&mut self) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn exchange(&mut self, request: &[u8]) -> Result<Vec<u8>, TransportError> {
        (**self).exchange(request)
    }

    fn discard_input(&mut self) -> Result<(), TransportError> {
        (**self).discard_input()
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn exchange(&mut self, request: &[u8]) -> Result<Vec<u8>, TransportError> {
        (**self).exchange(request)
    }

    fn discard_input(&mut self) -> Result<(), TransportError> {
        (**self).discard_input()
    }
}

/// Reads one response frame from `reader`.
///
/// The frame length is derived from the header as it arrives, and exactly that
/// many bytes are consumed. A read timeout, end of stream, or passing the
/// deadline ends the attempt: with nothing received it is a
/// [`TransportError::Timeout`], otherwise a [`TransportError::ShortRead`].
///
/// A header announcing more than [`MAX_RESPONSE_LEN`] bytes ends the read
/// early and the header alone is returned.
pub fn read_frame<R: Read + ?Sized>(
    reader: &mut R,
    timeout: Duration,
) -> Result<Vec<u8>, TransportError> {
    let deadline = Instant::now() + timeout;
    let mut frame = Vec::with_capacity(MAX_RESPONSE_LEN);
    let mut buf = [0u8; MAX_RESPONSE_LEN];

    loop {
        let known_len = response_frame_len(&frame);
        if let Some(len) = known_len {
            // A byte count no read response can carry is returned as is for
            // the decoder to reject; the rest of it is discarded before the
            // next exchange.
            if frame.len() >= len || len > MAX_RESPONSE_LEN {
                return Ok(frame);
            }
        }
        // Until the byte count arrives read just the 3 header bytes.
        let wanted = known_len.unwrap_or(3) - frame.len();
        if Instant::now() >= deadline {
            return Err(incomplete(frame.len(), known_len, timeout));
        }
        match reader.read(&mut buf[..wanted]) {
            Ok(0) => return Err(incomplete(frame.len(), known_len, timeout)),
            Ok(n) => frame.extend_from_slice(&buf[..n]),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err)
                if err.kind() == io::ErrorKind::TimedOut
                    || err.kind() == io::ErrorKind::WouldBlock =>
            {
                return Err(incomplete(frame.len(), known_len, timeout))
            }
            Err(err) => return Err(err.into()),
        }
    }
}

fn incomplete(received: usize, expected: Option<usize>, timeout: Duration) -> TransportError {
    if received == 0 {
        TransportError::Timeout(timeout)
    } else {
        TransportError::ShortRead {
            expected: expected.unwrap_or(MIN_RESPONSE_LEN),
            received,
        }
    }
}
