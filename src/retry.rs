//! Bounded retry policy for register reads.
//!
//! A read moves through `Idle → Attempting → {Success | Retrying → Attempting
//! | Failed}`. The transition taken after each attempt is computed by
//! [`RetryPolicy::step`], a pure function of the attempt number and its
//! outcome, so the rules can be checked without any I/O:
//!
//! - a successful attempt ends the read, whatever budget is left;
//! - an error whose [`ErrorKind`] is not retriable ends the read;
//! - a retriable error ends the read once `max_attempts` attempts were made.

use crate::error::{Error, ErrorKind, Result};
use std::collections::BTreeSet;
use std::num::NonZeroU8;
use std::time::Duration;

/// Retry configuration, constant for the lifetime of a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: NonZeroU8,
    delay: Duration,
    retriable: BTreeSet<ErrorKind>,
}

/// Where a read goes after an attempt.
#[derive(Debug)]
pub enum Step<T> {
    /// The attempt succeeded.
    Success(T),
    /// Wait `delay`, then make attempt number `next`.
    Retry {
        next: u8,
        delay: Duration,
        error: Error,
    },
    /// Terminal failure, carrying the last error.
    Failed(Error),
}

impl RetryPolicy {
    pub const DEFAULT_ATTEMPTS: NonZeroU8 = match NonZeroU8::new(3) {
        Some(attempts) => attempts,
        None => unreachable!(),
    };
    pub const DEFAULT_DELAY: Duration = Duration::from_millis(100);

    /// Error kinds retried unless configured otherwise.
    pub const DEFAULT_RETRIABLE: [ErrorKind; 4] = [
        ErrorKind::Timeout,
        ErrorKind::ShortRead,
        ErrorKind::Port,
        ErrorKind::Frame,
    ];

    pub fn new(max_attempts: NonZeroU8, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            retriable: Self::DEFAULT_RETRIABLE.into_iter().collect(),
        }
    }

    /// A policy making exactly one attempt.
    pub fn no_retry() -> Self {
        Self::new(NonZeroU8::MIN, Duration::ZERO)
    }

    pub fn with_retriable(mut self, kind: ErrorKind) -> Self {
        self.retriable.insert(kind);
        self
    }

    pub fn without_retriable(mut self, kind: ErrorKind) -> Self {
        self.retriable.remove(&kind);
        self
    }

    /// Also retry when the slave answers "server device busy".
    pub fn retry_on_busy(self) -> Self {
        self.with_retriable(ErrorKind::DeviceBusy)
    }

    pub fn max_attempts(&self) -> u8 {
        self.max_attempts.get()
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn is_retriable(&self, kind: ErrorKind) -> bool {
        self.retriable.contains(&kind)
    }

    /// The transition after attempt number `attempt` (starting at 1) finished
    /// with `outcome`.
    pub fn step<T>(&self, attempt: u8, outcome: Result<T>) -> Step<T> {
        match outcome {
            Ok(value) => Step::Success(value),
            Err(error) if self.is_retriable(error.kind()) && attempt < self.max_attempts() => {
                Step::Retry {
                    next: attempt + 1,
                    delay: self.delay,
                    error,
                }
            }
            Err(error) => Step::Failed(error),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_ATTEMPTS, Self::DEFAULT_DELAY)
    }
}
