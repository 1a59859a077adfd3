//! Retry-wrapped register reads against one slave.
//!
//! [`RetriableClient`] owns a [`Transport`] and the address of the slave
//! behind it. Every read is one logical operation: the request frame is built
//! once, then exchanged until it succeeds, fails with an error the
//! [`RetryPolicy`] does not retry, or runs out of attempts. Before a retry the
//! client discards pending input and waits for the policy's delay.
//!
//! ## Example
//!
//! ```no_run
//! use renogymodbus_lib::{
//!     client::RetriableClient,
//!     protocol::{Address, FunctionCode},
//!     serial::SerialTransport,
//! };
//! use std::time::Duration;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = SerialTransport::open("/dev/ttyUSB0", 9600, Duration::from_secs(1))?;
//!     let mut client = RetriableClient::new(transport, Address::default());
//!
//!     let state_of_charge = client.read_single_register(0x0100, FunctionCode::ReadHoldingRegisters)?;
//!     println!("Battery state of charge: {state_of_charge} %");
//!     Ok(())
//! }
//! ```

use crate::{
    decode::{self, DecodedValue},
    error::Result,
    frame::{self, RegisterRequest},
    protocol::{Address, Field, FunctionCode},
    retry::{RetryPolicy, Step},
    transport::Transport,
};
use log::{debug, trace, warn};

/// Register client retrying transient failures.
#[derive(Debug)]
pub struct RetriableClient<T> {
    transport: T,
    slave: Address,
    policy: RetryPolicy,
}

impl<T: Transport> RetriableClient<T> {
    /// Creates a client with the default [`RetryPolicy`].
    pub fn new(transport: T, slave: Address) -> Self {
        Self::with_policy(transport, slave, RetryPolicy::default())
    }

    pub fn with_policy(transport: T, slave: Address, policy: RetryPolicy) -> Self {
        Self {
            transport,
            slave,
            policy,
        }
    }

    pub fn slave(&self) -> Address {
        self.slave
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Consumes the client, returning the transport.
    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Reads one register and returns its raw value.
    ///
    /// `decimal_places` and `signed` describe how the caller will interpret
    /// the value; they are not applied here.
    pub fn read_register(
        &mut self,
        address: u16,
        decimal_places: u8,
        function: FunctionCode,
        signed: bool,
    ) -> Result<u16> {
        let words = self.read_registers(address, 1, decimal_places, function, signed)?;
        Ok(words[0])
    }

    /// Reads `count` consecutive registers and returns the raw words, most
    /// significant register first.
    ///
    /// `decimal_places` and `signed` are not applied, see [`Self::read_register`].
    pub fn read_registers(
        &mut self,
        address: u16,
        count: u16,
        decimal_places: u8,
        function: FunctionCode,
        signed: bool,
    ) -> Result<Vec<u16>> {
        let request = RegisterRequest::new(function, address, count);
        trace!(
            "Reading {request:?} from slave {} (decimal places: {decimal_places}, signed: {signed})",
            self.slave
        );
        self.execute(&request)
    }

    /// Reads a single register.
    pub fn read_single_register(&mut self, address: u16, function: FunctionCode) -> Result<u16> {
        self.read_register(address, 0, function, false)
    }

    /// Reads `count` consecutive registers.
    pub fn read_multiple_registers(
        &mut self,
        address: u16,
        count: u16,
        function: FunctionCode,
    ) -> Result<Vec<u16>> {
        self.read_registers(address, count, 0, function, false)
    }

    /// Reads two registers as one big-endian 32 bit value.
    pub fn read_long(&mut self, address: u16, function: FunctionCode) -> Result<u32> {
        let words = self.read_multiple_registers(address, 2, function)?;
        Ok(decode::words_to_u32(words[0], words[1]))
    }

    /// Reads and decodes one entry of the register map.
    pub fn read_field(&mut self, field: &Field) -> Result<DecodedValue> {
        let words = self.read_registers(
            field.address,
            field.quantity,
            field.decimal_places,
            field.function,
            field.signed,
        )?;
        Ok(field.decode(&words)?)
    }

    fn execute(&mut self, request: &RegisterRequest) -> Result<Vec<u16>> {
        let frame = request.encode(self.slave)?;
        let mut attempt = 1;
        loop {
            let outcome = self.attempt(request, &frame, attempt);
            match self.policy.step(attempt, outcome) {
                Step::Success(words) => return Ok(words),
                Step::Retry { next, delay, error } => {
                    warn!(
                        "Attempt {attempt} of {} to read register 0x{:04X} from slave {} failed: {error}",
                        self.policy.max_attempts(),
                        request.address,
                        self.slave
                    );
                    std::thread::sleep(delay);
                    attempt = next;
                }
                Step::Failed(error) => {
                    debug!(
                        "Reading register 0x{:04X} from slave {} failed after {attempt} attempt(s): {error}",
                        request.address, self.slave
                    );
                    return Err(error);
                }
            }
        }
    }

    fn attempt(&mut self, request: &RegisterRequest, frame: &[u8], attempt: u8) -> Result<Vec<u16>> {
        if attempt > 1 {
            self.transport.discard_input()?;
        }
        debug!("Slave {} <- {frame:02X?}", self.slave);
        let response = self.transport.exchange(frame)?;
        debug!("Slave {} -> {response:02X?}", self.slave);
        frame::decode_read_response(&response, self.slave, request.function, request.quantity)
    }
}
