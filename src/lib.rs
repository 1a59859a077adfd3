//! A library for polling Renogy solar charge controllers via Modbus RTU.
//!
//! The crate is organised in layers, each usable on its own:
//!
//! 1.  **Frame codec** ([`frame`]): builds read requests and validates
//!     responses, CRC-16 included.
//! 2.  **Transport** ([`transport`], [`serial`]): one request/response exchange
//!     over the serial line, flushing stale input first.
//! 3.  **Retriable client** ([`client`], [`retry`]): retries transient failures
//!     (timeouts, short reads, corrupted frames, port errors) within a bounded
//!     [`retry::RetryPolicy`] and returns the raw register words.
//! 4.  **Register map** ([`protocol`], [`decode`], [`charge_controller`]): a
//!     declarative table of the controller's registers and named getters on top
//!     of it. [`safe_client::SafeClient`] shares one controller between threads.
//!
//! ## Quick Start
//!
//! ```no_run
//! use renogymodbus_lib::{
//!     charge_controller::ChargeController,
//!     client::RetriableClient,
//!     protocol::Address,
//!     serial::SerialTransport,
//! };
//! use std::time::Duration;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = SerialTransport::open("/dev/ttyUSB0", 9600, Duration::from_secs(1))?;
//!     let mut controller = ChargeController::new(RetriableClient::new(transport, Address::default()));
//!
//!     println!("Battery state of charge: {} %", controller.battery_state_of_charge()?);
//!     println!("Controller temperature: {} °C", controller.controller_temperature()?);
//!
//!     Ok(())
//! }
//! ```

pub mod charge_controller;
pub mod client;
pub mod decode;
mod error;
pub mod frame;
pub mod protocol;
pub mod retry;
pub mod transport;

pub use error::{Error, ErrorKind, Result};

#[cfg_attr(docsrs, doc(cfg(feature = "serial")))]
#[cfg(feature = "serial")]
pub mod serial;

#[cfg_attr(docsrs, doc(cfg(feature = "safe-client")))]
#[cfg(feature = "safe-client")]
pub mod safe_client;
