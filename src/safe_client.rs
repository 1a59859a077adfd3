//! Thread-safe wrapper around [`ChargeController`].
//!
//! The serial bus carries one exchange at a time. [`SafeClient`] guards the
//! controller with a mutex so that callers on several threads can share one
//! port; every getter holds the lock for the whole retry-wrapped read.
//!
//! ## Example
//!
//! ```no_run
//! use renogymodbus_lib::{
//!     charge_controller::ChargeController,
//!     client::RetriableClient,
//!     protocol::Address,
//!     safe_client::SafeClient,
//!     serial::SerialTransport,
//! };
//! use std::time::Duration;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = SerialTransport::open("/dev/ttyUSB0", 9600, Duration::from_secs(1))?;
//!     let client = SafeClient::new(ChargeController::new(RetriableClient::new(
//!         transport,
//!         Address::default(),
//!     )));
//!
//!     let poller = client.clone();
//!     let handle = std::thread::spawn(move || poller.solar_power());
//!     println!("Battery: {} %", client.battery_state_of_charge()?);
//!     println!("Solar: {} W", handle.join().expect("poller panicked")?);
//!     Ok(())
//! }
//! ```

use crate::{
    charge_controller::{charge_controller_fields, ChargeController},
    decode::DecodedValue,
    error::Result,
    protocol::Field,
    transport::Transport,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

macro_rules! safe_getters {
    ($($(#[$meta:meta])* $getter:ident: $ty:ty = $field:ident;)+) => {
        $(
            $(#[$meta])*
            pub fn $getter(&self) -> Result<$ty> {
                self.lock().$getter()
            }
        )+
    };
}

/// Shareable charge controller client.
#[derive(Debug)]
pub struct SafeClient<T> {
    controller: Arc<Mutex<ChargeController<T>>>,
}

impl<T> Clone for SafeClient<T> {
    fn clone(&self) -> Self {
        Self {
            controller: self.controller.clone(),
        }
    }
}

impl<T: Transport> SafeClient<T> {
    /// Creates a new `SafeClient` owning `controller`.
    pub fn new(controller: ChargeController<T>) -> Self {
        Self {
            controller: Arc::new(Mutex::new(controller)),
        }
    }

    /// Creates a new `SafeClient` from a shared controller.
    pub fn from_shared(controller: Arc<Mutex<ChargeController<T>>>) -> Self {
        Self { controller }
    }

    /// Clones the shared controller.
    pub fn clone_shared(&self) -> Arc<Mutex<ChargeController<T>>> {
        self.controller.clone()
    }

    /// Locks the controller for a sequence of reads.
    ///
    /// A panic while the lock was held leaves no broken state behind (the
    /// next exchange flushes the port), so a poisoned lock is recovered.
    pub fn lock(&self) -> MutexGuard<'_, ChargeController<T>> {
        self.controller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Reads and decodes any entry of the register map.
    pub fn read_field(&self, field: &Field) -> Result<DecodedValue> {
        self.lock().read_field(field)
    }

    charge_controller_fields!(safe_getters);
}
