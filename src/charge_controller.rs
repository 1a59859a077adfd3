//! Named getters for the registers of a Renogy charge controller.
//!
//! Each getter reads one entry of the [`protocol`](crate::protocol) register
//! map through a [`RetriableClient`] and converts the decoded value to the
//! getter's return type. Values are returned unscaled; apply
//! [`decode::scale`](crate::decode::scale) with the field's `decimal_places`
//! for physical units.
//!
//! ## Example
//!
//! ```no_run
//! use renogymodbus_lib::{
//!     charge_controller::ChargeController,
//!     client::RetriableClient,
//!     decode,
//!     protocol::{self, Address},
//!     serial::SerialTransport,
//! };
//! use std::time::Duration;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = SerialTransport::open("/dev/ttyUSB0", 9600, Duration::from_secs(1))?;
//!     let mut controller = ChargeController::new(RetriableClient::new(transport, Address::default()));
//!
//!     let raw = controller.battery_voltage()?;
//!     let volts = decode::scale(raw, protocol::BATTERY_VOLTAGE.decimal_places);
//!     println!("{}: {volts} V", controller.controller_model()?);
//!     Ok(())
//! }
//! ```

use crate::{
    client::RetriableClient,
    decode::DecodedValue,
    error::Result,
    protocol::Field,
    transport::Transport,
};

/// Invokes `$callback!` with the list of `getter: type = FIELD;` entries.
///
/// Shared by [`ChargeController`] and the safe client so that both expose the
/// same getters.
macro_rules! charge_controller_fields {
    ($callback:ident) => {
        $callback! {
            /// Controller battery/load voltage rating in volts.
            controller_voltage_rating: u16 = CONTROLLER_VOLTAGE_RATING;
            /// Controller current rating in amps.
            controller_current_rating: u16 = CONTROLLER_CURRENT_RATING;
            /// Controller discharge rating in amps.
            controller_discharge_rating: u16 = CONTROLLER_DISCHARGE_RATING;
            /// Controller type.
            controller_type: u16 = CONTROLLER_TYPE;
            /// Controller model name.
            controller_model: String = CONTROLLER_MODEL;
            /// Controller software version.
            controller_software_version: (u16, u16) = CONTROLLER_SOFTWARE_VERSION;
            /// Controller hardware version.
            controller_hardware_version: (u16, u16) = CONTROLLER_HARDWARE_VERSION;
            /// Controller serial number.
            controller_serial_number: Vec<u8> = CONTROLLER_SERIAL_NUMBER;
            /// Controller Modbus address.
            controller_modbus_address: u16 = CONTROLLER_MODBUS_ADDRESS;
            /// Battery state of charge in percent.
            battery_state_of_charge: u16 = BATTERY_STATE_OF_CHARGE;
            /// Battery voltage in 0.1 V.
            battery_voltage: u16 = BATTERY_VOLTAGE;
            /// Battery charge current in 0.01 A.
            battery_current: u16 = BATTERY_CURRENT;
            /// Battery temperature in °C.
            battery_temperature: i16 = BATTERY_TEMPERATURE;
            /// Temperature inside the controller in °C.
            controller_temperature: i16 = CONTROLLER_TEMPERATURE;
            /// Load output voltage in 0.1 V.
            load_voltage: u16 = LOAD_VOLTAGE;
            /// Load output current in 0.01 A.
            load_current: u16 = LOAD_CURRENT;
            /// Load output power in watts.
            load_power: u16 = LOAD_POWER;
            /// PV array input voltage in 0.1 V.
            solar_voltage: u16 = SOLAR_VOLTAGE;
            /// PV array input current in 0.01 A.
            solar_current: u16 = SOLAR_CURRENT;
            /// PV array input power in watts.
            solar_power: u16 = SOLAR_POWER;
            /// Minimum battery voltage today in 0.1 V.
            minimum_battery_voltage_today: u16 = MINIMUM_BATTERY_VOLTAGE_TODAY;
            /// Maximum battery voltage today in 0.1 V.
            maximum_battery_voltage_today: u16 = MAXIMUM_BATTERY_VOLTAGE_TODAY;
            /// Maximum charge current today.
            maximum_charge_current_today: u16 = MAXIMUM_CHARGE_CURRENT_TODAY;
            /// Maximum load/discharge current today.
            maximum_load_current_today: u16 = MAXIMUM_LOAD_CURRENT_TODAY;
            /// Maximum solar power today in watts.
            maximum_solar_power_today: u16 = MAXIMUM_SOLAR_POWER_TODAY;
            /// Minimum solar power today in watts.
            minimum_solar_power_today: u16 = MINIMUM_SOLAR_POWER_TODAY;
            /// Charge today in amp hours.
            charge_today: u16 = CHARGE_TODAY;
            /// Discharge today in amp hours.
            discharge_today: u16 = DISCHARGE_TODAY;
            /// Charge energy today in watt hours.
            charge_energy_today: u16 = CHARGE_ENERGY_TODAY;
            /// Discharge energy today in watt hours.
            discharge_energy_today: u16 = DISCHARGE_ENERGY_TODAY;
            /// Controller uptime in days.
            controller_uptime: u16 = CONTROLLER_UPTIME;
            /// Total battery overcharges.
            total_battery_overcharges: u16 = TOTAL_BATTERY_OVERCHARGES;
            /// Total battery full charges.
            total_battery_full_charges: u16 = TOTAL_BATTERY_FULL_CHARGES;
        }
    };
}
#[cfg(feature = "safe-client")]
pub(crate) use charge_controller_fields;

macro_rules! controller_getters {
    ($($(#[$meta:meta])* $getter:ident: $ty:ty = $field:ident;)+) => {
        $(
            $(#[$meta])*
            pub fn $getter(&mut self) -> Result<$ty> {
                self.read(&crate::protocol::$field)
            }
        )+
    };
}

/// Synchronous client for a Renogy charge controller.
///
/// All getters block the calling thread until the read succeeds or fails
/// terminally.
#[derive(Debug)]
pub struct ChargeController<T> {
    client: RetriableClient<T>,
}

impl<T: Transport> ChargeController<T> {
    pub fn new(client: RetriableClient<T>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &RetriableClient<T> {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut RetriableClient<T> {
        &mut self.client
    }

    pub fn into_inner(self) -> RetriableClient<T> {
        self.client
    }

    /// Reads and decodes any entry of the register map.
    pub fn read_field(&mut self, field: &Field) -> Result<DecodedValue> {
        self.client.read_field(field)
    }

    /// Reads a field and converts it to the getter's type.
    fn read<V>(&mut self, field: &Field) -> Result<V>
    where
        V: TryFrom<DecodedValue, Error = crate::decode::DecodeError>,
    {
        Ok(V::try_from(self.client.read_field(field)?)?)
    }

    charge_controller_fields!(controller_getters);
}
