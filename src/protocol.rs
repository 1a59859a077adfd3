//! Protocol types and the register map of Renogy charge controllers.
//!
//! Every value the controller exposes is described by a [`Field`]: where it
//! lives (register address and function code), how many registers it spans
//! and how the raw words are turned into a value ([`Decoder`]). The named
//! getters of [`crate::charge_controller::ChargeController`] are thin wrappers
//! over the entries of this table.
//!
//! # Decimal places
//!
//! Many fields carry a `decimal_places` hint (battery voltage is reported in
//! tenths of a volt, currents in hundredths of an ampere). The hint is handed
//! to the raw register read for interface symmetry but is *not* applied by it:
//! getters return the raw word exactly as the device sent it. Use
//! [`crate::decode::scale`] to obtain the physical value.

use crate::decode::{self, DecodeError, DecodedValue};
use std::fmt;
use std::ops::Deref;

/// Errors raised when protocol values are built from untrusted input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The slave address is outside of `1..=247`.
    #[error("The address value {0} is outside the valid range of {min} to {max}", min = Address::MIN, max = Address::MAX)]
    AddressOutOfRange(u8),
    /// Only the two register read function codes are supported.
    #[error("Unsupported function code 0x{0:02X}, expected 0x03 or 0x04")]
    FunctionCodeUnsupported(u8),
}

/// Factory default baud rate of the RS-232/RS-485 port.
pub const FACTORY_DEFAULT_BAUD_RATE: u32 = 9600;

/// A validated Modbus slave address.
///
/// Unicast addresses range from 1 to 247. The broadcast address 0 is not
/// accepted since broadcast requests are never answered and therefore cannot
/// be read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u8", into = "u8"))]
pub struct Address(u8);

impl Address {
    /// The lowest unicast address.
    pub const MIN: u8 = 1;
    /// The highest unicast address.
    pub const MAX: u8 = 247;
    /// Address the controllers ship with.
    pub const FACTORY_DEFAULT: Address = Address(0x01);

    /// All valid unicast addresses in ascending order.
    pub fn all() -> impl Iterator<Item = Address> {
        (Self::MIN..=Self::MAX).map(Address)
    }
}

impl Deref for Address {
    type Target = u8;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Default for Address {
    fn default() -> Self {
        Self::FACTORY_DEFAULT
    }
}

impl TryFrom<u8> for Address {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(Error::AddressOutOfRange(value))
        }
    }
}

impl From<Address> for u8 {
    fn from(address: Address) -> Self {
        address.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The register bank a read targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FunctionCode {
    /// Read holding registers (`0x03`).
    ReadHoldingRegisters = 0x03,
    /// Read input registers (`0x04`).
    ReadInputRegisters = 0x04,
}

impl FunctionCode {
    /// The code as it appears on the wire.
    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for FunctionCode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x03 => Ok(Self::ReadHoldingRegisters),
            0x04 => Ok(Self::ReadInputRegisters),
            other => Err(Error::FunctionCodeUnsupported(other)),
        }
    }
}

impl fmt::Display for FunctionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadHoldingRegisters => write!(f, "read holding registers (0x03)"),
            Self::ReadInputRegisters => write!(f, "read input registers (0x04)"),
        }
    }
}

/// Decoding rule of a [`Field`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoder {
    /// The register value as-is.
    Unsigned,
    /// Bits 8-15 of the register.
    HighByte,
    /// Bits 0-7 of the register.
    LowByte,
    /// Signed-magnitude value in bits 0-7 (bit 7 is the sign).
    LowSignedMagnitude,
    /// Signed-magnitude value in bits 8-15 (bit 15 is the sign).
    HighSignedMagnitude,
    /// UTF-8 text assembled from the register bytes.
    Text,
    /// The register bytes, uninterpreted.
    Bytes,
    /// Two registers returned as a pair.
    Version,
}

/// One entry of the register map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    /// Machine readable name, e.g. `battery_voltage`.
    pub name: &'static str,
    /// Human readable description.
    pub description: &'static str,
    /// Physical unit after scaling, if any.
    pub unit: Option<&'static str>,
    /// First register address.
    pub address: u16,
    /// Register bank.
    pub function: FunctionCode,
    /// Number of consecutive registers.
    pub quantity: u16,
    /// Decimal places of the raw value. Not applied by the raw read.
    pub decimal_places: u8,
    /// Whether the field is signed. Not applied by the raw read.
    pub signed: bool,
    /// How the words are decoded.
    pub decoder: Decoder,
}

impl Field {
    /// A single unsigned holding register without scaling.
    pub const fn holding(name: &'static str, description: &'static str, address: u16) -> Self {
        Self {
            name,
            description,
            unit: None,
            address,
            function: FunctionCode::ReadHoldingRegisters,
            quantity: 1,
            decimal_places: 0,
            signed: false,
            decoder: Decoder::Unsigned,
        }
    }

    pub const fn unit(self, unit: &'static str) -> Self {
        Self {
            unit: Some(unit),
            ..self
        }
    }

    pub const fn decimal_places(self, decimal_places: u8) -> Self {
        Self {
            decimal_places,
            ..self
        }
    }

    pub const fn quantity(self, quantity: u16) -> Self {
        Self { quantity, ..self }
    }

    pub const fn decoder(self, decoder: Decoder) -> Self {
        Self { decoder, ..self }
    }

    /// Looks up a field of [`FIELDS`] by its name.
    pub fn by_name(name: &str) -> Option<&'static Field> {
        FIELDS.iter().find(|field| field.name == name)
    }

    /// Decodes the raw words read for this field.
    pub fn decode(&self, words: &[u16]) -> Result<DecodedValue, DecodeError> {
        // Every decoder needs at least one word.
        let expected = usize::from(self.quantity.max(1));
        if words.len() != expected || self.quantity == 0 {
            return Err(DecodeError::WordCount {
                expected,
                actual: words.len(),
            });
        }
        Ok(match self.decoder {
            Decoder::Unsigned => DecodedValue::Unsigned(words[0]),
            Decoder::HighByte => DecodedValue::Unsigned(decode::high_byte(words[0]).into()),
            Decoder::LowByte => DecodedValue::Unsigned(decode::low_byte(words[0]).into()),
            Decoder::LowSignedMagnitude => {
                DecodedValue::SignedMagnitude(decode::split_signed_magnitude(words[0]).0)
            }
            Decoder::HighSignedMagnitude => {
                DecodedValue::SignedMagnitude(decode::split_signed_magnitude(words[0]).1)
            }
            Decoder::Text => DecodedValue::Text(decode::words_to_string(words)?),
            Decoder::Bytes => DecodedValue::Bytes(decode::words_to_bytes(words)),
            Decoder::Version => {
                let (major, minor) = decode::words_to_version(words)?;
                DecodedValue::Version(major, minor)
            }
        })
    }
}

// Controller information

pub const CONTROLLER_VOLTAGE_RATING: Field = Field::holding(
    "controller_voltage_rating",
    "Controller battery/load voltage rating",
    0x000A,
)
.unit("V")
.decoder(Decoder::HighByte);
pub const CONTROLLER_CURRENT_RATING: Field = Field::holding(
    "controller_current_rating",
    "Controller current rating",
    0x000A,
)
.unit("A")
.decoder(Decoder::LowByte);
pub const CONTROLLER_DISCHARGE_RATING: Field = Field::holding(
    "controller_discharge_rating",
    "Controller discharge rating",
    0x000B,
)
.unit("A")
.decoder(Decoder::HighByte);
pub const CONTROLLER_TYPE: Field =
    Field::holding("controller_type", "Controller type", 0x000B).decoder(Decoder::LowByte);
pub const CONTROLLER_MODEL: Field = Field::holding("controller_model", "Controller model", 0x000C)
    .quantity(8)
    .decoder(Decoder::Text);
pub const CONTROLLER_SOFTWARE_VERSION: Field = Field::holding(
    "controller_software_version",
    "Controller software version",
    0x0014,
)
.quantity(2)
.decoder(Decoder::Version);
pub const CONTROLLER_HARDWARE_VERSION: Field = Field::holding(
    "controller_hardware_version",
    "Controller hardware version",
    0x0016,
)
.quantity(2)
.decoder(Decoder::Version);
pub const CONTROLLER_SERIAL_NUMBER: Field = Field::holding(
    "controller_serial_number",
    "Controller serial number",
    0x0018,
)
.quantity(2)
.decoder(Decoder::Bytes);
pub const CONTROLLER_MODBUS_ADDRESS: Field = Field::holding(
    "controller_modbus_address",
    "Controller Modbus address",
    0x001A,
);

// Live data

pub const BATTERY_STATE_OF_CHARGE: Field = Field::holding(
    "battery_state_of_charge",
    "Battery state of charge",
    0x0100,
)
.unit("%");
pub const BATTERY_VOLTAGE: Field = Field::holding("battery_voltage", "Battery voltage", 0x0101)
    .decimal_places(1)
    .unit("V");
pub const BATTERY_CURRENT: Field =
    Field::holding("battery_current", "Battery charge current", 0x0102)
        .decimal_places(2)
        .unit("A");
pub const BATTERY_TEMPERATURE: Field =
    Field::holding("battery_temperature", "Battery temperature", 0x0103)
        .unit("°C")
        .decoder(Decoder::LowSignedMagnitude);
pub const CONTROLLER_TEMPERATURE: Field = Field::holding(
    "controller_temperature",
    "Temperature inside equipment",
    0x0103,
)
.unit("°C")
.decoder(Decoder::HighSignedMagnitude);
pub const LOAD_VOLTAGE: Field = Field::holding("load_voltage", "Load output voltage", 0x0104)
    .decimal_places(1)
    .unit("V");
pub const LOAD_CURRENT: Field = Field::holding("load_current", "Load output current", 0x0105)
    .decimal_places(2)
    .unit("A");
pub const LOAD_POWER: Field = Field::holding("load_power", "Load output power", 0x0106).unit("W");
pub const SOLAR_VOLTAGE: Field = Field::holding("solar_voltage", "PV array input voltage", 0x0107)
    .decimal_places(1)
    .unit("V");
pub const SOLAR_CURRENT: Field = Field::holding("solar_current", "PV array input current", 0x0108)
    .decimal_places(2)
    .unit("A");
pub const SOLAR_POWER: Field =
    Field::holding("solar_power", "PV array input power", 0x0109).unit("W");

// Daily statistics

pub const MINIMUM_BATTERY_VOLTAGE_TODAY: Field = Field::holding(
    "minimum_battery_voltage_today",
    "Minimum battery voltage today",
    0x010B,
)
.decimal_places(1)
.unit("V");
pub const MAXIMUM_BATTERY_VOLTAGE_TODAY: Field = Field::holding(
    "maximum_battery_voltage_today",
    "Maximum battery voltage today",
    0x010C,
)
.decimal_places(1)
.unit("V");
pub const MAXIMUM_CHARGE_CURRENT_TODAY: Field = Field::holding(
    "maximum_charge_current_today",
    "Maximum charge current today",
    0x010D,
)
.unit("A");
pub const MAXIMUM_LOAD_CURRENT_TODAY: Field = Field::holding(
    "maximum_load_current_today",
    "Maximum load/discharge current today",
    0x010E,
)
.unit("A");
/// Unverified: the vendor register sheet lists 0x010F as the maximum charge
/// power of the day.
pub const MAXIMUM_SOLAR_POWER_TODAY: Field = Field::holding(
    "maximum_solar_power_today",
    "Maximum solar power today",
    0x010F,
)
.unit("W");
/// Unverified: the vendor register sheet lists 0x0110 as the maximum
/// load/discharge power of the day.
pub const MINIMUM_SOLAR_POWER_TODAY: Field = Field::holding(
    "minimum_solar_power_today",
    "Minimum solar power today",
    0x0110,
)
.unit("W");
pub const CHARGE_TODAY: Field =
    Field::holding("charge_today", "Charge today", 0x0111).unit("Ah");
pub const DISCHARGE_TODAY: Field =
    Field::holding("discharge_today", "Discharge today", 0x0112).unit("Ah");
pub const CHARGE_ENERGY_TODAY: Field =
    Field::holding("charge_energy_today", "Charge energy today", 0x0113).unit("Wh");
pub const DISCHARGE_ENERGY_TODAY: Field =
    Field::holding("discharge_energy_today", "Discharge energy today", 0x0114).unit("Wh");

// Historical data

pub const CONTROLLER_UPTIME: Field =
    Field::holding("controller_uptime", "Controller uptime", 0x0115).unit("days");
pub const TOTAL_BATTERY_OVERCHARGES: Field = Field::holding(
    "total_battery_overcharges",
    "Total battery overcharges",
    0x0116,
);
pub const TOTAL_BATTERY_FULL_CHARGES: Field = Field::holding(
    "total_battery_full_charges",
    "Total battery full charges",
    0x0117,
);

/// Static information about the controller itself.
pub const CONTROLLER_INFO: &[Field] = &[
    CONTROLLER_VOLTAGE_RATING,
    CONTROLLER_CURRENT_RATING,
    CONTROLLER_DISCHARGE_RATING,
    CONTROLLER_TYPE,
    CONTROLLER_MODEL,
    CONTROLLER_SOFTWARE_VERSION,
    CONTROLLER_HARDWARE_VERSION,
    CONTROLLER_SERIAL_NUMBER,
    CONTROLLER_MODBUS_ADDRESS,
];

/// Live values, daily statistics and counters.
pub const TELEMETRY: &[Field] = &[
    BATTERY_STATE_OF_CHARGE,
    BATTERY_VOLTAGE,
    BATTERY_CURRENT,
    BATTERY_TEMPERATURE,
    CONTROLLER_TEMPERATURE,
    LOAD_VOLTAGE,
    LOAD_CURRENT,
    LOAD_POWER,
    SOLAR_VOLTAGE,
    SOLAR_CURRENT,
    SOLAR_POWER,
    MINIMUM_BATTERY_VOLTAGE_TODAY,
    MAXIMUM_BATTERY_VOLTAGE_TODAY,
    MAXIMUM_CHARGE_CURRENT_TODAY,
    MAXIMUM_LOAD_CURRENT_TODAY,
    MAXIMUM_SOLAR_POWER_TODAY,
    MINIMUM_SOLAR_POWER_TODAY,
    CHARGE_TODAY,
    DISCHARGE_TODAY,
    CHARGE_ENERGY_TODAY,
    DISCHARGE_ENERGY_TODAY,
    CONTROLLER_UPTIME,
    TOTAL_BATTERY_OVERCHARGES,
    TOTAL_BATTERY_FULL_CHARGES,
];

/// The complete register map.
pub const FIELDS: &[Field] = &[
    CONTROLLER_VOLTAGE_RATING,
    CONTROLLER_CURRENT_RATING,
    CONTROLLER_DISCHARGE_RATING,
    CONTROLLER_TYPE,
    CONTROLLER_MODEL,
    CONTROLLER_SOFTWARE_VERSION,
    CONTROLLER_HARDWARE_VERSION,
    CONTROLLER_SERIAL_NUMBER,
    CONTROLLER_MODBUS_ADDRESS,
    BATTERY_STATE_OF_CHARGE,
    BATTERY_VOLTAGE,
    BATTERY_CURRENT,
    BATTERY_TEMPERATURE,
    CONTROLLER_TEMPERATURE,
    LOAD_VOLTAGE,
    LOAD_CURRENT,
    LOAD_POWER,
    SOLAR_VOLTAGE,
    SOLAR_CURRENT,
    SOLAR_POWER,
    MINIMUM_BATTERY_VOLTAGE_TODAY,
    MAXIMUM_BATTERY_VOLTAGE_TODAY,
    MAXIMUM_CHARGE_CURRENT_TODAY,
    MAXIMUM_LOAD_CURRENT_TODAY,
    MAXIMUM_SOLAR_POWER_TODAY,
    MINIMUM_SOLAR_POWER_TODAY,
    CHARGE_TODAY,
    DISCHARGE_TODAY,
    CHARGE_ENERGY_TODAY,
    DISCHARGE_ENERGY_TODAY,
    CONTROLLER_UPTIME,
    TOTAL_BATTERY_OVERCHARGES,
    TOTAL_BATTERY_FULL_CHARGES,
];

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn address_range() {
        assert_matches!(Address::try_from(0), Err(Error::AddressOutOfRange(0)));
        assert_eq!(*Address::try_from(1).unwrap(), 1);
        assert_eq!(*Address::try_from(247).unwrap(), 247);
        assert_matches!(Address::try_from(248), Err(Error::AddressOutOfRange(248)));
        assert_eq!(Address::all().count(), 247);
        assert_eq!(Address::default(), Address::FACTORY_DEFAULT);
    }

    #[test]
    fn function_code_from_u8() {
        assert_eq!(
            FunctionCode::try_from(3).unwrap(),
            FunctionCode::ReadHoldingRegisters
        );
        assert_eq!(
            FunctionCode::try_from(4).unwrap(),
            FunctionCode::ReadInputRegisters
        );
        assert_matches!(
            FunctionCode::try_from(6),
            Err(Error::FunctionCodeUnsupported(6))
        );
    }

    #[test]
    fn field_names_are_unique() {
        for (i, field) in FIELDS.iter().enumerate() {
            assert!(
                FIELDS[i + 1..].iter().all(|other| other.name != field.name),
                "duplicate field name {}",
                field.name
            );
        }
        assert_eq!(FIELDS.len(), CONTROLLER_INFO.len() + TELEMETRY.len());
    }

    #[test]
    fn field_table_entries() {
        let field = Field::by_name("battery_state_of_charge").unwrap();
        assert_eq!(field.address, 0x0100);
        assert_eq!(field.function, FunctionCode::ReadHoldingRegisters);
        assert_eq!(field.quantity, 1);
        assert_eq!(field.decimal_places, 0);

        assert_eq!(BATTERY_VOLTAGE.decimal_places, 1);
        assert_eq!(SOLAR_CURRENT.decimal_places, 2);
        assert_eq!(CONTROLLER_MODEL.quantity, 8);
        assert_eq!(CONTROLLER_SERIAL_NUMBER.address, 0x0018);
        assert!(Field::by_name("no_such_field").is_none());
    }

    #[test]
    fn decode_packed_ratings() {
        assert_eq!(
            CONTROLLER_VOLTAGE_RATING.decode(&[0x0C28]).unwrap(),
            DecodedValue::Unsigned(12)
        );
        assert_eq!(
            CONTROLLER_CURRENT_RATING.decode(&[0x0C28]).unwrap(),
            DecodedValue::Unsigned(40)
        );
    }

    #[test]
    fn decode_temperatures() {
        assert_eq!(
            CONTROLLER_TEMPERATURE.decode(&[0x8519]).unwrap(),
            DecodedValue::SignedMagnitude(-5)
        );
        assert_eq!(
            BATTERY_TEMPERATURE.decode(&[0x8519]).unwrap(),
            DecodedValue::SignedMagnitude(25)
        );
    }

    #[test]
    fn decode_rejects_wrong_word_count() {
        assert_matches!(
            CONTROLLER_MODEL.decode(&[0x4142]),
            Err(DecodeError::WordCount {
                expected: 8,
                actual: 1
            })
        );
    }

    #[test]
    fn zero_quantity_field_does_not_decode() {
        let empty = Field::holding("empty", "No registers", 0x0100).quantity(0);
        assert_matches!(
            empty.decode(&[]),
            Err(DecodeError::WordCount {
                expected: 1,
                actual: 0
            })
        );
        assert_matches!(empty.decode(&[42]), Err(DecodeError::WordCount { .. }));
    }
}
