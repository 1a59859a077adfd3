use crate::config::{default_device_name, Config};
use clap::{Parser, Subcommand};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use renogymodbus_lib::protocol as proto;
use std::num::NonZeroU8;
use std::path::PathBuf;
use std::time::Duration;

fn parse_address(s: &str) -> Result<proto::Address, String> {
    let address_val =
        clap_num::maybe_hex::<u8>(s).map_err(|e| format!("Invalid address format: {e}"))?;
    proto::Address::try_from(address_val).map_err(|e| e.to_string())
}

fn parse_register(s: &str) -> Result<u16, String> {
    clap_num::maybe_hex::<u16>(s).map_err(|e| format!("Invalid register address format: {e}"))
}

fn parse_count(s: &str) -> Result<u16, String> {
    clap_num::number_range(s, 1, renogymodbus_lib::frame::MAX_READ_QUANTITY)
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum CliConnection {
    /// Connect to a charge controller via Modbus RTU (Serial).
    Rtu {
        /// Serial port device name.
        /// Examples: "/dev/ttyUSB0" (Linux), "COM3" (Windows).
        #[arg(short, long, default_value_t = default_device_name(), verbatim_doc_comment)]
        device: String,

        /// Baud rate for serial communication.
        /// Must match the controller's configured baud rate.
        #[arg(long, default_value_t = proto::FACTORY_DEFAULT_BAUD_RATE, verbatim_doc_comment)]
        baud_rate: u32,

        /// The Modbus RTU slave address of the controller (1 to 247).
        /// Can be specified in decimal or hexadecimal (e.g., "0x10").
        #[arg(short, long, default_value_t = proto::Address::default(), value_parser = parse_address, verbatim_doc_comment)]
        address: proto::Address,

        /// RTU-specific commands for the connected controller.
        #[command(subcommand)]
        command: CliCommands,
    },
    /// Connect to a charge controller using the settings of a YAML file.
    /// Command line options given globally override the file.
    #[clap(verbatim_doc_comment)]
    Config {
        /// The configuration file.
        #[arg(short, long, default_value = Config::DEFAULT_CONFIG_FILE)]
        file: PathBuf,

        /// Commands for the configured controller.
        #[command(subcommand)]
        command: CliCommands,
    },
    /// Scan a Modbus RTU (Serial) bus for charge controllers.
    /// Every slave address from 1 to 247 is asked once for its
    /// Modbus address register; addresses that answer are listed.
    #[clap(verbatim_doc_comment)]
    RtuScan {
        /// Serial port device name to scan.
        /// Examples: "/dev/ttyUSB0" (Linux), "COM3" (Windows).
        #[arg(short, long, default_value_t = default_device_name(), verbatim_doc_comment)]
        device: String,

        /// Baud rate for serial communication.
        #[arg(long, default_value_t = proto::FACTORY_DEFAULT_BAUD_RATE)]
        baud_rate: u32,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum CliCommands {
    /// Run in daemon mode: continuously poll the live telemetry
    /// and print it to the console.
    #[clap(verbatim_doc_comment)]
    Daemon {
        /// Interval for fetching telemetry (e.g., "10s", "1m").
        /// Defaults to the configured poll interval.
        #[arg(value_parser = humantime::parse_duration, short, long, verbatim_doc_comment)]
        poll_interval: Option<Duration>,
    },

    /// Read and display the live telemetry: battery, load and solar values,
    /// temperatures and daily statistics.
    #[clap(verbatim_doc_comment)]
    Read,

    /// Read and display the controller information: ratings, model,
    /// versions, serial number and Modbus address.
    #[clap(verbatim_doc_comment)]
    Info,

    /// Read and display the controller information and the live telemetry.
    ReadAll,

    /// Read raw register words.
    ReadRegister {
        /// First register address.
        /// Can be specified in decimal or hexadecimal (e.g., "0x0100").
        #[arg(value_parser = parse_register, verbatim_doc_comment)]
        address: u16,

        /// Number of consecutive registers (1 to 125).
        #[arg(short, long, default_value_t = 1, value_parser = parse_count)]
        count: u16,

        /// Read input registers (function 4) instead of holding registers.
        #[arg(short, long)]
        input: bool,
    },
}

const fn about_text() -> &'static str {
    "Renogy charge controller CLI - Read solar charge controllers via Modbus RTU."
}

#[derive(Parser, Debug)]
#[command(name="renogymodbus", author, version, about=about_text(), long_about = None, propagate_version = true)]
pub struct CliArgs {
    /// Configure verbosity of logging output.
    /// -v for info, -vv for debug, -vvv for trace. Default is warnings only.
    #[command(flatten)]
    pub verbose: Verbosity<WarnLevel>,

    /// Specifies the connection method and controller commands.
    #[command(subcommand)]
    pub connection: CliConnection,

    /// Timeout of a single Modbus exchange.
    /// Examples: "1s", "500ms".
    #[arg(global = true, long, value_parser = humantime::parse_duration, verbatim_doc_comment)]
    pub timeout: Option<Duration>,

    /// Minimum delay between multiple Modbus commands sent to the controller.
    /// Important for Modbus RTU, especially with USB-to-RS485 converters that need time
    /// to switch between transmitting (TX) and receiving (RX) modes.
    /// Examples: "50ms", "100ms".
    #[arg(global = true, long, value_parser = humantime::parse_duration, verbatim_doc_comment)]
    pub delay: Option<Duration>,

    /// Number of attempts per read, the first one included.
    #[arg(global = true, long)]
    pub attempts: Option<NonZeroU8>,

    /// Pause before a failed read is attempted again.
    /// Examples: "100ms", "1s".
    #[arg(global = true, long, value_parser = humantime::parse_duration, verbatim_doc_comment)]
    pub retry_delay: Option<Duration>,

    /// Also retry reads the controller answered with "slave device busy".
    #[arg(global = true, long)]
    pub retry_on_busy: bool,
}

impl CliArgs {
    /// Applies the global options on top of `config`.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(timeout) = self.timeout {
            config.modbus.timeout = timeout;
        }
        if let Some(delay) = self.delay {
            config.modbus.delay = delay;
        }
        if let Some(attempts) = self.attempts {
            config.retry.attempts = attempts;
        }
        if let Some(retry_delay) = self.retry_delay {
            config.retry.delay = retry_delay;
        }
        if self.retry_on_busy {
            config.retry.retry_on_busy = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn parse_rtu_read_register() {
        let args = CliArgs::try_parse_from([
            "renogymodbus",
            "--timeout",
            "500ms",
            "rtu",
            "--address",
            "0x10",
            "read-register",
            "0x0100",
            "--count",
            "2",
            "--input",
        ])
        .unwrap();
        assert_eq!(args.timeout, Some(Duration::from_millis(500)));
        assert_matches!(
            args.connection,
            CliConnection::Rtu {
                baud_rate: 9600,
                address,
                command: CliCommands::ReadRegister {
                    address: 0x0100,
                    count: 2,
                    input: true,
                },
                ..
            } if *address == 16
        );
    }

    #[test]
    fn rejects_invalid_values() {
        for argv in [
            &["renogymodbus", "rtu", "--address", "0", "read"][..],
            &["renogymodbus", "rtu", "--address", "248", "read"],
            &["renogymodbus", "rtu", "read-register", "1", "--count", "126"],
            &["renogymodbus", "rtu", "read-register", "1", "--count", "0"],
            &["renogymodbus", "--attempts", "0", "rtu", "read"],
        ] {
            assert!(CliArgs::try_parse_from(argv).is_err(), "{argv:?}");
        }
    }

    #[test]
    fn global_options_override_config() {
        let args = CliArgs::try_parse_from([
            "renogymodbus",
            "config",
            "--file",
            "site.yaml",
            "daemon",
            "--attempts",
            "5",
            "--retry-on-busy",
        ])
        .unwrap();
        assert_matches!(
            &args.connection,
            CliConnection::Config { file, command: CliCommands::Daemon { poll_interval: None } }
                if file == &PathBuf::from("site.yaml")
        );

        let mut config = Config::default();
        args.apply_to(&mut config);
        assert_eq!(config.retry.attempts.get(), 5);
        assert!(config.retry.retry_on_busy);
        assert_eq!(config.modbus.timeout, Config::default().modbus.timeout);
    }
}
