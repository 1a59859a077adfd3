//! Renogy charge controller CLI
//!
//! A command-line interface (CLI) application for reading Renogy solar charge
//! controllers (Rover, Wanderer, Adventurer and compatible models) via Modbus RTU.
//!
//! This tool allows users to:
//! - Read the live telemetry: battery, load and PV values, temperatures and daily statistics.
//! - Read the controller information: ratings, model, versions and serial number.
//! - Read arbitrary raw registers.
//! - Run in a continuous daemon mode printing the telemetry to the console.
//! - Scan an RTU bus for connected controllers.
//!
//! Connection settings come from the command line or a YAML configuration file.
//! The CLI leverages the `renogymodbus_lib` crate for the protocol and client operations.

use anyhow::{bail, Context, Result};
use clap::Parser;
use flexi_logger::{Logger, LoggerHandle};
use log::*;
use renogymodbus_lib::{
    charge_controller::ChargeController,
    client::RetriableClient,
    decode::{self, DecodedValue},
    protocol::{self as proto, Field, FunctionCode},
    retry::RetryPolicy,
    serial::SerialTransport,
    transport::Transport,
};
use std::io::{stdout, Write};
use std::{panic, time::Duration};

mod commandline;
mod config;

use commandline::{CliCommands, CliConnection};
use config::Config;

fn logging_init(loglevel: LevelFilter) -> Result<LoggerHandle> {
    let log_handle = Logger::try_with_env_or_str(loglevel.as_str())
        .context("Cannot init logging")?
        .start()
        .context("Cannot start logging")?;

    panic::set_hook(Box::new(|panic_info| {
        let (filename, line, column) = panic_info
            .location()
            .map(|loc| (loc.file(), loc.line(), loc.column()))
            .unwrap_or(("<unknown_file>", 0, 0));

        let cause_str = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            *s
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.as_str()
        } else {
            "<unknown_panic_cause>"
        };

        error!(
            target: "panic",
            "Thread '{}' panicked at '{}': {}:{} - Cause: {}",
            std::thread::current().name().unwrap_or("<unnamed>"),
            filename,
            line,
            column,
            cause_str
        );
    }));
    Ok(log_handle)
}

/// Calculates the minimum recommended delay for Modbus RTU based on baud rate.
/// This is 3.5 character times of 11 bits each.
fn minimum_rtu_delay(baud_rate: u32) -> Duration {
    const BITS_PER_CHAR: f64 = 11.0;
    // Modbus fixes the silence at 1.75 ms above 19200 baud.
    const PRACTICAL_MIN_INTER_FRAME_DELAY_MICROS: u64 = 1_750;

    if baud_rate == 0 {
        return Duration::from_millis(16);
    }
    let char_time_secs = BITS_PER_CHAR / f64::from(baud_rate);
    let delay_micros = (3.5 * char_time_secs * 1_000_000.0) as u64;
    Duration::from_micros(delay_micros.max(PRACTICAL_MIN_INTER_FRAME_DELAY_MICROS))
}

/// Checks if the user-provided RTU delay is sufficient; if not, uses the calculated minimum.
fn check_rtu_delay(user_delay: Duration, baud_rate: u32) -> Duration {
    let min_rtu_delay = minimum_rtu_delay(baud_rate);
    if user_delay < min_rtu_delay {
        warn!(
            "User-defined RTU delay of {user_delay:?} is below the recommended minimum of {min_rtu_delay:?} for {baud_rate} baud. Using minimum."
        );
        min_rtu_delay
    } else {
        user_delay
    }
}

/// Formats a decoded value with the field's decimal places and unit.
fn format_value(field: &Field, value: &DecodedValue) -> String {
    let text = match value {
        DecodedValue::Unsigned(raw) if field.decimal_places > 0 => format!(
            "{:.*}",
            usize::from(field.decimal_places),
            decode::scale(*raw, field.decimal_places)
        ),
        value => value.to_string(),
    };
    match field.unit {
        Some(unit) => format!("{text} {unit}"),
        None => text,
    }
}

/// Reads and prints every field in order, pausing `delay` between requests.
///
/// A failing field is reported and skipped; the error of the last failure is
/// returned once all fields were tried.
fn print_fields<T: Transport>(
    controller: &mut ChargeController<T>,
    fields: &[Field],
    delay: Duration,
) -> Result<()> {
    let mut last_error = None;
    for (index, field) in fields.iter().enumerate() {
        if index > 0 {
            std::thread::sleep(delay);
        }
        match controller.read_field(field) {
            Ok(value) => println!("{}: {}", field.description, format_value(field, &value)),
            Err(error) => {
                println!("{}: <error>", field.description);
                warn!("Cannot read {}: {error}", field.name);
                last_error = Some(
                    anyhow::Error::new(error).context(format!("Cannot read {}", field.name)),
                );
            }
        }
    }
    match last_error {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

/// Handles the RTU scan command.
///
/// Every valid slave address is asked once for its Modbus address register.
fn handle_rtu_scan(device: &str, baud_rate: u32, config: &Config) -> Result<()> {
    let delay = check_rtu_delay(config.modbus.delay, baud_rate);
    info!("Starting RTU scan on device {device} at {baud_rate} baud");
    let mut transport = SerialTransport::open(device, baud_rate, config.modbus.timeout)
        .with_context(|| format!("Cannot open serial port {device} at baud {baud_rate}"))?;

    let mut found = Vec::new();
    for address in proto::Address::all() {
        print!("Scanning address {address} ... ");
        stdout().flush().context("Failed to flush stdout")?;

        let mut client =
            RetriableClient::with_policy(&mut transport, address, RetryPolicy::no_retry());
        match client.read_field(&proto::CONTROLLER_MODBUS_ADDRESS) {
            Ok(value) => {
                println!("found (reports address {value})");
                found.push(address);
            }
            Err(error) => {
                println!("no response");
                debug!("Scan error at address {address}: {error}");
            }
        }
        std::thread::sleep(delay);
    }

    if found.is_empty() {
        bail!("No charge controller found on {device} at {baud_rate} baud.");
    }
    println!(
        "Charge controllers found at address(es): {}",
        found
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(())
}

/// Resolves the effective configuration and the command of a connection.
///
/// Global command line options take precedence over the configuration file,
/// which takes precedence over the built-in defaults.
fn resolve_config<'a>(
    args: &'a commandline::CliArgs,
) -> Result<(Config, Option<&'a CliCommands>)> {
    let (mut config, command) = match &args.connection {
        CliConnection::Rtu {
            device,
            baud_rate,
            address,
            command,
        } => {
            let mut config = Config::default();
            config.modbus.device = device.clone();
            config.modbus.baud_rate = *baud_rate;
            config.modbus.address = *address;
            (config, Some(command))
        }
        CliConnection::Config { file, command } => (Config::load(file)?, Some(command)),
        CliConnection::RtuScan { .. } => (Config::default(), None),
    };
    args.apply_to(&mut config);
    Ok((config, command))
}

/// Creates a new charge controller client for the configured serial port.
fn create_controller(config: &Config) -> Result<ChargeController<SerialTransport>> {
    let modbus = &config.modbus;
    info!(
        "Attempting to connect via RTU to device {} (Address: {}, Baud: {})...",
        modbus.device, modbus.address, modbus.baud_rate
    );
    let transport = SerialTransport::open(&modbus.device, modbus.baud_rate, modbus.timeout)
        .with_context(|| {
            format!(
                "Cannot open serial port {} at baud {}",
                modbus.device, modbus.baud_rate
            )
        })?;
    Ok(ChargeController::new(RetriableClient::with_policy(
        transport,
        modbus.address,
        config.retry.policy(),
    )))
}

fn main() -> Result<()> {
    let args = commandline::CliArgs::parse();

    let _log_handle = logging_init(args.verbose.log_level_filter())?;
    info!(
        "Renogy charge controller CLI started. Log level: {}",
        args.verbose.log_level_filter()
    );

    let (config, command) = resolve_config(&args)?;
    debug!("Effective configuration: {config:?}");

    // RTU scan has its own workflow
    let Some(command) = command else {
        if let CliConnection::RtuScan { device, baud_rate } = &args.connection {
            return handle_rtu_scan(device, *baud_rate, &config);
        }
        unreachable!("Only the RTU scan comes without a command");
    };

    let delay = check_rtu_delay(config.modbus.delay, config.modbus.baud_rate);
    let mut controller = create_controller(&config)?;

    match command {
        CliCommands::Daemon { poll_interval } => {
            let poll_interval = poll_interval.unwrap_or(config.poll_interval);
            info!("Starting daemon mode: interval={poll_interval:?}");
            loop {
                debug!("Daemon: Reading telemetry...");
                if let Err(error) = print_fields(&mut controller, proto::TELEMETRY, delay) {
                    error!("{error:#}");
                }
                println!();
                std::thread::sleep(delay.max(poll_interval));
            }
        }
        CliCommands::Read => {
            info!("Executing: Read Telemetry");
            print_fields(&mut controller, proto::TELEMETRY, delay)?;
        }
        CliCommands::Info => {
            info!("Executing: Read Controller Information");
            print_fields(&mut controller, proto::CONTROLLER_INFO, delay)?;
        }
        CliCommands::ReadAll => {
            info!("Executing: Read All Values");
            let info = print_fields(&mut controller, proto::CONTROLLER_INFO, delay);
            std::thread::sleep(delay);
            let telemetry = print_fields(&mut controller, proto::TELEMETRY, delay);
            info.and(telemetry)?;
        }
        CliCommands::ReadRegister {
            address,
            count,
            input,
        } => {
            let function = if *input {
                FunctionCode::ReadInputRegisters
            } else {
                FunctionCode::ReadHoldingRegisters
            };
            info!("Executing: Read {count} register(s) at {address:#06X} with {function}");
            let words = controller
                .client_mut()
                .read_multiple_registers(*address, *count, function)
                .with_context(|| format!("Cannot read register {address:#06X}"))?;
            for (offset, word) in (0..).zip(words) {
                let register = address.wrapping_add(offset);
                println!("{register:#06X}: {word:#06X} ({word})");
            }
        }
    }

    Ok(())
}
