use anyhow::{Context, Result};
use renogymodbus_lib::{protocol as proto, retry::RetryPolicy, serial, ErrorKind};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::num::NonZeroU8;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModbusConfig {
    pub device: String,
    pub baud_rate: u32,
    pub address: proto::Address,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Pause between consecutive requests.
    #[serde(with = "humantime_serde")]
    pub delay: Duration,
}

impl Default for ModbusConfig {
    fn default() -> Self {
        Self {
            device: default_device_name(),
            baud_rate: proto::FACTORY_DEFAULT_BAUD_RATE,
            address: proto::Address::default(),
            timeout: serial::DEFAULT_TIMEOUT,
            delay: Duration::from_millis(50),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    pub attempts: NonZeroU8,
    #[serde(with = "humantime_serde")]
    pub delay: Duration,
    pub retry_on_busy: bool,
    /// Error kinds to retry, replacing the default set when given.
    pub retriable: Option<BTreeSet<ErrorKind>>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: RetryPolicy::DEFAULT_ATTEMPTS,
            delay: RetryPolicy::DEFAULT_DELAY,
            retry_on_busy: false,
            retriable: None,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        let mut policy = RetryPolicy::new(self.attempts, self.delay);
        if let Some(kinds) = &self.retriable {
            policy = RetryPolicy::DEFAULT_RETRIABLE
                .into_iter()
                .fold(policy, RetryPolicy::without_retriable);
            policy = kinds.iter().copied().fold(policy, RetryPolicy::with_retriable);
        }
        if self.retry_on_busy {
            policy = policy.retry_on_busy();
        }
        policy
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub modbus: ModbusConfig,
    pub retry: RetryConfig,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            modbus: ModbusConfig::default(),
            retry: RetryConfig::default(),
            poll_interval: Duration::from_secs(5),
        }
    }
}

impl Config {
    pub const DEFAULT_CONFIG_FILE: &'static str = "renogymodbus.yaml";

    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Cannot open config file {}", path.display()))?;
        serde_yaml::from_reader(file)
            .with_context(|| format!("Cannot parse config file {}", path.display()))
    }
}

pub fn default_device_name() -> String {
    if cfg!(target_os = "windows") {
        String::from("COM1")
    } else {
        String::from("/dev/ttyUSB0")
    }
}
