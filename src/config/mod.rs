//! Harness configuration
//!
//! Read from a TOML file (`harness.toml` by default). Every field falls back
//! to the values for the reference bench, so a partial or missing file still
//! yields a usable configuration.

use std::fs;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serialport::{DataBits, Parity, StopBits};

use crate::reachability::{self, ReachabilityPolicy, RestartWindow};
use crate::serial::{self, DeviceSignature, PortSettings};

pub const DEFAULT_CONFIG_FILE: &str = "harness.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HarnessConfig {
    pub power_supply: PowerSupplySection,
    pub target: TargetSection,
    pub restart: RestartSection,
}

/// Identity and line settings of the bench supply
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PowerSupplySection {
    pub vendor_id: u16,
    pub product_id: u16,
    pub manufacturer: Option<String>,
    pub description: Option<String>,
    pub baud_rate: u32,
    pub byte_size: u8,
    pub parity: String,
    pub stop_bits: u8,
    pub timeout_secs: f64,
    pub settle_secs: f64,
}

impl Default for PowerSupplySection {
    fn default() -> Self {
        Self {
            vendor_id: serial::HCS_VID,
            product_id: serial::HCS_PID,
            manufacturer: Some(serial::HCS_MANUFACTURER.to_string()),
            description: Some(serial::HCS_DESCRIPTION.to_string()),
            baud_rate: serial::BAUD_RATE,
            byte_size: 8,
            parity: "N".to_string(),
            stop_bits: 1,
            timeout_secs: 1.0,
            settle_secs: 5.0,
        }
    }
}

/// The DUT and how to wait for it to boot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TargetSection {
    pub host: Option<String>,
    pub probe_timeout_secs: f64,
    pub attempts: u32,
    pub delay_secs: f64,
}

impl Default for TargetSection {
    fn default() -> Self {
        Self {
            host: None,
            probe_timeout_secs: reachability::BOOT_PROBE_TIMEOUT.as_secs_f64(),
            attempts: reachability::BOOT_ATTEMPTS,
            delay_secs: reachability::BOOT_DELAY.as_secs_f64(),
        }
    }
}

/// How fast the DUT must drop off the network after a reset command
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RestartSection {
    pub within_secs: f64,
    pub probe_timeout_secs: f64,
    pub attempts: u32,
    pub delay_secs: f64,
}

impl Default for RestartSection {
    fn default() -> Self {
        Self {
            within_secs: reachability::RESTART_WINDOW.as_secs_f64(),
            probe_timeout_secs: reachability::RESTART_PROBE_TIMEOUT.as_secs_f64(),
            attempts: reachability::RESTART_ATTEMPTS,
            delay_secs: reachability::RESTART_DELAY.as_secs_f64(),
        }
    }
}

impl HarnessConfig {
    /// Read configuration from `path`
    pub fn read(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        Ok(config)
    }

    /// Read `path` if given, otherwise `harness.toml` when it exists, otherwise
    /// fall back to defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::read(path),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::read(default_path)
                } else {
                    log::debug!("No {} found, using defaults", DEFAULT_CONFIG_FILE);
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn signature(&self) -> DeviceSignature {
        DeviceSignature {
            vid: self.power_supply.vendor_id,
            pid: self.power_supply.product_id,
            manufacturer: self.power_supply.manufacturer.clone(),
            description: self.power_supply.description.clone(),
        }
    }

    pub fn port_settings(&self) -> Result<PortSettings> {
        let section = &self.power_supply;

        let data_bits = match section.byte_size {
            5 => DataBits::Five,
            6 => DataBits::Six,
            7 => DataBits::Seven,
            8 => DataBits::Eight,
            other => {
                return Err(ConfigError::Invalid(format!("byte_size {} not supported", other)))
            }
        };
        let parity = match section.parity.to_uppercase().as_str() {
            "N" | "NONE" => Parity::None,
            "E" | "EVEN" => Parity::Even,
            "O" | "ODD" => Parity::Odd,
            other => {
                return Err(ConfigError::Invalid(format!("parity {:?} not supported", other)))
            }
        };
        let stop_bits = match section.stop_bits {
            1 => StopBits::One,
            2 => StopBits::Two,
            other => {
                return Err(ConfigError::Invalid(format!("stop_bits {} not supported", other)))
            }
        };
        if section.baud_rate == 0 {
            return Err(ConfigError::Invalid("baud_rate must be positive".to_string()));
        }

        Ok(PortSettings {
            baud_rate: section.baud_rate,
            data_bits,
            parity,
            stop_bits,
            timeout: seconds("power_supply.timeout_secs", section.timeout_secs)?,
        })
    }

    pub fn settle(&self) -> Result<Duration> {
        seconds("power_supply.settle_secs", self.power_supply.settle_secs)
    }

    pub fn target_host(&self) -> Result<IpAddr> {
        let host = self.target.host.as_deref().ok_or(ConfigError::MissingHost)?;
        host.parse().map_err(|_| {
            ConfigError::Invalid(format!("target.host {:?} is not an IP address", host))
        })
    }

    pub fn boot_policy(&self) -> Result<ReachabilityPolicy> {
        let policy = ReachabilityPolicy::new(
            seconds("target.probe_timeout_secs", self.target.probe_timeout_secs)?,
            self.target.attempts,
            seconds("target.delay_secs", self.target.delay_secs)?,
        )?;
        Ok(policy)
    }

    pub fn restart_policy(&self) -> Result<ReachabilityPolicy> {
        let policy = ReachabilityPolicy::new(
            seconds("restart.probe_timeout_secs", self.restart.probe_timeout_secs)?,
            self.restart.attempts,
            seconds("restart.delay_secs", self.restart.delay_secs)?,
        )?;
        Ok(policy)
    }

    pub fn restart_window(&self) -> Result<RestartWindow> {
        Ok(RestartWindow::from_secs_f64(self.restart.within_secs)?)
    }
}

fn seconds(field: &str, value: f64) -> Result<Duration> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::Invalid(format!(
            "{} must be a non-negative number, got {}",
            field, value
        )));
    }
    Duration::try_from_secs_f64(value)
        .map_err(|e| ConfigError::Invalid(format!("{} = {}: {}", field, value, e)))
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("No target host configured")]
    MissingHost,

    #[error("Invalid polling settings: {0}")]
    Policy(#[from] crate::reachability::ReachabilityError),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
