pub mod interface;
pub mod protocol;

pub use interface::{NativePort, PortBackend, PortSession, SerialInterface, SerialTransport};
pub use protocol::{OutputState, PowerSupplyDriver, VoltageLevel};

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serialport::{DataBits, Parity, StopBits};

// Reference hardware: Manson HCS-3202 behind a Silicon Labs CP2102 bridge
pub const HCS_VID: u16 = 0x10C4;
pub const HCS_PID: u16 = 0xEA60;
pub const HCS_MANUFACTURER: &str = "Silicon Labs";
pub const HCS_DESCRIPTION: &str = "CP2102 USB to UART Bridge Controller";
pub const BAUD_RATE: u32 = 9600;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SerialDeviceInfo {
    pub port_name: String,
    pub vid: u16,
    pub pid: u16,
    pub serial_number: Option<String>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
}

/// USB identity used to pick the power supply out of the attached ports
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceSignature {
    pub vid: u16,
    pub pid: u16,
    pub manufacturer: Option<String>,
    pub description: Option<String>,
}

impl DeviceSignature {
    pub fn new(vid: u16, pid: u16) -> Self {
        Self {
            vid,
            pid,
            manufacturer: None,
            description: None,
        }
    }

    /// Check whether a discovered port carries this signature.
    ///
    /// VID and PID must always match. The manufacturer and description
    /// strings are only compared when both sides provide them, since some
    /// platforms do not report USB string descriptors.
    pub fn matches(&self, info: &SerialDeviceInfo) -> bool {
        if info.vid != self.vid || info.pid != self.pid {
            return false;
        }

        let string_matches = |wanted: &Option<String>, reported: &Option<String>| {
            match (wanted, reported) {
                (Some(wanted), Some(reported)) => {
                    reported.to_lowercase().contains(&wanted.to_lowercase())
                }
                _ => true,
            }
        };

        string_matches(&self.manufacturer, &info.manufacturer)
            && string_matches(&self.description, &info.product)
    }
}

impl Default for DeviceSignature {
    fn default() -> Self {
        Self {
            vid: HCS_VID,
            pid: HCS_PID,
            manufacturer: Some(HCS_MANUFACTURER.to_string()),
            description: Some(HCS_DESCRIPTION.to_string()),
        }
    }
}

impl std::fmt::Display for DeviceSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vid, self.pid)
    }
}

/// Line settings of the power supply's serial interface
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortSettings {
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub timeout: Duration,
}

impl Default for PortSettings {
    fn default() -> Self {
        Self {
            baud_rate: BAUD_RATE,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            timeout: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SerialError {
    #[error("No device with signature {0} found")]
    DeviceNotFound(String),

    #[error("More than one device with signature {signature} found: {ports:?}")]
    AmbiguousDevice { signature: String, ports: Vec<String> },

    #[error("Serial port on {port} could not be opened: {reason}")]
    PortOpenFailed { port: String, reason: String },

    #[error("Serial port on {port} could not be closed: {reason}")]
    PortCloseFailed { port: String, reason: String },

    #[error("Unexpected response to {command:?}: {response:?}")]
    ProtocolMismatch { command: String, response: String },

    #[error("Voltage out of range ({min}-{max}): {value}")]
    OutOfRange { value: f64, min: f64, max: f64 },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialport error: {0}")]
    SerialportError(#[from] serialport::Error),
}

pub type Result<T> = std::result::Result<T, SerialError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn cp2102(port: &str) -> SerialDeviceInfo {
        SerialDeviceInfo {
            port_name: port.to_string(),
            vid: HCS_VID,
            pid: HCS_PID,
            serial_number: Some("0001".to_string()),
            manufacturer: Some("Silicon Labs".to_string()),
            product: Some("CP2102 USB to UART Bridge Controller".to_string()),
        }
    }

    #[test]
    fn test_default_signature_matches_reference_bridge() {
        assert!(DeviceSignature::default().matches(&cp2102("/dev/ttyUSB0")));
    }

    #[test]
    fn test_signature_rejects_other_ids() {
        let mut info = cp2102("/dev/ttyUSB0");
        info.pid = 0xEA70;
        assert!(!DeviceSignature::default().matches(&info));
    }

    #[test]
    fn test_signature_ignores_missing_strings() {
        let mut info = cp2102("COM3");
        info.manufacturer = None;
        info.product = None;
        assert!(DeviceSignature::default().matches(&info));
    }

    #[test]
    fn test_signature_compares_strings_case_insensitively() {
        let mut info = cp2102("/dev/ttyUSB1");
        info.manufacturer = Some("SILICON LABS".to_string());
        assert!(DeviceSignature::default().matches(&info));

        info.manufacturer = Some("FTDI".to_string());
        assert!(!DeviceSignature::default().matches(&info));
    }

    #[test]
    fn test_signature_display() {
        assert_eq!(DeviceSignature::default().to_string(), "10c4:ea60");
    }
}
