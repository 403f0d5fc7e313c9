use std::time::Duration;

use crate::reachability::{Clock, SystemClock};

use super::interface::{NativePort, PortBackend, SerialInterface, SerialTransport};
use super::{DeviceSignature, PortSettings, Result, SerialDeviceInfo, SerialError};

pub const VOLTAGE_MIN: f64 = 1.0;
pub const VOLTAGE_MAX: f64 = 36.0;
pub const DEFAULT_SETTLE: Duration = Duration::from_secs(5);

const RESPONSE_OK: &str = "OK\r";

/// Output voltage accepted by the supply, in volts
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct VoltageLevel(f64);

impl VoltageLevel {
    pub fn new(volts: f64) -> Result<Self> {
        if !volts.is_finite() || volts < VOLTAGE_MIN || volts > VOLTAGE_MAX {
            return Err(SerialError::OutOfRange {
                value: volts,
                min: VOLTAGE_MIN,
                max: VOLTAGE_MAX,
            });
        }
        Ok(Self(volts))
    }

    pub fn volts(&self) -> f64 {
        self.0
    }

    /// Value field of the `VOLT` command: tenths of a volt, at least two digits
    pub fn command_value(&self) -> String {
        format!("{:02}", (self.0 * 10.0).round() as u32)
    }
}

/// Output switch position of the supply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputState {
    On,
    Off,
}

impl OutputState {
    /// Code sent with `SOUT`. The supply uses 0 for on and 1 for off.
    pub fn command_code(&self) -> u8 {
        match self {
            OutputState::On => 0,
            OutputState::Off => 1,
        }
    }
}

impl From<bool> for OutputState {
    fn from(enable: bool) -> Self {
        if enable {
            OutputState::On
        } else {
            OutputState::Off
        }
    }
}

pub fn output_command(state: OutputState) -> String {
    format!("SOUT{}\r", state.command_code())
}

pub fn voltage_command(level: VoltageLevel) -> String {
    format!("VOLT{}\r", level.command_value())
}

/// Parse a `GETD` reply; the first four characters carry volts × 100
pub fn parse_display_voltage(response: &str) -> Option<f64> {
    let digits = response.get(0..4)?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hundredths: u32 = digits.parse().ok()?;
    Some(hundredths as f64 / 100.0)
}

/// Driver for the HCS remote programming interface.
///
/// Every command opens the port, performs one exchange and closes it again
/// before returning, whatever the outcome.
pub struct PowerSupplyDriver<B: PortBackend = NativePort> {
    transport: SerialTransport<B>,
}

impl PowerSupplyDriver<NativePort> {
    /// Locate the supply by signature and prepare a driver for it
    pub fn discover(signature: &DeviceSignature, settings: PortSettings) -> Result<Self> {
        let device = SerialInterface::locate(signature)?;
        log::info!(
            "Found power supply {} on {}",
            signature,
            device.port_name
        );
        Ok(Self::for_device(&device, settings))
    }

    pub fn for_device(device: &SerialDeviceInfo, settings: PortSettings) -> Self {
        Self::new(NativePort::new(&device.port_name, settings))
    }
}

impl<B: PortBackend> PowerSupplyDriver<B> {
    pub fn new(backend: B) -> Self {
        Self {
            transport: SerialTransport::new(backend),
        }
    }

    pub fn port_name(&self) -> &str {
        self.transport.port_name()
    }

    pub fn transport(&self) -> &SerialTransport<B> {
        &self.transport
    }

    /// Switch the output on (`true`) or off (`false`)
    pub fn set_output_control(&mut self, enable: bool) -> Result<()> {
        self.set_output(OutputState::from(enable))
    }

    pub fn set_output(&mut self, state: OutputState) -> Result<()> {
        let command = output_command(state);
        let response = self.transact(&command)?;
        expect_ok(&command, response)
    }

    pub fn set_voltage(&mut self, volts: f64) -> Result<()> {
        let level = VoltageLevel::new(volts)?;
        self.set_voltage_level(level)
    }

    pub fn set_voltage_level(&mut self, level: VoltageLevel) -> Result<()> {
        let command = voltage_command(level);
        let response = self.transact(&command)?;
        expect_ok(&command, response)
    }

    /// Read the voltage currently shown on the supply's display
    pub fn get_voltage(&mut self) -> Result<f64> {
        let command = "GETD\r";
        let response = self.transact(command)?;
        parse_display_voltage(&response).ok_or(SerialError::ProtocolMismatch {
            command: command.to_string(),
            response,
        })
    }

    /// Switch the output off, wait `settle`, switch it back on.
    ///
    /// Stops at the first failing step.
    pub fn power_cycle(&mut self, settle: Duration) -> Result<()> {
        self.power_cycle_with(settle, &SystemClock::new())
    }

    /// [`power_cycle`](Self::power_cycle) with the settle delay taken on `clock`
    pub fn power_cycle_with<C: Clock>(&mut self, settle: Duration, clock: &C) -> Result<()> {
        log::debug!("Turning off power supply");
        if let Err(e) = self.set_output_control(false) {
            log::error!("Error while turning off power supply: {}", e);
            return Err(e);
        }

        log::debug!("Waiting {:?} before restoring power", settle);
        clock.sleep(settle);

        log::debug!("Turning on power supply");
        if let Err(e) = self.set_output_control(true) {
            log::error!("Error while turning on power supply: {}", e);
            return Err(e);
        }

        log::info!("Power cycle on {} complete", self.port_name());
        Ok(())
    }

    /// Run one command inside an open/close bracket.
    ///
    /// A close failure is reported unless the exchange already failed, in
    /// which case the exchange error wins and the close failure is logged.
    fn transact(&mut self, command: &str) -> Result<String> {
        let mut session = self.transport.open()?;
        let response = session.exchange(command);
        let closed = session.close();

        match (response, closed) {
            (Ok(response), Ok(())) => Ok(response),
            (Ok(_), Err(close_err)) => Err(close_err),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(close_err)) => {
                log::warn!("Close failed after {:?} errored: {}", command, close_err);
                Err(e)
            }
        }
    }
}

fn expect_ok(command: &str, response: String) -> Result<()> {
    if response == RESPONSE_OK {
        Ok(())
    } else {
        Err(SerialError::ProtocolMismatch {
            command: command.to_string(),
            response,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_polarity_is_inverted() {
        assert_eq!(output_command(OutputState::On), "SOUT0\r");
        assert_eq!(output_command(OutputState::Off), "SOUT1\r");
        assert_eq!(OutputState::from(true), OutputState::On);
    }

    #[test]
    fn test_voltage_bounds() {
        assert!(VoltageLevel::new(1.0).is_ok());
        assert!(VoltageLevel::new(36.0).is_ok());
        assert!(matches!(VoltageLevel::new(0.99), Err(SerialError::OutOfRange { .. })));
        assert!(matches!(VoltageLevel::new(36.01), Err(SerialError::OutOfRange { .. })));
        assert!(VoltageLevel::new(f64::NAN).is_err());
    }

    #[test]
    fn test_voltage_encoding() {
        let cases = [(1.0, "10"), (3.6, "36"), (12.0, "120"), (24.56, "246"), (36.0, "360")];
        for (volts, expected) in cases {
            let level = VoltageLevel::new(volts).unwrap();
            assert_eq!(level.command_value(), expected, "encoding {}", volts);
            assert_eq!(
                level.command_value().parse::<u32>().unwrap(),
                (volts * 10.0).round() as u32
            );
        }
        assert_eq!(voltage_command(VoltageLevel::new(5.0).unwrap()), "VOLT50\r");
    }

    #[test]
    fn test_parse_display_voltage() {
        assert_eq!(parse_display_voltage("0360\r"), Some(3.60));
        assert_eq!(parse_display_voltage("120001000\r"), Some(12.0));
        assert_eq!(parse_display_voltage("OK\r"), None);
        assert_eq!(parse_display_voltage("12a4\r"), None);
        assert_eq!(parse_display_voltage(""), None);
    }
}
