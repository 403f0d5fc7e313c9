use std::io::{ErrorKind, Read, Write};

use serialport::{ClearBuffer, SerialPort, SerialPortType};

use super::{DeviceSignature, PortSettings, Result, SerialDeviceInfo, SerialError};

/// Discovery of USB serial devices
pub struct SerialInterface;

impl SerialInterface {
    /// List every USB serial port currently attached
    pub fn list_usb_ports() -> Result<Vec<SerialDeviceInfo>> {
        let ports = serialport::available_ports()?;
        let mut devices = Vec::new();

        for port in ports {
            if let SerialPortType::UsbPort(usb_info) = port.port_type {
                devices.push(SerialDeviceInfo {
                    port_name: port.port_name.clone(),
                    vid: usb_info.vid,
                    pid: usb_info.pid,
                    serial_number: usb_info.serial_number.clone(),
                    manufacturer: usb_info.manufacturer.clone(),
                    product: usb_info.product.clone(),
                });
            }
        }

        Ok(devices)
    }

    /// Resolve the signature to exactly one attached device
    pub fn locate(signature: &DeviceSignature) -> Result<SerialDeviceInfo> {
        Self::select_device(Self::list_usb_ports()?, signature)
    }

    /// Pick the single candidate matching `signature`.
    ///
    /// Zero matches and more than one match are both configuration errors:
    /// commanding the wrong supply would power-cycle the wrong bench.
    pub fn select_device(
        candidates: Vec<SerialDeviceInfo>,
        signature: &DeviceSignature,
    ) -> Result<SerialDeviceInfo> {
        let mut matches: Vec<SerialDeviceInfo> = candidates
            .into_iter()
            .filter(|device| signature.matches(device))
            .collect();

        match matches.len() {
            0 => Err(SerialError::DeviceNotFound(signature.to_string())),
            1 => Ok(matches.remove(0)),
            _ => Err(SerialError::AmbiguousDevice {
                signature: signature.to_string(),
                ports: matches.into_iter().map(|device| device.port_name).collect(),
            }),
        }
    }
}

/// Raw port operations underneath [`SerialTransport`]
pub trait PortBackend {
    fn port_name(&self) -> &str;
    fn is_open(&self) -> bool;
    fn open(&mut self) -> Result<()>;
    fn close(&mut self) -> Result<()>;
    /// Discard pending bytes in both directions
    fn clear_buffers(&mut self) -> Result<()>;
    fn write_all(&mut self, data: &[u8]) -> Result<()>;
    /// Read until `delimiter` (inclusive) or until the read timeout expires
    fn read_until(&mut self, delimiter: u8) -> Result<Vec<u8>>;
}

/// Backend driving an OS serial port through `serialport`
pub struct NativePort {
    port_name: String,
    settings: PortSettings,
    port: Option<Box<dyn SerialPort>>,
}

impl NativePort {
    pub fn new(port_name: &str, settings: PortSettings) -> Self {
        Self {
            port_name: port_name.to_string(),
            settings,
            port: None,
        }
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn SerialPort>> {
        let port_name = self.port_name.clone();
        self.port.as_mut().ok_or(SerialError::PortOpenFailed {
            port: port_name,
            reason: "port is not open".to_string(),
        })
    }
}

impl PortBackend for NativePort {
    fn port_name(&self) -> &str {
        &self.port_name
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn open(&mut self) -> Result<()> {
        let port = serialport::new(&self.port_name, self.settings.baud_rate)
            .data_bits(self.settings.data_bits)
            .parity(self.settings.parity)
            .stop_bits(self.settings.stop_bits)
            .timeout(self.settings.timeout)
            .open()?;
        self.port = Some(port);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        // Dropping the handle releases the OS descriptor
        self.port = None;
        Ok(())
    }

    fn clear_buffers(&mut self) -> Result<()> {
        self.port_mut()?.clear(ClearBuffer::All)?;
        Ok(())
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let port = self.port_mut()?;
        port.write_all(data)?;
        port.flush()?;
        Ok(())
    }

    fn read_until(&mut self, delimiter: u8) -> Result<Vec<u8>> {
        let port = self.port_mut()?;
        let mut received = Vec::new();
        let mut byte = [0u8; 1];

        loop {
            match port.read(&mut byte) {
                Ok(0) => break,
                Ok(_) => {
                    received.push(byte[0]);
                    if byte[0] == delimiter {
                        break;
                    }
                }
                Err(ref e) if e.kind() == ErrorKind::TimedOut => break,
                Err(e) => return Err(SerialError::IoError(e)),
            }
        }

        Ok(received)
    }
}

/// Owner of the single serial connection to the power supply.
///
/// Sessions borrow the transport mutably, so at most one can be open at a
/// time.
pub struct SerialTransport<B: PortBackend> {
    backend: B,
}

impl<B: PortBackend> SerialTransport<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn port_name(&self) -> &str {
        self.backend.port_name()
    }

    pub fn is_open(&self) -> bool {
        self.backend.is_open()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Bind the port and clear both buffers
    pub fn open(&mut self) -> Result<PortSession<'_, B>> {
        if let Err(e) = self.backend.open() {
            log::error!("Serial port on {} could not be opened: {}", self.port_name(), e);
            return Err(SerialError::PortOpenFailed {
                port: self.port_name().to_string(),
                reason: e.to_string(),
            });
        }

        if let Err(e) = self.backend.clear_buffers() {
            log::error!("Could not clear buffers on {}: {}", self.port_name(), e);
            if let Err(close_err) = self.backend.close() {
                log::warn!("Releasing {} after failed open: {}", self.port_name(), close_err);
            }
            return Err(SerialError::PortOpenFailed {
                port: self.port_name().to_string(),
                reason: e.to_string(),
            });
        }

        log::debug!("Opened serial port {}", self.port_name());
        Ok(PortSession {
            transport: self,
            closed: false,
        })
    }

    fn close_port(&mut self) -> Result<()> {
        let flushed = self.backend.clear_buffers();
        let released = self.backend.close();

        if self.backend.is_open() {
            return Err(SerialError::PortCloseFailed {
                port: self.port_name().to_string(),
                reason: "device still reports open".to_string(),
            });
        }

        if let Err(e) = released.and(flushed) {
            return Err(SerialError::PortCloseFailed {
                port: self.port_name().to_string(),
                reason: e.to_string(),
            });
        }

        log::debug!("Closed serial port {}", self.port_name());
        Ok(())
    }
}

/// An open connection; closes the port when dropped
pub struct PortSession<'a, B: PortBackend> {
    transport: &'a mut SerialTransport<B>,
    closed: bool,
}

impl<'a, B: PortBackend> PortSession<'a, B> {
    /// Write one command line and read the reply up to the next `\r`
    pub fn exchange(&mut self, command: &str) -> Result<String> {
        let backend = &mut self.transport.backend;
        backend.write_all(command.as_bytes())?;
        let reply = backend.read_until(b'\r')?;

        if !reply.is_ascii() {
            return Err(SerialError::ProtocolMismatch {
                command: command.to_string(),
                response: String::from_utf8_lossy(&reply).into_owned(),
            });
        }

        Ok(String::from_utf8_lossy(&reply).into_owned())
    }

    /// Close explicitly, reporting a failed release
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.transport.close_port()
    }
}

impl<'a, B: PortBackend> Drop for PortSession<'a, B> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.transport.close_port() {
            log::warn!("Ignoring close failure during teardown: {}", e);
        }
    }
}
