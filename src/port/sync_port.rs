//! Hardware serial link backed by the `serialport` crate.

use super::error::PortError;
use super::traits::{PortSettings, SerialLink};
use std::io::{Read, Write};

/// A real serial device opened through the OS.
pub struct SystemPort {
    port: Box<dyn serialport::SerialPort>,
    name: String,
}

impl SystemPort {
    /// Open a serial port with the given line parameters.
    ///
    /// # Arguments
    /// * `port_name` - system path ("/dev/ttyUSB0", "COM3")
    /// * `settings` - line parameters and read window
    pub fn open(port_name: &str, settings: &PortSettings) -> Result<Self, PortError> {
        let port = serialport::new(port_name, settings.baud_rate)
            .data_bits(settings.data_bits.into())
            .parity(settings.parity.into())
            .stop_bits(settings.stop_bits.into())
            .flow_control(settings.flow_control.into())
            .timeout(settings.read_timeout)
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => PortError::not_found(port_name),
                serialport::ErrorKind::InvalidInput => PortError::config(e.to_string()),
                _ => PortError::Serial(e),
            })?;

        Ok(Self {
            port,
            name: port_name.to_string(),
        })
    }
}

impl SerialLink for SystemPort {
    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        self.port.read(buffer).map_err(PortError::Io)
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        self.port.write(data).map_err(PortError::Io)
    }

    fn flush(&mut self) -> Result<(), PortError> {
        self.port.flush().map_err(PortError::Io)
    }

    fn try_clone_link(&self) -> Result<Box<dyn SerialLink>, PortError> {
        let clone = self.port.try_clone().map_err(PortError::Serial)?;
        Ok(Box::new(Self {
            port: clone,
            name: self.name.clone(),
        }))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for SystemPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemPort")
            .field("name", &self.name)
            .field("baud_rate", &self.port.baud_rate().ok())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_missing_port_reports_not_found() {
        let settings = PortSettings::default();
        let result = SystemPort::open("/dev/nonexistent_port_12345", &settings);

        assert!(result.is_err());
        if let Err(e) = result {
            match e {
                PortError::NotFound(name) => assert!(name.contains("nonexistent")),
                // Some platforms report a bare I/O error for a missing node.
                PortError::Io(_) | PortError::Serial(_) => {}
                other => panic!("unexpected error: {other:?}"),
            }
        }
    }
}
