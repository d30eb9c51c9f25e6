use log::{debug, error, info};
use serialport::{ClearBuffer, SerialPort};
use std::io::{ErrorKind, Read, Write};
use std::path::Path;
use std::time::Duration;

use super::{LineSettings, PortHandle, SerialSession, SerialTransport, TransportError};
use crate::config::{FlowControlConfig, ParityConfig, StopBitsConfig};

/// Line rate used while opening; the configured one is applied in `configure`.
const OPEN_BAUD_RATE: u32 = 9600;

/// Serial transport backed by the `serialport` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialPortTransport;

impl SerialTransport for SerialPortTransport {
    type Session = SerialPortSession;

    fn identify(&self, port_name: &str) -> Result<PortHandle, TransportError> {
        let listed = serialport::available_ports()
            .map(|ports| ports.iter().any(|p| p.port_name == port_name))
            .unwrap_or(false);

        // Virtual ports (pty, socat) are not always enumerated.
        if listed || Path::new(port_name).exists() {
            Ok(PortHandle::new(port_name))
        } else {
            error!("❌ Serial port {} not found", port_name);
            Err(TransportError::NotFound(port_name.to_string()))
        }
    }

    fn open(&self, handle: &PortHandle, timeout: Duration) -> Result<SerialPortSession, TransportError> {
        info!("🔌 Opening Modbus RTU port: {}", handle.name);

        // Opens exclusively on unix (TIOCEXCL); a second open fails as busy.
        let port = serialport::new(&handle.name, OPEN_BAUD_RATE)
            .timeout(timeout)
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => TransportError::NotFound(handle.name.clone()),
                _ => TransportError::OpenFailed {
                    port: handle.name.clone(),
                    reason: e.to_string(),
                },
            })?;

        Ok(SerialPortSession {
            name: handle.name.clone(),
            port: Some(port),
        })
    }
}

pub struct SerialPortSession {
    name: String,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialPortSession {
    fn port_mut(&mut self) -> Result<&mut Box<dyn SerialPort>, TransportError> {
        let name = &self.name;
        self.port
            .as_mut()
            .ok_or_else(|| TransportError::ReadFailed(format!("port {} is closed", name)))
    }
}

impl SerialSession for SerialPortSession {
    fn configure(&mut self, settings: &LineSettings) -> Result<(), TransportError> {
        info!(
            "⚙️  Configuration: {} baud, {} data bits, {:?} stop bits, {:?} parity, {:?} flow control",
            settings.baud_rate, settings.data_bits, settings.stop_bits, settings.parity, settings.flow_control
        );

        let data_bits = data_bits(settings.data_bits)?;
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| TransportError::ConfigFailed("port is closed".to_string()))?;

        port.set_baud_rate(settings.baud_rate).map_err(config_failed)?;
        port.set_data_bits(data_bits).map_err(config_failed)?;
        port.set_stop_bits(settings.stop_bits.into()).map_err(config_failed)?;
        port.set_parity(settings.parity.into()).map_err(config_failed)?;
        port.set_flow_control(settings.flow_control.into()).map_err(config_failed)?;

        // Drop anything left over from a previous exchange.
        port.clear(ClearBuffer::All).map_err(config_failed)?;
        Ok(())
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| TransportError::WriteFailed("port is closed".to_string()))?;

        port.write_all(bytes)
            .map_err(|e| TransportError::WriteFailed(format!("Write failed: {}", e)))?;
        port.flush()
            .map_err(|e| TransportError::WriteFailed(format!("Flush failed: {}", e)))?;
        Ok(())
    }

    fn read_available(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError> {
        let port = self.port_mut()?;
        port.set_timeout(timeout)
            .map_err(|e| TransportError::ReadFailed(format!("Failed to set timeout: {}", e)))?;

        match port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(TransportError::ReadFailed(format!("Read failed: {}", e))),
        }
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            debug!("Serial port {} closed", self.name);
        }
    }
}

fn config_failed(e: serialport::Error) -> TransportError {
    TransportError::ConfigFailed(e.to_string())
}

fn data_bits(bits: u8) -> Result<serialport::DataBits, TransportError> {
    match bits {
        5 => Ok(serialport::DataBits::Five),
        6 => Ok(serialport::DataBits::Six),
        7 => Ok(serialport::DataBits::Seven),
        8 => Ok(serialport::DataBits::Eight),
        other => Err(TransportError::ConfigFailed(format!("unsupported data bits: {}", other))),
    }
}

impl From<ParityConfig> for serialport::Parity {
    fn from(parity: ParityConfig) -> Self {
        match parity {
            ParityConfig::None => serialport::Parity::None,
            ParityConfig::Even => serialport::Parity::Even,
            ParityConfig::Odd => serialport::Parity::Odd,
        }
    }
}

impl From<StopBitsConfig> for serialport::StopBits {
    fn from(stop_bits: StopBitsConfig) -> Self {
        match stop_bits {
            StopBitsConfig::One => serialport::StopBits::One,
            StopBitsConfig::Two => serialport::StopBits::Two,
        }
    }
}

impl From<FlowControlConfig> for serialport::FlowControl {
    fn from(flow_control: FlowControlConfig) -> Self {
        match flow_control {
            FlowControlConfig::None => serialport::FlowControl::None,
            FlowControlConfig::Software => serialport::FlowControl::Software,
            FlowControlConfig::Hardware => serialport::FlowControl::Hardware,
        }
    }
}
