use thiserror::Error;

use crate::modbus::codec::CodecError;
use crate::transport::TransportError;

pub type ModbusResult<T> = Result<T, ModbusError>;

/// Terminal outcome of a failed exchange. Nothing here is retried internally.
#[derive(Error, Debug)]
pub enum ModbusError {
    #[error("Port unavailable: {port}: {reason}")]
    PortUnavailable { port: String, reason: String },

    #[error("Port configuration failed: {0}")]
    PortConfigurationFailed(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read timeout: received {received} of {expected} bytes")]
    ReadTimeout { expected: usize, received: usize },

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Frame too short: {0} bytes")]
    FrameTooShort(usize),

    #[error("CRC checksum mismatch: calculated 0x{calculated:04X}, received 0x{received:04X}")]
    CrcMismatch { calculated: u16, received: u16 },

    #[error("Unexpected slave address: expected {expected}, received {received}")]
    UnexpectedSlaveAddress { expected: u8, received: u8 },

    #[error("PDU decode error: {0}")]
    PduDecodeError(#[from] CodecError),

    #[error("Invalid request: {0}")]
    InvalidRequest(CodecError),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl ModbusError {
    /// True for failures of the serial line itself, as opposed to protocol
    /// or integrity problems with a reply.
    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            ModbusError::PortUnavailable { .. }
                | ModbusError::PortConfigurationFailed(_)
                | ModbusError::WriteFailed(_)
                | ModbusError::ReadTimeout { .. }
                | ModbusError::ReadFailed(_)
        )
    }
}

impl From<TransportError> for ModbusError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::NotFound(port) => ModbusError::PortUnavailable {
                port,
                reason: "no such port".to_string(),
            },
            TransportError::AlreadyOwned(port) => ModbusError::PortUnavailable {
                port,
                reason: "port is owned by another session".to_string(),
            },
            TransportError::OpenFailed { port, reason } => {
                ModbusError::PortUnavailable { port, reason }
            }
            TransportError::ConfigFailed(reason) => ModbusError::PortConfigurationFailed(reason),
            TransportError::WriteFailed(reason) => ModbusError::WriteFailed(reason),
            TransportError::ReadFailed(reason) => ModbusError::ReadFailed(reason),
        }
    }
}

impl From<toml::de::Error> for ModbusError {
    fn from(err: toml::de::Error) -> Self {
        ModbusError::ConfigError(format!("TOML parse error: {}", err))
    }
}

impl From<toml::ser::Error> for ModbusError {
    fn from(err: toml::ser::Error) -> Self {
        ModbusError::ConfigError(format!("TOML serialize error: {}", err))
    }
}
