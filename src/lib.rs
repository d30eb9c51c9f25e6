//! Modbus RTU master over a serial line.
//!
//! Each request is one self-contained exchange: the frame is built (slave
//! address, PDU, CRC16), the port is opened and configured, the frame is
//! written, one reply is read within the configured timeout, and the port is
//! closed again before the reply is validated and decoded.

pub mod cli;
pub mod config;
pub mod modbus;
pub mod output;
pub mod transport;
pub mod utils;

// Re-export commonly used types
pub use config::MasterConfig;
pub use modbus::{
    crc16, CodecError, FunctionCode, ModbusRequest, ModbusResponse, ModbusRtuMaster, PduCodec,
    RawPduCodec, SlaveId, StandardCodec,
};
pub use transport::{SerialPortTransport, SerialSession, SerialTransport, TransportError};
pub use utils::error::{ModbusError, ModbusResult};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
