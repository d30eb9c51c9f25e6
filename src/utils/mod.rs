pub mod error;

pub use error::{ModbusError, ModbusResult};
