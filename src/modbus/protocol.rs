use serde::{Deserialize, Serialize};
use std::fmt;

use super::function_code::FunctionCode;

/// Target device address on the bus.
pub type SlaveId = u8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModbusRequest {
    ReadCoils { address: u16, quantity: u16 },
    ReadDiscreteInputs { address: u16, quantity: u16 },
    ReadHoldingRegisters { address: u16, quantity: u16 },
    ReadInputRegisters { address: u16, quantity: u16 },
    WriteSingleCoil { address: u16, value: bool },
    WriteSingleRegister { address: u16, value: u16 },
    WriteMultipleCoils { address: u16, values: Vec<bool> },
    WriteMultipleRegisters { address: u16, values: Vec<u16> },
}

impl ModbusRequest {
    pub fn function_code(&self) -> FunctionCode {
        match self {
            ModbusRequest::ReadCoils { .. } => FunctionCode::ReadCoils,
            ModbusRequest::ReadDiscreteInputs { .. } => FunctionCode::ReadDiscreteInputs,
            ModbusRequest::ReadHoldingRegisters { .. } => FunctionCode::ReadHoldingRegisters,
            ModbusRequest::ReadInputRegisters { .. } => FunctionCode::ReadInputRegisters,
            ModbusRequest::WriteSingleCoil { .. } => FunctionCode::WriteSingleCoil,
            ModbusRequest::WriteSingleRegister { .. } => FunctionCode::WriteSingleRegister,
            ModbusRequest::WriteMultipleCoils { .. } => FunctionCode::WriteMultipleCoils,
            ModbusRequest::WriteMultipleRegisters { .. } => FunctionCode::WriteMultipleRegisters,
        }
    }

    pub fn address(&self) -> u16 {
        match self {
            ModbusRequest::ReadCoils { address, .. }
            | ModbusRequest::ReadDiscreteInputs { address, .. }
            | ModbusRequest::ReadHoldingRegisters { address, .. }
            | ModbusRequest::ReadInputRegisters { address, .. }
            | ModbusRequest::WriteSingleCoil { address, .. }
            | ModbusRequest::WriteSingleRegister { address, .. }
            | ModbusRequest::WriteMultipleCoils { address, .. }
            | ModbusRequest::WriteMultipleRegisters { address, .. } => *address,
        }
    }

    /// Number of coils or registers the request addresses.
    pub fn item_count(&self) -> usize {
        match self {
            ModbusRequest::ReadCoils { quantity, .. }
            | ModbusRequest::ReadDiscreteInputs { quantity, .. }
            | ModbusRequest::ReadHoldingRegisters { quantity, .. }
            | ModbusRequest::ReadInputRegisters { quantity, .. } => *quantity as usize,
            ModbusRequest::WriteSingleCoil { .. } | ModbusRequest::WriteSingleRegister { .. } => 1,
            ModbusRequest::WriteMultipleCoils { values, .. } => values.len(),
            ModbusRequest::WriteMultipleRegisters { values, .. } => values.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModbusResponse {
    /// Every bit of the returned bytes, LSB first; the device pads to a
    /// whole byte so this may be longer than the requested quantity.
    ReadCoils(Vec<bool>),
    ReadDiscreteInputs(Vec<bool>),
    ReadHoldingRegisters(Vec<u16>),
    ReadInputRegisters(Vec<u16>),
    WriteSingleCoil { address: u16, value: bool },
    WriteSingleRegister { address: u16, value: u16 },
    WriteMultipleCoils { address: u16, quantity: u16 },
    WriteMultipleRegisters { address: u16, quantity: u16 },
}

impl ModbusResponse {
    pub fn function_code(&self) -> FunctionCode {
        match self {
            ModbusResponse::ReadCoils(_) => FunctionCode::ReadCoils,
            ModbusResponse::ReadDiscreteInputs(_) => FunctionCode::ReadDiscreteInputs,
            ModbusResponse::ReadHoldingRegisters(_) => FunctionCode::ReadHoldingRegisters,
            ModbusResponse::ReadInputRegisters(_) => FunctionCode::ReadInputRegisters,
            ModbusResponse::WriteSingleCoil { .. } => FunctionCode::WriteSingleCoil,
            ModbusResponse::WriteSingleRegister { .. } => FunctionCode::WriteSingleRegister,
            ModbusResponse::WriteMultipleCoils { .. } => FunctionCode::WriteMultipleCoils,
            ModbusResponse::WriteMultipleRegisters { .. } => FunctionCode::WriteMultipleRegisters,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExceptionCode {
    IllegalFunction,
    IllegalDataAddress,
    IllegalDataValue,
    ServerDeviceFailure,
    Acknowledge,
    ServerDeviceBusy,
    MemoryParityError,
    GatewayPathUnavailable,
    GatewayTargetFailedToRespond,
    Unknown(u8),
}

impl ExceptionCode {
    pub fn from_u8(code: u8) -> Self {
        match code {
            0x01 => ExceptionCode::IllegalFunction,
            0x02 => ExceptionCode::IllegalDataAddress,
            0x03 => ExceptionCode::IllegalDataValue,
            0x04 => ExceptionCode::ServerDeviceFailure,
            0x05 => ExceptionCode::Acknowledge,
            0x06 => ExceptionCode::ServerDeviceBusy,
            0x08 => ExceptionCode::MemoryParityError,
            0x0A => ExceptionCode::GatewayPathUnavailable,
            0x0B => ExceptionCode::GatewayTargetFailedToRespond,
            other => ExceptionCode::Unknown(other),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            ExceptionCode::IllegalFunction => 0x01,
            ExceptionCode::IllegalDataAddress => 0x02,
            ExceptionCode::IllegalDataValue => 0x03,
            ExceptionCode::ServerDeviceFailure => 0x04,
            ExceptionCode::Acknowledge => 0x05,
            ExceptionCode::ServerDeviceBusy => 0x06,
            ExceptionCode::MemoryParityError => 0x08,
            ExceptionCode::GatewayPathUnavailable => 0x0A,
            ExceptionCode::GatewayTargetFailedToRespond => 0x0B,
            ExceptionCode::Unknown(code) => code,
        }
    }
}

impl fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ExceptionCode::IllegalFunction => "illegal function",
            ExceptionCode::IllegalDataAddress => "illegal data address",
            ExceptionCode::IllegalDataValue => "illegal data value",
            ExceptionCode::ServerDeviceFailure => "server device failure",
            ExceptionCode::Acknowledge => "acknowledge",
            ExceptionCode::ServerDeviceBusy => "server device busy",
            ExceptionCode::MemoryParityError => "memory parity error",
            ExceptionCode::GatewayPathUnavailable => "gateway path unavailable",
            ExceptionCode::GatewayTargetFailedToRespond => "gateway target failed to respond",
            ExceptionCode::Unknown(_) => "unknown exception",
        };
        write!(f, "{} (0x{:02X})", text, self.as_u8())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_accessors() {
        let req = ModbusRequest::WriteMultipleCoils { address: 5, values: vec![true; 10] };
        assert_eq!(req.function_code(), FunctionCode::WriteMultipleCoils);
        assert_eq!(req.address(), 5);
        assert_eq!(req.item_count(), 10);

        let req = ModbusRequest::WriteSingleRegister { address: 100, value: 0x1234 };
        assert_eq!(req.item_count(), 1);
    }

    #[test]
    fn test_exception_code_display() {
        assert_eq!(ExceptionCode::from_u8(0x02), ExceptionCode::IllegalDataAddress);
        assert_eq!(ExceptionCode::from_u8(0x07), ExceptionCode::Unknown(0x07));
        assert_eq!(
            ExceptionCode::IllegalDataAddress.to_string(),
            "illegal data address (0x02)"
        );
    }
}
