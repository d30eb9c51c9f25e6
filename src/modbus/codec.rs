use thiserror::Error;

use super::function_code::{packed_len, FunctionCode};
use super::protocol::{ExceptionCode, ModbusRequest, ModbusResponse};

const MAX_READ_BITS: u16 = 2000;
const MAX_READ_REGISTERS: u16 = 125;
const MAX_WRITE_BITS: u16 = 1968;
const MAX_WRITE_REGISTERS: u16 = 123;

const COIL_ON: u16 = 0xFF00;
const COIL_OFF: u16 = 0x0000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Empty PDU")]
    EmptyPdu,

    #[error("Unsupported function code 0x{0:02X}")]
    UnsupportedFunction(u8),

    #[error("{function}: quantity {quantity} outside 1..={max}")]
    QuantityOutOfRange { function: FunctionCode, quantity: usize, max: u16 },

    #[error("Address range overflow: start {address}, quantity {quantity}")]
    AddressOverflow { address: u16, quantity: usize },

    #[error("Function code mismatch: expected 0x{expected:02X}, received 0x{received:02X}")]
    FunctionMismatch { expected: u8, received: u8 },

    #[error("Device exception for {function}: {code}")]
    Exception { function: FunctionCode, code: ExceptionCode },

    #[error("Invalid PDU length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Byte count mismatch: declared {declared}, actual {actual}")]
    ByteCountMismatch { declared: usize, actual: usize },

    #[error("Invalid coil value 0x{0:04X}")]
    InvalidCoilValue(u16),

    #[error("Echo mismatch: {0}")]
    EchoMismatch(String),
}

/// Turns logical requests into PDU bytes and PDU bytes back into responses.
pub trait PduCodec {
    type Request;
    type Response;

    fn function_code(&self, request: &Self::Request) -> FunctionCode;

    fn encode(&self, request: &Self::Request) -> Result<Vec<u8>, CodecError>;

    /// `function` is the code of the request that was sent.
    fn decode(&self, function: FunctionCode, pdu: &[u8]) -> Result<Self::Response, CodecError>;

    /// Length of a normal reply PDU when it is known up front.
    fn reply_pdu_len(&self, _request: &Self::Request) -> Option<usize> {
        None
    }
}

/// Codec for the standard data-access function codes.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardCodec;

impl PduCodec for StandardCodec {
    type Request = ModbusRequest;
    type Response = ModbusResponse;

    fn function_code(&self, request: &ModbusRequest) -> FunctionCode {
        request.function_code()
    }

    fn encode(&self, request: &ModbusRequest) -> Result<Vec<u8>, CodecError> {
        let function = request.function_code();
        check_range(request)?;

        let layout = function
            .request_layout()
            .ok_or(CodecError::UnsupportedFunction(function.as_u8()))?;
        let mut pdu = Vec::with_capacity(layout.size(request.item_count()));
        pdu.push(function.as_u8());
        pdu.extend_from_slice(&request.address().to_be_bytes());

        match request {
            ModbusRequest::ReadCoils { quantity, .. }
            | ModbusRequest::ReadDiscreteInputs { quantity, .. }
            | ModbusRequest::ReadHoldingRegisters { quantity, .. }
            | ModbusRequest::ReadInputRegisters { quantity, .. } => {
                pdu.extend_from_slice(&quantity.to_be_bytes());
            }
            ModbusRequest::WriteSingleCoil { value, .. } => {
                let word = if *value { COIL_ON } else { COIL_OFF };
                pdu.extend_from_slice(&word.to_be_bytes());
            }
            ModbusRequest::WriteSingleRegister { value, .. } => {
                pdu.extend_from_slice(&value.to_be_bytes());
            }
            ModbusRequest::WriteMultipleCoils { values, .. } => {
                let packed = pack_bits(values);
                pdu.extend_from_slice(&(values.len() as u16).to_be_bytes());
                pdu.push(packed.len() as u8);
                pdu.extend_from_slice(&packed);
            }
            ModbusRequest::WriteMultipleRegisters { values, .. } => {
                pdu.extend_from_slice(&(values.len() as u16).to_be_bytes());
                pdu.push((values.len() * 2) as u8);
                for value in values {
                    pdu.extend_from_slice(&value.to_be_bytes());
                }
            }
        }

        Ok(pdu)
    }

    fn decode(&self, function: FunctionCode, pdu: &[u8]) -> Result<ModbusResponse, CodecError> {
        let (&code, body) = pdu.split_first().ok_or(CodecError::EmptyPdu)?;
        check_function(function, code, body)?;

        match function {
            FunctionCode::ReadCoils => {
                let data = byte_counted(body)?;
                Ok(ModbusResponse::ReadCoils(unpack_bits(data, data.len() * 8)))
            }
            FunctionCode::ReadDiscreteInputs => {
                let data = byte_counted(body)?;
                Ok(ModbusResponse::ReadDiscreteInputs(unpack_bits(data, data.len() * 8)))
            }
            FunctionCode::ReadHoldingRegisters => {
                Ok(ModbusResponse::ReadHoldingRegisters(registers(byte_counted(body)?)?))
            }
            FunctionCode::ReadInputRegisters => {
                Ok(ModbusResponse::ReadInputRegisters(registers(byte_counted(body)?)?))
            }
            FunctionCode::WriteSingleCoil => {
                let (address, word) = address_and_word(body)?;
                let value = match word {
                    COIL_ON => true,
                    COIL_OFF => false,
                    other => return Err(CodecError::InvalidCoilValue(other)),
                };
                Ok(ModbusResponse::WriteSingleCoil { address, value })
            }
            FunctionCode::WriteSingleRegister => {
                let (address, value) = address_and_word(body)?;
                Ok(ModbusResponse::WriteSingleRegister { address, value })
            }
            FunctionCode::WriteMultipleCoils => {
                let (address, quantity) = address_and_word(body)?;
                Ok(ModbusResponse::WriteMultipleCoils { address, quantity })
            }
            FunctionCode::WriteMultipleRegisters => {
                let (address, quantity) = address_and_word(body)?;
                Ok(ModbusResponse::WriteMultipleRegisters { address, quantity })
            }
            FunctionCode::Custom(code) => Err(CodecError::UnsupportedFunction(code)),
        }
    }

    fn reply_pdu_len(&self, request: &ModbusRequest) -> Option<usize> {
        request
            .function_code()
            .response_layout()
            .map(|layout| layout.size(request.item_count()))
    }
}

/// Pass-through codec: requests and responses are raw PDU bytes.
///
/// Exception replies are handed back as-is, so callers see the exception
/// PDU instead of a `CodecError::Exception`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawPduCodec;

impl PduCodec for RawPduCodec {
    type Request = Vec<u8>;
    type Response = Vec<u8>;

    fn function_code(&self, request: &Vec<u8>) -> FunctionCode {
        FunctionCode::from_u8(request.first().copied().unwrap_or_default())
    }

    fn encode(&self, request: &Vec<u8>) -> Result<Vec<u8>, CodecError> {
        if request.is_empty() {
            return Err(CodecError::EmptyPdu);
        }
        Ok(request.clone())
    }

    fn decode(&self, _function: FunctionCode, pdu: &[u8]) -> Result<Vec<u8>, CodecError> {
        if pdu.is_empty() {
            return Err(CodecError::EmptyPdu);
        }
        Ok(pdu.to_vec())
    }
}

fn check_range(request: &ModbusRequest) -> Result<(), CodecError> {
    let function = request.function_code();
    let max = match request {
        ModbusRequest::ReadCoils { .. } | ModbusRequest::ReadDiscreteInputs { .. } => MAX_READ_BITS,
        ModbusRequest::ReadHoldingRegisters { .. } | ModbusRequest::ReadInputRegisters { .. } => {
            MAX_READ_REGISTERS
        }
        ModbusRequest::WriteMultipleCoils { .. } => MAX_WRITE_BITS,
        ModbusRequest::WriteMultipleRegisters { .. } => MAX_WRITE_REGISTERS,
        ModbusRequest::WriteSingleCoil { .. } | ModbusRequest::WriteSingleRegister { .. } => {
            return Ok(())
        }
    };

    let quantity = request.item_count();
    if quantity == 0 || quantity > max as usize {
        return Err(CodecError::QuantityOutOfRange { function, quantity, max });
    }

    let address = request.address();
    if address as usize + quantity > u16::MAX as usize + 1 {
        return Err(CodecError::AddressOverflow { address, quantity });
    }

    Ok(())
}

fn check_function(function: FunctionCode, code: u8, body: &[u8]) -> Result<(), CodecError> {
    if FunctionCode::is_exception(code) {
        let original = code & !FunctionCode::EXCEPTION_BIT;
        if original != function.as_u8() {
            return Err(CodecError::FunctionMismatch { expected: function.as_u8(), received: code });
        }
        return match body {
            [exception] => Err(CodecError::Exception {
                function,
                code: ExceptionCode::from_u8(*exception),
            }),
            _ => Err(CodecError::InvalidLength { expected: 2, actual: body.len() + 1 }),
        };
    }

    if code != function.as_u8() {
        return Err(CodecError::FunctionMismatch { expected: function.as_u8(), received: code });
    }
    Ok(())
}

fn byte_counted(body: &[u8]) -> Result<&[u8], CodecError> {
    let (&count, data) = body
        .split_first()
        .ok_or(CodecError::InvalidLength { expected: 2, actual: 1 })?;
    if data.len() != count as usize {
        return Err(CodecError::ByteCountMismatch { declared: count as usize, actual: data.len() });
    }
    Ok(data)
}

fn registers(data: &[u8]) -> Result<Vec<u16>, CodecError> {
    if data.len() % 2 != 0 {
        return Err(CodecError::InvalidLength { expected: data.len() + 1, actual: data.len() });
    }
    Ok(data
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect())
}

fn address_and_word(body: &[u8]) -> Result<(u16, u16), CodecError> {
    match body {
        [a_hi, a_lo, w_hi, w_lo] => Ok((
            u16::from_be_bytes([*a_hi, *a_lo]),
            u16::from_be_bytes([*w_hi, *w_lo]),
        )),
        _ => Err(CodecError::InvalidLength { expected: 5, actual: body.len() + 1 }),
    }
}

/// Packs bits LSB-first, eight per byte.
pub fn pack_bits(values: &[bool]) -> Vec<u8> {
    let mut packed = vec![0u8; packed_len(values.len(), 1)];
    for (i, _) in values.iter().enumerate().filter(|(_, on)| **on) {
        packed[i / 8] |= 1 << (i % 8);
    }
    packed
}

pub fn unpack_bits(data: &[u8], count: usize) -> Vec<bool> {
    (0..count.min(data.len() * 8))
        .map(|i| data[i / 8] & (1 << (i % 8)) != 0)
        .collect()
}
