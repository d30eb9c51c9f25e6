use serde::{Deserialize, Serialize};

/// Shape of a PDU for a given function code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PduLayout {
    /// Always exactly this many bytes, function code included.
    Fixed(usize),
    /// `header` bytes followed by `item_bits` per item packed into whole bytes.
    Packed { header: usize, item_bits: usize },
}

impl PduLayout {
    pub fn size(&self, item_count: usize) -> usize {
        match *self {
            PduLayout::Fixed(len) => len,
            PduLayout::Packed { header, item_bits } => {
                header + packed_len(item_count, item_bits)
            }
        }
    }
}

/// Number of bytes needed for `item_count` items of `item_bits` each.
pub fn packed_len(item_count: usize, item_bits: usize) -> usize {
    (item_count * item_bits + 7) / 8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FunctionCode {
    ReadCoils,
    ReadDiscreteInputs,
    ReadHoldingRegisters,
    ReadInputRegisters,
    WriteSingleCoil,
    WriteSingleRegister,
    WriteMultipleCoils,
    WriteMultipleRegisters,
    Custom(u8),
}

impl FunctionCode {
    pub const EXCEPTION_BIT: u8 = 0x80;

    pub fn as_u8(self) -> u8 {
        match self {
            FunctionCode::ReadCoils => 0x01,
            FunctionCode::ReadDiscreteInputs => 0x02,
            FunctionCode::ReadHoldingRegisters => 0x03,
            FunctionCode::ReadInputRegisters => 0x04,
            FunctionCode::WriteSingleCoil => 0x05,
            FunctionCode::WriteSingleRegister => 0x06,
            FunctionCode::WriteMultipleCoils => 0x0F,
            FunctionCode::WriteMultipleRegisters => 0x10,
            FunctionCode::Custom(code) => code,
        }
    }

    pub fn from_u8(code: u8) -> Self {
        match code {
            0x01 => FunctionCode::ReadCoils,
            0x02 => FunctionCode::ReadDiscreteInputs,
            0x03 => FunctionCode::ReadHoldingRegisters,
            0x04 => FunctionCode::ReadInputRegisters,
            0x05 => FunctionCode::WriteSingleCoil,
            0x06 => FunctionCode::WriteSingleRegister,
            0x0F => FunctionCode::WriteMultipleCoils,
            0x10 => FunctionCode::WriteMultipleRegisters,
            other => FunctionCode::Custom(other),
        }
    }

    pub fn is_exception(code: u8) -> bool {
        code & Self::EXCEPTION_BIT != 0
    }

    /// Request PDU layout; `None` for custom codes.
    pub fn request_layout(self) -> Option<PduLayout> {
        match self {
            FunctionCode::ReadCoils
            | FunctionCode::ReadDiscreteInputs
            | FunctionCode::ReadHoldingRegisters
            | FunctionCode::ReadInputRegisters
            | FunctionCode::WriteSingleCoil
            | FunctionCode::WriteSingleRegister => Some(PduLayout::Fixed(5)),
            // function + start + quantity + byte count, then the values
            FunctionCode::WriteMultipleCoils => Some(PduLayout::Packed { header: 6, item_bits: 1 }),
            FunctionCode::WriteMultipleRegisters => {
                Some(PduLayout::Packed { header: 6, item_bits: 16 })
            }
            FunctionCode::Custom(_) => None,
        }
    }

    /// Normal (non-exception) response PDU layout; `None` for custom codes.
    pub fn response_layout(self) -> Option<PduLayout> {
        match self {
            FunctionCode::ReadCoils | FunctionCode::ReadDiscreteInputs => {
                Some(PduLayout::Packed { header: 2, item_bits: 1 })
            }
            FunctionCode::ReadHoldingRegisters | FunctionCode::ReadInputRegisters => {
                Some(PduLayout::Packed { header: 2, item_bits: 16 })
            }
            FunctionCode::WriteSingleCoil
            | FunctionCode::WriteSingleRegister
            | FunctionCode::WriteMultipleCoils
            | FunctionCode::WriteMultipleRegisters => Some(PduLayout::Fixed(5)),
            FunctionCode::Custom(_) => None,
        }
    }
}

impl std::fmt::Display for FunctionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} (0x{:02X})", self, self.as_u8())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_mapping() {
        for code in [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x0F, 0x10, 0x41] {
            assert_eq!(FunctionCode::from_u8(code).as_u8(), code);
        }
        assert_eq!(FunctionCode::from_u8(0x0F), FunctionCode::WriteMultipleCoils);
        assert_eq!(FunctionCode::from_u8(0x41), FunctionCode::Custom(0x41));
    }

    #[test]
    fn test_exception_bit() {
        assert!(FunctionCode::is_exception(0x83));
        assert!(!FunctionCode::is_exception(0x03));
    }

    #[test]
    fn test_packed_layouts() {
        let coils = FunctionCode::WriteMultipleCoils.request_layout().unwrap();
        assert_eq!(coils.size(17), 6 + 3);
        assert_eq!(coils.size(16), 6 + 2);

        let regs = FunctionCode::WriteMultipleRegisters.request_layout().unwrap();
        assert_eq!(regs.size(3), 6 + 6);

        let read = FunctionCode::ReadHoldingRegisters.response_layout().unwrap();
        assert_eq!(read.size(10), 2 + 20);
        assert_eq!(FunctionCode::ReadCoils.request_layout(), Some(PduLayout::Fixed(5)));
        assert_eq!(FunctionCode::Custom(0x41).response_layout(), None);
    }
}
