pub mod codec;
pub mod crc;
pub mod frame;
pub mod function_code;
pub mod master;
pub mod protocol;

pub use codec::{CodecError, PduCodec, RawPduCodec, StandardCodec};
pub use crc::crc16;
pub use frame::{decode_frame, encode_frame, strip_frame};
pub use function_code::{FunctionCode, PduLayout};
pub use master::ModbusRtuMaster;
pub use protocol::{ExceptionCode, ModbusRequest, ModbusResponse, SlaveId};
