//! RTU framing: `[slave][pdu...][crc][crc]`.

use log::{debug, warn};

use super::codec::PduCodec;
use super::crc::{crc16, verify_crc};
use super::function_code::FunctionCode;
use super::protocol::SlaveId;
use crate::utils::error::{ModbusError, ModbusResult};

pub const ADDRESS_LEN: usize = 1;
pub const CRC_LEN: usize = 2;
/// Address + at least one PDU byte + CRC.
pub const MIN_FRAME_LEN: usize = ADDRESS_LEN + 1 + CRC_LEN;
pub const MAX_FRAME_LEN: usize = 256;

/// Frame length for a PDU of `pdu_len` bytes.
pub const fn frame_len(pdu_len: usize) -> usize {
    ADDRESS_LEN + pdu_len + CRC_LEN
}

/// Builds a ready-to-transmit frame. Codec rejections surface as
/// `InvalidRequest` before anything is written.
pub fn encode_frame<C: PduCodec>(
    codec: &C,
    slave_id: SlaveId,
    request: &C::Request,
) -> ModbusResult<Vec<u8>> {
    let pdu = codec.encode(request).map_err(ModbusError::InvalidRequest)?;

    let mut frame = Vec::with_capacity(frame_len(pdu.len()));
    frame.push(slave_id);
    frame.extend_from_slice(&pdu);

    let crc = crc16(&frame);
    frame.extend_from_slice(&crc.to_be_bytes());

    debug!("📦 Encoded frame for slave {}: {}", slave_id, hex::encode_upper(&frame));
    Ok(frame)
}

/// Validates length, CRC and (optionally) the slave address, returning the
/// PDU slice between the address and the CRC.
pub fn strip_frame(expected_slave: SlaveId, raw: &[u8], verify_address: bool) -> ModbusResult<&[u8]> {
    if raw.len() < MIN_FRAME_LEN {
        return Err(ModbusError::FrameTooShort(raw.len()));
    }

    if let Err((calculated, received)) = verify_crc(raw) {
        warn!("❌ CRC mismatch on frame {}", hex::encode_upper(raw));
        return Err(ModbusError::CrcMismatch { calculated, received });
    }

    let received_slave = raw[0];
    if received_slave != expected_slave {
        if verify_address {
            return Err(ModbusError::UnexpectedSlaveAddress {
                expected: expected_slave,
                received: received_slave,
            });
        }
        debug!("Reply from slave {} accepted for request to {}", received_slave, expected_slave);
    }

    Ok(&raw[ADDRESS_LEN..raw.len() - CRC_LEN])
}

/// Full receive path: frame validation followed by PDU decoding.
pub fn decode_frame<C: PduCodec>(
    codec: &C,
    expected_slave: SlaveId,
    function: FunctionCode,
    raw: &[u8],
    verify_address: bool,
) -> ModbusResult<C::Response> {
    let pdu = strip_frame(expected_slave, raw, verify_address)?;
    Ok(codec.decode(function, pdu)?)
}
