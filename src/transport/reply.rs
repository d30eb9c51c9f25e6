use log::debug;
use std::time::{Duration, Instant};

use super::SerialSession;
use crate::modbus::frame::{frame_len, MAX_FRAME_LEN, MIN_FRAME_LEN};
use crate::modbus::function_code::FunctionCode;
use crate::utils::error::{ModbusError, ModbusResult};

/// Exception reply: address, function | 0x80, exception code, CRC.
const EXCEPTION_FRAME_LEN: usize = frame_len(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyLength {
    /// Total frame length known from the request.
    Exact(usize),
    /// Unknown length; the frame ends at the first inter-frame silence.
    UntilSilence,
}

impl ReplyLength {
    pub fn for_pdu(pdu_len: Option<usize>) -> Self {
        match pdu_len {
            Some(len) => ReplyLength::Exact(frame_len(len)),
            None => ReplyLength::UntilSilence,
        }
    }
}

/// Reads one reply frame, bounded by `timeout` overall.
///
/// An exception reply is recognised from its second byte and cuts the
/// expected length short so the caller does not wait for a normal frame.
pub fn read_reply<S: SerialSession + ?Sized>(
    session: &mut S,
    length: ReplyLength,
    timeout: Duration,
    silence: Duration,
) -> ModbusResult<Vec<u8>> {
    let deadline = Instant::now() + timeout;
    let mut expected = match length {
        ReplyLength::Exact(len) => len.min(MAX_FRAME_LEN),
        ReplyLength::UntilSilence => MAX_FRAME_LEN,
    };
    let mut buf = vec![0u8; MAX_FRAME_LEN];
    let mut received = 0;
    let mut exception_seen = false;

    while received < expected {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            let expected = match length {
                ReplyLength::Exact(_) => expected,
                // never report fewer expected bytes than already arrived
                ReplyLength::UntilSilence => MIN_FRAME_LEN.max(received + 1),
            };
            return Err(ModbusError::ReadTimeout { expected, received });
        }

        let until_silence = length == ReplyLength::UntilSilence && received > 0;
        let wait = if until_silence { silence.min(remaining) } else { remaining };

        let n = session
            .read_available(&mut buf[received..expected], wait)
            .map_err(ModbusError::from)?;
        if n == 0 {
            if until_silence {
                break;
            }
            continue;
        }
        received += n;

        if !exception_seen && received >= 2 && FunctionCode::is_exception(buf[1]) {
            exception_seen = true;
            expected = expected.min(EXCEPTION_FRAME_LEN);
            debug!("Exception reply detected (function 0x{:02X})", buf[1]);
        }
    }

    buf.truncate(received.min(expected));
    Ok(buf)
}
