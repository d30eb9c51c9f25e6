const CRC16_POLY: u16 = 0xA001;

/// Modbus CRC16, returned in wire order: `to_be_bytes()` yields the two
/// bytes as they are transmitted (low byte of the accumulator first).
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;

    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ CRC16_POLY;
            } else {
                crc >>= 1;
            }
        }
    }

    crc.swap_bytes()
}

/// Compares the trailing two bytes of `frame` against the CRC of the rest.
/// Returns `(calculated, received)` on mismatch.
pub fn verify_crc(frame: &[u8]) -> Result<(), (u16, u16)> {
    let data_len = frame.len().saturating_sub(2);
    let calculated = crc16(&frame[..data_len]);
    let received = match frame.get(data_len..) {
        Some([hi, lo]) => u16::from_be_bytes([*hi, *lo]),
        _ => return Err((calculated, 0)),
    };

    if calculated == received {
        Ok(())
    } else {
        Err((calculated, received))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc16_reference_vector() {
        let data = [0x01, 0x03, 0x00, 0x00, 0x00, 0x0A];
        let crc = crc16(&data);
        assert_eq!(crc, 0xC5CD);
        assert_eq!(crc.to_be_bytes(), [0xC5, 0xCD]);
    }

    #[test]
    fn test_crc16_known_frames() {
        // read holding registers, slave 0x11, start 0x006B, qty 3
        assert_eq!(crc16(&[0x11, 0x03, 0x00, 0x6B, 0x00, 0x03]).to_be_bytes(), [0x76, 0x87]);
        // write single coil, slave 0x11, coil 0x00AC ON
        assert_eq!(crc16(&[0x11, 0x05, 0x00, 0xAC, 0xFF, 0x00]).to_be_bytes(), [0x4E, 0x8B]);
    }

    #[test]
    fn test_crc16_empty_input() {
        assert_eq!(crc16(&[]), 0xFFFF);
    }

    #[test]
    fn test_verify_crc() {
        let frame = [0x01, 0x03, 0x00, 0x00, 0x00, 0x0A, 0xC5, 0xCD];
        assert!(verify_crc(&frame).is_ok());

        let bad = [0x01, 0x03, 0x00, 0x00, 0x00, 0x0A, 0xCD, 0xC5];
        assert_eq!(verify_crc(&bad), Err((0xC5CD, 0xCDC5)));
    }
}
