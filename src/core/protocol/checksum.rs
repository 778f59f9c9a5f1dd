//! CRC-16/Modbus checksum
//!
//! Polynomial 0x8005 (reflected 0xA001), Init 0xFFFF, RefIn/RefOut true, XorOut 0x0000.
//! Table driven: one lookup and one shift per input byte.

/// Reflected Modbus polynomial
pub const POLYNOMIAL: u16 = 0xA001;

/// Initial accumulator value
pub const INITIAL: u16 = 0xFFFF;

/// Size of the checksum field on the wire
pub const CHECKSUM_LEN: usize = 2;

const fn build_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u16;
        let mut bit = 0;
        while bit < 8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ POLYNOMIAL;
            } else {
                crc >>= 1;
            }
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Pre-computed lookup table, evaluated at compile time
static TABLE: [u16; 256] = build_table();

/// Compute the CRC-16/Modbus checksum of `data`
pub fn checksum(data: &[u8]) -> u16 {
    data.iter().fold(INITIAL, |crc, &byte| {
        let index = ((crc ^ u16::from(byte)) & 0x00FF) as usize;
        (crc >> 8) ^ TABLE[index]
    })
}

/// Append the checksum of `frame` to it, low byte first
pub fn append(frame: &mut Vec<u8>) {
    let crc = checksum(frame);
    frame.extend_from_slice(&crc.to_le_bytes());
}

/// Read the little-endian checksum stored at `offset`, if the slice is long enough
pub fn stored_at(data: &[u8], offset: usize) -> Option<u16> {
    let bytes = data.get(offset..offset + CHECKSUM_LEN)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

/// Verify a complete frame whose last two bytes are its checksum
pub fn verify(frame: &[u8]) -> bool {
    if frame.len() < CHECKSUM_LEN {
        return false;
    }
    let body = frame.len() - CHECKSUM_LEN;
    stored_at(frame, body) == Some(checksum(&frame[..body]))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Bit-at-a-time reference, independent of the table
    fn crc16_bitwise(data: &[u8]) -> u16 {
        let mut crc: u16 = 0xFFFF;
        for &byte in data {
            crc ^= u16::from(byte);
            for _ in 0..8 {
                if crc & 0x0001 != 0 {
                    crc = (crc >> 1) ^ 0xA001;
                } else {
                    crc >>= 1;
                }
            }
        }
        crc
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(checksum(&[]), 0xFFFF);
    }

    #[test]
    fn test_check_vector() {
        // Test vector: "123456789" should give 0x4B37
        assert_eq!(checksum(b"123456789"), 0x4B37);
    }

    #[test]
    fn test_table_corners() {
        assert_eq!(TABLE[0], 0x0000);
        assert_eq!(TABLE[1], 0xC0C1);
        assert_eq!(TABLE[255], 0x4040);
    }

    #[test]
    fn test_matches_bitwise() {
        let data: Vec<u8> = (0..=255u8).collect();
        for end in [0, 1, 2, 7, 64, 255, 256] {
            assert_eq!(checksum(&data[..end]), crc16_bitwise(&data[..end]));
        }
    }

    #[test]
    fn test_matches_crc_crate() {
        let oracle = crc::Crc::<u16>::new(&crc::CRC_16_MODBUS);
        let data = [0x01, 0x04, 0x00, 0x00, 0x00, 0x10, 0xAA, 0x55];
        assert_eq!(checksum(&data), oracle.checksum(&data));
    }

    #[test]
    fn test_order_sensitive() {
        assert_ne!(checksum(&[0x01, 0x02, 0x03]), checksum(&[0x03, 0x02, 0x01]));
        assert_ne!(checksum(&[0x00, 0x04]), checksum(&[0x04, 0x00]));
    }

    #[test]
    fn test_known_request_frame() {
        // Read 2 holding registers from slave 1 at 0x0000: 01 03 00 00 00 02 C4 0B
        let frame = [0x01, 0x03, 0x00, 0x00, 0x00, 0x02, 0xC4, 0x0B];
        assert_eq!(checksum(&frame[..6]), 0x0BC4);
        assert!(verify(&frame));
    }

    #[test]
    fn test_append_then_verify() {
        let mut frame = vec![0x00, 0x06, 0x00, 0x20, 0x00, 0x07];
        append(&mut frame);
        assert_eq!(frame.len(), 8);
        assert!(verify(&frame));

        frame[3] ^= 0x01;
        assert!(!verify(&frame));
    }

    #[test]
    fn test_stored_at_bounds() {
        assert_eq!(stored_at(&[0x34, 0x12], 0), Some(0x1234));
        assert_eq!(stored_at(&[0x34], 0), None);
        assert_eq!(stored_at(&[0x00, 0x34, 0x12], 2), None);
        assert!(!verify(&[0xFF]));
    }
}
