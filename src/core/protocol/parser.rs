//! Reply parsing
//!
//! The three reply shapes share no common layout beyond the address and
//! function bytes, so parsing is driven by the request that was sent.
//! Checks run in a fixed order:
//!
//! 1. length: never index past the buffer ([`FrameDefect::Truncated`],
//!    [`FrameDefect::ByteCount`])
//! 2. register echo, assignment replies only ([`FrameDefect::RegisterEcho`])
//! 3. CRC over everything before the checksum field
//! 4. leading address byte against the request ([`ResponseOutcome::Unexpected`])
//! 5. function code and payload shape

use super::checksum;
use super::error::{FrameDefect, ProtocolError};
use super::frame::{DeviceAddress, FunctionCode, RequestKind, ADDRESS_REGISTER, MAX_ADDRESS_BYTES};
use super::measurement::{MeasurementSet, BLOCK_LEN};
use serde::Serialize;

/// Address, function, byte count
const HEADER_LEN: usize = 3;

/// Offset of the assigned value within an assignment reply
const ASSIGNED_VALUE_OFFSET: usize = 5;

/// Payload of a valid reply
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Payload {
    /// Address reported by a discovery reply, before narrowing to 8 bits
    Discovered(u32),
    /// Address acknowledged by an assignment reply
    Assigned(u8),
    /// Measurement block of an addressed read
    Measurements(MeasurementSet),
}

/// Result of parsing one reply
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum ResponseOutcome {
    /// Checksum and shape both match the request
    Valid(Payload),
    /// CRC over the reply body differs from the one carried
    ChecksumMismatch {
        /// CRC over the reply body
        computed: u16,
        /// CRC carried by the reply
        received: u16,
    },
    /// Reply is structurally inconsistent
    Malformed(FrameDefect),
    /// Reply comes from the wrong address for the request
    Unexpected {
        /// Address the reply should come from
        expected: DeviceAddress,
        /// Leading byte of the reply
        found: u8,
    },
}

impl ResponseOutcome {
    /// Is this a valid reply?
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    /// Convert into a `Result`
    pub fn into_result(self) -> Result<Payload, ProtocolError> {
        match self {
            Self::Valid(payload) => Ok(payload),
            Self::ChecksumMismatch { computed, received } => {
                Err(ProtocolError::ChecksumMismatch { computed, received })
            }
            Self::Malformed(defect) => Err(ProtocolError::Malformed(defect)),
            Self::Unexpected { expected, found } => {
                Err(ProtocolError::Unexpected { expected, found })
            }
        }
    }
}

/// Parse the reply to `kind` contained in `data`
pub fn parse(kind: &RequestKind, data: &[u8]) -> ResponseOutcome {
    if data.len() >= 2 && data[1] & 0x80 != 0 {
        return parse_exception(kind, data);
    }

    match *kind {
        RequestKind::DiscoverAddress => parse_discovery(data),
        RequestKind::AssignAddress => parse_assignment(data),
        RequestKind::ReadMeasurements { target } => parse_read(target, data),
    }
}

/// Accumulate a discovery address: byte `i` contributes `byte << (8 * i)`
pub fn accumulate_address(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .take(MAX_ADDRESS_BYTES)
        .enumerate()
        .fold(0u32, |acc, (i, &byte)| acc | (u32::from(byte) << (8 * i)))
}

/// Split a byte-counted reply into its payload, checking bounds and CRC
fn counted_payload(data: &[u8]) -> Result<&[u8], ResponseOutcome> {
    let minimum = HEADER_LEN + checksum::CHECKSUM_LEN;
    if data.len() < minimum {
        return Err(ResponseOutcome::Malformed(FrameDefect::Truncated {
            needed: minimum,
            actual: data.len(),
        }));
    }

    let declared = usize::from(data[2]);
    let available = data.len() - minimum;
    if declared > available {
        return Err(ResponseOutcome::Malformed(FrameDefect::ByteCount {
            declared,
            available,
        }));
    }

    let body = HEADER_LEN + declared;
    verify_at(data, body)?;
    Ok(&data[HEADER_LEN..body])
}

/// Compare the CRC of `data[..body]` with the one stored right after it
fn verify_at(data: &[u8], body: usize) -> Result<(), ResponseOutcome> {
    let computed = checksum::checksum(&data[..body]);
    match checksum::stored_at(data, body) {
        Some(received) if received == computed => Ok(()),
        Some(received) => Err(ResponseOutcome::ChecksumMismatch { computed, received }),
        None => Err(ResponseOutcome::Malformed(FrameDefect::Truncated {
            needed: body + checksum::CHECKSUM_LEN,
            actual: data.len(),
        })),
    }
}

fn check_header(
    data: &[u8],
    expected: DeviceAddress,
    function: FunctionCode,
) -> Result<(), ResponseOutcome> {
    if data[0] != expected.value() {
        return Err(ResponseOutcome::Unexpected {
            expected,
            found: data[0],
        });
    }
    if data[1] != u8::from(function) {
        return Err(ResponseOutcome::Malformed(FrameDefect::WrongFunction {
            expected: function.into(),
            found: data[1],
        }));
    }
    Ok(())
}

fn parse_read(target: DeviceAddress, data: &[u8]) -> ResponseOutcome {
    let payload = match counted_payload(data) {
        Ok(payload) => payload,
        Err(outcome) => return outcome,
    };
    if let Err(outcome) = check_header(data, target, FunctionCode::ReadHoldingRegisters) {
        return outcome;
    }

    match <&[u8; BLOCK_LEN]>::try_from(payload) {
        Ok(block) => ResponseOutcome::Valid(Payload::Measurements(MeasurementSet::from_block(block))),
        Err(_) => ResponseOutcome::Malformed(FrameDefect::BlockSize {
            expected: BLOCK_LEN,
            found: payload.len(),
        }),
    }
}

fn parse_discovery(data: &[u8]) -> ResponseOutcome {
    let payload = match counted_payload(data) {
        Ok(payload) => payload,
        Err(outcome) => return outcome,
    };
    if let Err(outcome) = check_header(
        data,
        DeviceAddress::BROADCAST,
        FunctionCode::ReadHoldingRegisters,
    ) {
        return outcome;
    }

    if payload.is_empty() || payload.len() > MAX_ADDRESS_BYTES {
        return ResponseOutcome::Malformed(FrameDefect::AddressWidth(payload.len()));
    }
    ResponseOutcome::Valid(Payload::Discovered(accumulate_address(payload)))
}

fn parse_assignment(data: &[u8]) -> ResponseOutcome {
    // address, function, register, value
    let body = 6;
    let needed = body + checksum::CHECKSUM_LEN;
    if data.len() < needed {
        return ResponseOutcome::Malformed(FrameDefect::Truncated {
            needed,
            actual: data.len(),
        });
    }

    let register = u16::from_be_bytes([data[2], data[3]]);
    if register != ADDRESS_REGISTER {
        return ResponseOutcome::Malformed(FrameDefect::RegisterEcho(register));
    }
    if let Err(outcome) = verify_at(data, body) {
        return outcome;
    }
    if let Err(outcome) = check_header(
        data,
        DeviceAddress::BROADCAST,
        FunctionCode::WriteSingleRegister,
    ) {
        return outcome;
    }

    ResponseOutcome::Valid(Payload::Assigned(data[ASSIGNED_VALUE_OFFSET]))
}

fn parse_exception(kind: &RequestKind, data: &[u8]) -> ResponseOutcome {
    let body = HEADER_LEN;
    let needed = body + checksum::CHECKSUM_LEN;
    if data.len() < needed {
        return ResponseOutcome::Malformed(FrameDefect::Truncated {
            needed,
            actual: data.len(),
        });
    }
    if let Err(outcome) = verify_at(data, body) {
        return outcome;
    }

    let expected = kind.reply_address();
    if data[0] != expected.value() {
        return ResponseOutcome::Unexpected {
            expected,
            found: data[0],
        };
    }

    let function = data[1] & 0x7F;
    if function != u8::from(kind.function()) {
        return ResponseOutcome::Malformed(FrameDefect::WrongFunction {
            expected: kind.function().into(),
            found: data[1],
        });
    }
    ResponseOutcome::Malformed(FrameDefect::Exception {
        function,
        code: data[2],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::protocol::measurement::encode_float;

    fn with_crc(mut frame: Vec<u8>) -> Vec<u8> {
        checksum::append(&mut frame);
        frame
    }

    fn read_kind(address: u8) -> RequestKind {
        RequestKind::ReadMeasurements {
            target: DeviceAddress::unicast(address).unwrap(),
        }
    }

    fn read_reply(address: u8, values: &[f32]) -> Vec<u8> {
        let mut frame = vec![address, 0x04, (values.len() * 4) as u8];
        for &value in values {
            frame.extend_from_slice(&encode_float(value));
        }
        with_crc(frame)
    }

    const VALUES: [f32; 8] = [1.5, 2.25, 0.0, -3.75, 10.0, 11.0, 12.0, 13.0];

    #[test]
    fn test_read_reply_bit_exact() {
        let frame = read_reply(5, &VALUES);
        assert_eq!(frame.len(), 37);

        match parse(&read_kind(5), &frame) {
            ResponseOutcome::Valid(Payload::Measurements(set)) => {
                for (got, want) in set.values().iter().zip(VALUES) {
                    assert_eq!(got.to_bits(), want.to_bits());
                }
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_read_reply_ignores_trailing_bytes() {
        let mut frame = read_reply(5, &VALUES);
        frame.extend_from_slice(&[0x00, 0xFF]);
        assert!(parse(&read_kind(5), &frame).is_valid());
    }

    #[test]
    fn test_single_byte_corruption() {
        let frame = read_reply(5, &VALUES);
        let body = frame.len() - 2;
        for index in (0..body).filter(|&i| i != 2) {
            let mut corrupt = frame.clone();
            corrupt[index] ^= 0x5A;
            assert!(
                matches!(
                    parse(&read_kind(5), &corrupt),
                    ResponseOutcome::ChecksumMismatch { .. }
                ),
                "byte {} corrupted",
                index
            );
        }
    }

    #[test]
    fn test_byte_count_corruption() {
        let frame = read_reply(5, &VALUES);

        let mut longer = frame.clone();
        longer[2] = 0x21;
        assert_eq!(
            parse(&read_kind(5), &longer),
            ResponseOutcome::Malformed(FrameDefect::ByteCount {
                declared: 33,
                available: 32
            })
        );

        let mut shorter = frame;
        shorter[2] = 0x1F;
        assert!(matches!(
            parse(&read_kind(5), &shorter),
            ResponseOutcome::ChecksumMismatch { .. }
        ));
    }

    #[test]
    fn test_read_reply_wrong_block_size() {
        let frame = read_reply(5, &VALUES[..4]);
        assert_eq!(
            parse(&read_kind(5), &frame),
            ResponseOutcome::Malformed(FrameDefect::BlockSize {
                expected: 32,
                found: 16
            })
        );
    }

    #[test]
    fn test_read_reply_from_other_address() {
        let frame = read_reply(6, &VALUES);
        assert_eq!(
            parse(&read_kind(5), &frame),
            ResponseOutcome::Unexpected {
                expected: DeviceAddress::unicast(5).unwrap(),
                found: 6
            }
        );

        let broadcast = read_reply(0, &VALUES);
        assert!(matches!(
            parse(&read_kind(5), &broadcast),
            ResponseOutcome::Unexpected { found: 0, .. }
        ));
    }

    #[test]
    fn test_read_reply_wrong_function() {
        let mut frame = vec![5, 0x03, 32];
        frame.extend_from_slice(&[0u8; 32]);
        let frame = with_crc(frame);
        assert_eq!(
            parse(&read_kind(5), &frame),
            ResponseOutcome::Malformed(FrameDefect::WrongFunction {
                expected: 0x04,
                found: 0x03
            })
        );
    }

    #[test]
    fn test_discovery_single_byte() {
        let frame = with_crc(vec![0x00, 0x04, 0x01, 0x05]);
        assert_eq!(
            parse(&RequestKind::DiscoverAddress, &frame),
            ResponseOutcome::Valid(Payload::Discovered(5))
        );
    }

    #[test]
    fn test_discovery_positional_weighting() {
        let frame = with_crc(vec![0x00, 0x04, 0x02, 0x05, 0x01]);
        assert_eq!(
            parse(&RequestKind::DiscoverAddress, &frame),
            ResponseOutcome::Valid(Payload::Discovered(0x105))
        );
    }

    #[test]
    fn test_discovery_address_width() {
        let empty = with_crc(vec![0x00, 0x04, 0x00]);
        assert_eq!(
            parse(&RequestKind::DiscoverAddress, &empty),
            ResponseOutcome::Malformed(FrameDefect::AddressWidth(0))
        );

        let wide = with_crc(vec![0x00, 0x04, 0x05, 1, 2, 3, 4, 5]);
        assert_eq!(
            parse(&RequestKind::DiscoverAddress, &wide),
            ResponseOutcome::Malformed(FrameDefect::AddressWidth(5))
        );
    }

    #[test]
    fn test_discovery_from_unicast_is_unexpected() {
        let frame = with_crc(vec![0x07, 0x04, 0x01, 0x07]);
        assert!(matches!(
            parse(&RequestKind::DiscoverAddress, &frame),
            ResponseOutcome::Unexpected { found: 7, .. }
        ));
    }

    #[test]
    fn test_assignment_reply() {
        let frame = with_crc(vec![0x00, 0x06, 0x00, 0x20, 0x00, 0x09]);
        assert_eq!(
            parse(&RequestKind::AssignAddress, &frame),
            ResponseOutcome::Valid(Payload::Assigned(9))
        );
    }

    #[test]
    fn test_assignment_register_echo_beats_checksum() {
        let valid = with_crc(vec![0x00, 0x06, 0x00, 0x21, 0x00, 0x09]);
        assert_eq!(
            parse(&RequestKind::AssignAddress, &valid),
            ResponseOutcome::Malformed(FrameDefect::RegisterEcho(0x0021))
        );

        let mut broken = valid;
        broken[7] ^= 0xFF;
        assert_eq!(
            parse(&RequestKind::AssignAddress, &broken),
            ResponseOutcome::Malformed(FrameDefect::RegisterEcho(0x0021))
        );
    }

    #[test]
    fn test_assignment_checksum_mismatch() {
        let mut frame = with_crc(vec![0x00, 0x06, 0x00, 0x20, 0x00, 0x09]);
        frame[5] = 0x0A;
        assert!(matches!(
            parse(&RequestKind::AssignAddress, &frame),
            ResponseOutcome::ChecksumMismatch { .. }
        ));
    }

    #[test]
    fn test_truncated_buffers() {
        let full = read_reply(5, &VALUES);
        for len in 0..full.len() - 1 {
            let outcome = parse(&read_kind(5), &full[..len]);
            assert!(
                matches!(outcome, ResponseOutcome::Malformed(_)),
                "len {} gave {:?}",
                len,
                outcome
            );
        }

        let assign = with_crc(vec![0x00, 0x06, 0x00, 0x20, 0x00, 0x09]);
        for len in 0..assign.len() {
            assert!(matches!(
                parse(&RequestKind::AssignAddress, &assign[..len]),
                ResponseOutcome::Malformed(FrameDefect::Truncated { .. })
            ));
        }

        for len in 0..3 {
            assert!(matches!(
                parse(&RequestKind::DiscoverAddress, &[0x00, 0x04, 0x01][..len]),
                ResponseOutcome::Malformed(FrameDefect::Truncated { .. })
            ));
        }
    }

    #[test]
    fn test_exception_reply() {
        let frame = with_crc(vec![0x05, 0x84, 0x02]);
        assert_eq!(
            parse(&read_kind(5), &frame),
            ResponseOutcome::Malformed(FrameDefect::Exception {
                function: 0x04,
                code: 0x02
            })
        );

        let wrong = with_crc(vec![0x00, 0x84, 0x02]);
        assert_eq!(
            parse(&RequestKind::AssignAddress, &wrong),
            ResponseOutcome::Malformed(FrameDefect::WrongFunction {
                expected: 0x06,
                found: 0x84
            })
        );

        assert!(matches!(
            parse(&read_kind(5), &[0x05, 0x84, 0x02, 0x00]),
            ResponseOutcome::Malformed(FrameDefect::Truncated { .. })
        ));
    }

    #[test]
    fn test_accumulate_address() {
        assert_eq!(accumulate_address(&[0x05]), 5);
        assert_eq!(accumulate_address(&[0x00, 0x05]), 0x0500);
        assert_eq!(accumulate_address(&[0x01, 0x02, 0x03, 0x04]), 0x0403_0201);
    }

    #[test]
    fn test_into_result() {
        let frame = with_crc(vec![0x00, 0x04, 0x01, 0x05]);
        let payload = parse(&RequestKind::DiscoverAddress, &frame).into_result().unwrap();
        assert_eq!(payload, Payload::Discovered(5));

        let err = ResponseOutcome::Malformed(FrameDefect::AddressWidth(0))
            .into_result()
            .unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(FrameDefect::AddressWidth(0))));
    }
}
