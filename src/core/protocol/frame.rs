//! Request frames for the SYWA probe
//!
//! Modbus RTU layout: `[address][function][payload..][crc lo][crc hi]`.
//! Only three requests exist on this bus: address discovery, address
//! assignment, and the measurement block read.

use super::checksum;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Register holding the probe's bus address
pub const ADDRESS_REGISTER: u16 = 0x0020;

/// First register of the measurement block
pub const DATA_REGISTER: u16 = 0x0000;

/// Measurement block width in 16-bit registers (8 floats)
pub const DATA_REGISTER_COUNT: u16 = 16;

/// Every request is address + function + two 16-bit fields + CRC
pub const REQUEST_LEN: usize = 8;

/// Widest address field a discovery reply may carry
pub const MAX_ADDRESS_BYTES: usize = 4;

/// Function codes understood by the probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum FunctionCode {
    /// Register read (0x04, "Read Input Registers" in generic Modbus)
    ReadHoldingRegisters = 0x04,
    /// Write Single Register (0x06)
    WriteSingleRegister = 0x06,
}

impl FunctionCode {
    /// Get function code from u8
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0x04 => Some(FunctionCode::ReadHoldingRegisters),
            0x06 => Some(FunctionCode::WriteSingleRegister),
            _ => None,
        }
    }

    /// Get name of function code
    pub fn name(&self) -> &'static str {
        match self {
            FunctionCode::ReadHoldingRegisters => "Read Holding Registers",
            FunctionCode::WriteSingleRegister => "Write Single Register",
        }
    }
}

impl From<FunctionCode> for u8 {
    fn from(code: FunctionCode) -> u8 {
        code as u8
    }
}

/// Modbus exception codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ExceptionCode {
    /// Function code not supported (0x01)
    IllegalFunction = 0x01,
    /// Register address out of range (0x02)
    IllegalDataAddress = 0x02,
    /// Value not accepted (0x03)
    IllegalDataValue = 0x03,
    /// Unrecoverable device error (0x04)
    SlaveDeviceFailure = 0x04,
    /// Request accepted, processing takes long (0x05)
    Acknowledge = 0x05,
    /// Device busy with a long command (0x06)
    SlaveDeviceBusy = 0x06,
    /// Memory parity error (0x08)
    MemoryParityError = 0x08,
    /// Gateway path unavailable (0x0A)
    GatewayPathUnavailable = 0x0A,
    /// Gateway target did not respond (0x0B)
    GatewayTargetDeviceFailedToRespond = 0x0B,
}

impl ExceptionCode {
    /// Get exception from u8
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(ExceptionCode::IllegalFunction),
            0x02 => Some(ExceptionCode::IllegalDataAddress),
            0x03 => Some(ExceptionCode::IllegalDataValue),
            0x04 => Some(ExceptionCode::SlaveDeviceFailure),
            0x05 => Some(ExceptionCode::Acknowledge),
            0x06 => Some(ExceptionCode::SlaveDeviceBusy),
            0x08 => Some(ExceptionCode::MemoryParityError),
            0x0A => Some(ExceptionCode::GatewayPathUnavailable),
            0x0B => Some(ExceptionCode::GatewayTargetDeviceFailedToRespond),
            _ => None,
        }
    }

    /// Get name of exception
    pub fn name(&self) -> &'static str {
        match self {
            ExceptionCode::IllegalFunction => "Illegal Function",
            ExceptionCode::IllegalDataAddress => "Illegal Data Address",
            ExceptionCode::IllegalDataValue => "Illegal Data Value",
            ExceptionCode::SlaveDeviceFailure => "Slave Device Failure",
            ExceptionCode::Acknowledge => "Acknowledge",
            ExceptionCode::SlaveDeviceBusy => "Slave Device Busy",
            ExceptionCode::MemoryParityError => "Memory Parity Error",
            ExceptionCode::GatewayPathUnavailable => "Gateway Path Unavailable",
            ExceptionCode::GatewayTargetDeviceFailedToRespond => "Gateway Target Failed to Respond",
        }
    }
}

/// Bus address of a probe. `0x00` is the broadcast address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceAddress(u8);

impl DeviceAddress {
    /// Address every probe on the bus listens to
    pub const BROADCAST: DeviceAddress = DeviceAddress(0x00);

    /// Unicast address, `None` for the broadcast value
    pub fn unicast(value: u8) -> Option<Self> {
        (value != 0).then_some(Self(value))
    }

    /// Raw address byte
    pub fn value(self) -> u8 {
        self.0
    }

    /// Is this the broadcast address?
    pub fn is_broadcast(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_broadcast() {
            write!(f, "broadcast")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl From<DeviceAddress> for u8 {
    fn from(address: DeviceAddress) -> u8 {
        address.0
    }
}

/// The request an inbound reply is answering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Broadcast read of the address register
    DiscoverAddress,
    /// Broadcast write of the address register
    AssignAddress,
    /// Unicast read of the measurement block
    ReadMeasurements {
        /// Probe the request was sent to
        target: DeviceAddress,
    },
}

impl RequestKind {
    /// Address byte a well-formed reply starts with
    pub fn reply_address(&self) -> DeviceAddress {
        match self {
            RequestKind::DiscoverAddress | RequestKind::AssignAddress => DeviceAddress::BROADCAST,
            RequestKind::ReadMeasurements { target } => *target,
        }
    }

    /// Function code a well-formed reply carries
    pub fn function(&self) -> FunctionCode {
        match self {
            RequestKind::DiscoverAddress | RequestKind::ReadMeasurements { .. } => {
                FunctionCode::ReadHoldingRegisters
            }
            RequestKind::AssignAddress => FunctionCode::WriteSingleRegister,
        }
    }

    /// Longest reply a compliant probe sends; sizes the receive buffer
    pub fn expected_reply_len(&self) -> usize {
        match self {
            // addr, fn, count, widest address field, crc
            RequestKind::DiscoverAddress => 3 + MAX_ADDRESS_BYTES + checksum::CHECKSUM_LEN,
            // echo of the request
            RequestKind::AssignAddress => REQUEST_LEN,
            RequestKind::ReadMeasurements { .. } => {
                3 + usize::from(DATA_REGISTER_COUNT) * 2 + checksum::CHECKSUM_LEN
            }
        }
    }

    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            RequestKind::DiscoverAddress => "discover",
            RequestKind::AssignAddress => "assign",
            RequestKind::ReadMeasurements { .. } => "read",
        }
    }
}

/// A decoded request frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// Who is on the bus?
    DiscoverAddress,
    /// Set the address of whichever probe hears this
    AssignAddress {
        /// New address
        address: u8,
    },
    /// Read the measurement block of one probe
    ReadMeasurements {
        /// Probe addressed
        target: DeviceAddress,
    },
}

fn build(address: u8, function: FunctionCode, register: u16, value: u16) -> Vec<u8> {
    let mut frame = Vec::with_capacity(REQUEST_LEN);
    frame.push(address);
    frame.push(function.into());
    frame.extend_from_slice(&register.to_be_bytes());
    frame.extend_from_slice(&value.to_be_bytes());
    checksum::append(&mut frame);
    frame
}

/// Broadcast read of the single address register
pub fn build_discover_address() -> Vec<u8> {
    build(
        DeviceAddress::BROADCAST.value(),
        FunctionCode::ReadHoldingRegisters,
        ADDRESS_REGISTER,
        1,
    )
}

/// Broadcast write of `new_address` into the address register
pub fn build_assign_address(new_address: u8) -> Vec<u8> {
    build(
        DeviceAddress::BROADCAST.value(),
        FunctionCode::WriteSingleRegister,
        ADDRESS_REGISTER,
        u16::from(new_address),
    )
}

/// Read of the full measurement block from `target`
pub fn build_read_measurements(target: DeviceAddress) -> Vec<u8> {
    build(
        target.value(),
        FunctionCode::ReadHoldingRegisters,
        DATA_REGISTER,
        DATA_REGISTER_COUNT,
    )
}

/// Build the frame for a request
pub fn build_request(request: &Request) -> Vec<u8> {
    match *request {
        Request::DiscoverAddress => build_discover_address(),
        Request::AssignAddress { address } => build_assign_address(address),
        Request::ReadMeasurements { target } => build_read_measurements(target),
    }
}

/// Recognise one of the three request frames
pub fn decode_request(data: &[u8]) -> Result<Request, &'static str> {
    if data.len() != REQUEST_LEN {
        return Err("Request must be 8 bytes");
    }
    if !checksum::verify(data) {
        return Err("CRC mismatch");
    }

    let address = data[0];
    let function = FunctionCode::from_u8(data[1]).ok_or("Unknown function code")?;
    let register = u16::from_be_bytes([data[2], data[3]]);
    let value = u16::from_be_bytes([data[4], data[5]]);

    match (DeviceAddress::unicast(address), function, register) {
        (None, FunctionCode::ReadHoldingRegisters, ADDRESS_REGISTER) if value == 1 => {
            Ok(Request::DiscoverAddress)
        }
        (None, FunctionCode::WriteSingleRegister, ADDRESS_REGISTER) => {
            let address = u8::try_from(value).map_err(|_| "Address value wider than 8 bits")?;
            Ok(Request::AssignAddress { address })
        }
        (Some(target), FunctionCode::ReadHoldingRegisters, DATA_REGISTER)
            if value == DATA_REGISTER_COUNT =>
        {
            Ok(Request::ReadMeasurements { target })
        }
        _ => Err("Not a probe request"),
    }
}

/// Format a frame for display
pub fn describe_frame(data: &[u8]) -> String {
    if data.len() < 4 {
        return format!("short frame: {}", hex::encode(data));
    }
    let body = data.len() - checksum::CHECKSUM_LEN;
    let function = match FunctionCode::from_u8(data[1]) {
        Some(code) => code.name().to_string(),
        None if data[1] & 0x80 != 0 => format!("exception {:02X}", data[1] & 0x7F),
        None => format!("{:02X}", data[1]),
    };
    format!(
        "addr={:02X} fn={} data={} crc={:04X}",
        data[0],
        function,
        hex::encode(&data[2..body]),
        u16::from_le_bytes([data[body], data[body + 1]])
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_discover_address() {
        let frame = build_discover_address();
        assert_eq!(&frame[..6], &[0x00, 0x04, 0x00, 0x20, 0x00, 0x01]);
        assert_eq!(frame.len(), REQUEST_LEN);
        assert!(checksum::verify(&frame));
    }

    #[test]
    fn test_build_assign_address() {
        let frame = build_assign_address(0x2A);
        assert_eq!(&frame[..6], &[0x00, 0x06, 0x00, 0x20, 0x00, 0x2A]);
        assert!(checksum::verify(&frame));
    }

    #[test]
    fn test_build_read_measurements() {
        let target = DeviceAddress::unicast(0x05).unwrap();
        let frame = build_read_measurements(target);
        assert_eq!(&frame[..6], &[0x05, 0x04, 0x00, 0x00, 0x00, 0x10]);
        let crc = checksum::checksum(&frame[..6]);
        assert_eq!(frame[6], (crc & 0xFF) as u8);
        assert_eq!(frame[7], (crc >> 8) as u8);
    }

    #[test]
    fn test_decode_request_recognises_builders() {
        let target = DeviceAddress::unicast(9).unwrap();
        for request in [
            Request::DiscoverAddress,
            Request::AssignAddress { address: 17 },
            Request::ReadMeasurements { target },
        ] {
            assert_eq!(decode_request(&build_request(&request)), Ok(request));
        }
    }

    #[test]
    fn test_decode_request_rejects_foreign_frames() {
        // Standard read holding registers (0x03) is not spoken by the probe
        let frame = [0x01, 0x03, 0x00, 0x00, 0x00, 0x02, 0xC4, 0x0B];
        assert_eq!(decode_request(&frame), Err("Unknown function code"));

        let mut bad = build_discover_address();
        bad[7] ^= 0xFF;
        assert_eq!(decode_request(&bad), Err("CRC mismatch"));

        assert!(decode_request(&[0x00, 0x04]).is_err());
    }

    #[test]
    fn test_device_address() {
        assert_eq!(DeviceAddress::unicast(0), None);
        assert!(DeviceAddress::BROADCAST.is_broadcast());
        let address = DeviceAddress::unicast(200).unwrap();
        assert_eq!(address.value(), 200);
        assert_eq!(address.to_string(), "200");
        assert_eq!(DeviceAddress::BROADCAST.to_string(), "broadcast");
    }

    #[test]
    fn test_expected_reply_lengths() {
        assert_eq!(RequestKind::DiscoverAddress.expected_reply_len(), 9);
        assert_eq!(RequestKind::AssignAddress.expected_reply_len(), 8);
        let target = DeviceAddress::unicast(1).unwrap();
        assert_eq!(RequestKind::ReadMeasurements { target }.expected_reply_len(), 37);
    }

    #[test]
    fn test_describe_frame() {
        let frame = build_assign_address(3);
        let text = describe_frame(&frame);
        assert!(text.starts_with("addr=00 fn=Write Single Register data=00200003"));
        assert!(describe_frame(&[0x01]).starts_with("short frame"));
    }
}
