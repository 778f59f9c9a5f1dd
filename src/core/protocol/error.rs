//! Protocol error types

use super::frame::{DeviceAddress, ExceptionCode};
use crate::core::transport::TransportError;
use serde::Serialize;
use thiserror::Error;

/// Structural problems with an inbound reply
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "defect", content = "detail", rename_all = "snake_case")]
pub enum FrameDefect {
    /// Fewer bytes than the shortest acceptable reply
    #[error("reply truncated: need {needed} bytes, got {actual}")]
    Truncated {
        /// Minimum length for the expected shape
        needed: usize,
        /// Bytes received
        actual: usize,
    },

    /// Byte-count field points past the end of the buffer
    #[error("byte count {declared} exceeds the {available} bytes available")]
    ByteCount {
        /// Value of the byte-count field
        declared: usize,
        /// Payload bytes actually present
        available: usize,
    },

    /// Function code is not the one the request calls for
    #[error("expected function {expected:#04x}, found {found:#04x}")]
    WrongFunction {
        /// Function code of the request
        expected: u8,
        /// Function code in the reply
        found: u8,
    },

    /// Read reply does not carry exactly one measurement block
    #[error("measurement block must be {expected} bytes, got {found}")]
    BlockSize {
        /// Block size in bytes
        expected: usize,
        /// Byte count in the reply
        found: usize,
    },

    /// Discovery reply carries an address of unsupported width
    #[error("address field of {0} bytes is not supported")]
    AddressWidth(usize),

    /// Assignment reply echoes a register other than the address register
    #[error("register echo {0:#06x} is not the address register")]
    RegisterEcho(u16),

    /// The probe answered with a Modbus exception
    #[error("device exception {code:#04x} ({}) for function {function:#04x}", exception_name(.code))]
    Exception {
        /// Function code of the failed request
        function: u8,
        /// Exception code
        code: u8,
    },
}

fn exception_name(code: &u8) -> &'static str {
    ExceptionCode::from_u8(*code).map_or("unknown", |e| e.name())
}

/// Errors surfaced by a probe exchange
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Transport failed (open, write, read or timeout)
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Reply arrived but failed its integrity check
    #[error("checksum mismatch: computed {computed:#06x}, received {received:#06x}")]
    ChecksumMismatch {
        /// CRC over the reply body
        computed: u16,
        /// CRC carried by the reply
        received: u16,
    },

    /// Reply is structurally inconsistent
    #[error("malformed reply: {0}")]
    Malformed(FrameDefect),

    /// Reply does not belong to the outstanding request
    #[error("unexpected reply from address {found:#04x} (expected {expected})")]
    Unexpected {
        /// Address the reply should come from
        expected: DeviceAddress,
        /// Leading byte of the reply
        found: u8,
    },

    /// Addressed read attempted before discovery or assignment
    #[error("no probe address assigned")]
    NoAddressAssigned,

    /// Address value cannot be used as a unicast address
    #[error("address {0:#x} is not a valid unicast address")]
    InvalidAddress(u32),

    /// Probe acknowledged a different address than the one requested
    #[error("probe acknowledged address {echoed}, requested {requested}")]
    AssignmentMismatch {
        /// Address sent
        requested: u8,
        /// Address echoed back
        echoed: u8,
    },
}

impl ProtocolError {
    /// Did the failure come from the transport?
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Did a reply arrive but fail validation?
    pub fn is_decode(&self) -> bool {
        matches!(
            self,
            Self::ChecksumMismatch { .. } | Self::Malformed(_) | Self::Unexpected { .. }
        )
    }
}
