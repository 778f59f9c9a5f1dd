//! SYWA probe protocol
//!
//! Modbus RTU framing restricted to the three exchanges the probe supports:
//! - Checksum (CRC-16/Modbus)
//! - Request frames (discover, assign address, read measurements)
//! - Reply parsing into typed outcomes

pub mod checksum;
pub mod error;
pub mod frame;
pub mod measurement;
pub mod parser;

pub use checksum::checksum;
pub use error::{FrameDefect, ProtocolError};
pub use frame::{
    build_assign_address, build_discover_address, build_read_measurements, build_request,
    decode_request, describe_frame, DeviceAddress, ExceptionCode, FunctionCode, Request,
    RequestKind, ADDRESS_REGISTER, DATA_REGISTER, DATA_REGISTER_COUNT, MAX_ADDRESS_BYTES,
};
pub use measurement::{Measurement, MeasurementSet};
pub use parser::{parse, Payload, ResponseOutcome};
