//! CLI Exit Codes
//!
//! Standard exit codes for CLI operations and automation.

use crate::config::ConfigError;
use crate::core::protocol::{FrameDefect, ProtocolError};
use crate::core::transport::TransportError;
use std::process::ExitCode;

/// Exit code constants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCodes;

impl ExitCodes {
    /// Success
    pub const SUCCESS: u8 = 0;

    /// General error
    pub const ERROR: u8 = 1;

    /// Invalid arguments
    pub const INVALID_ARGS: u8 = 2;

    /// Port could not be opened
    pub const CONNECTION_FAILED: u8 = 3;

    /// Probe did not answer in time
    pub const TIMEOUT: u8 = 4;

    /// Port not found
    pub const PORT_NOT_FOUND: u8 = 5;

    /// Permission denied
    pub const PERMISSION_DENIED: u8 = 6;

    /// Configuration error
    pub const CONFIG_ERROR: u8 = 7;

    /// Reply failed the CRC check
    pub const CHECKSUM_ERROR: u8 = 8;

    /// Reply was structurally invalid
    pub const MALFORMED_REPLY: u8 = 9;

    /// Reply did not belong to the request
    pub const UNEXPECTED_REPLY: u8 = 10;

    /// Probe answered with a Modbus exception
    pub const DEVICE_EXCEPTION: u8 = 11;

    /// No probe address known
    pub const NO_ADDRESS: u8 = 12;

    /// Address outside 1..=255 or not acknowledged
    pub const INVALID_ADDRESS: u8 = 13;

    /// Internal error
    pub const INTERNAL_ERROR: u8 = 127;
}

/// CLI operation result
#[derive(Debug)]
pub enum CliResult {
    /// Success with optional message
    Success(Option<String>),

    /// Error with code and message
    Error(u8, String),
}

impl CliResult {
    /// Plain success
    pub fn success() -> Self {
        Self::Success(None)
    }

    /// Success with a message
    pub fn success_with_message(msg: impl Into<String>) -> Self {
        Self::Success(Some(msg.into()))
    }

    /// Error with an explicit code
    pub fn error(code: u8, msg: impl Into<String>) -> Self {
        Self::Error(code, msg.into())
    }

    /// Invalid command line input
    pub fn invalid_args(msg: impl Into<String>) -> Self {
        Self::Error(ExitCodes::INVALID_ARGS, msg.into())
    }

    /// Map an error chain to an exit code by its innermost known cause
    pub fn from_error(err: &anyhow::Error) -> Self {
        for cause in err.chain() {
            if let Some(e) = cause.downcast_ref::<ProtocolError>() {
                return Self::Error(protocol_code(e), format!("{:#}", err));
            }
            if let Some(e) = cause.downcast_ref::<TransportError>() {
                return Self::Error(transport_code(e), format!("{:#}", err));
            }
            if cause.downcast_ref::<ConfigError>().is_some() {
                return Self::Error(ExitCodes::CONFIG_ERROR, format!("{:#}", err));
            }
        }
        Self::Error(ExitCodes::ERROR, format!("{:#}", err))
    }

    /// Get exit code
    pub fn code(&self) -> u8 {
        match self {
            Self::Success(_) => ExitCodes::SUCCESS,
            Self::Error(code, _) => *code,
        }
    }

    /// Get message
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Success(Some(msg)) | Self::Error(_, msg) => Some(msg),
            Self::Success(None) => None,
        }
    }

    /// Convert to ExitCode
    pub fn to_exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }

    /// Is success?
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

impl From<&ProtocolError> for CliResult {
    fn from(err: &ProtocolError) -> Self {
        Self::Error(protocol_code(err), err.to_string())
    }
}

impl From<&TransportError> for CliResult {
    fn from(err: &TransportError) -> Self {
        Self::Error(transport_code(err), err.to_string())
    }
}

fn transport_code(err: &TransportError) -> u8 {
    match err {
        TransportError::Timeout(_) => ExitCodes::TIMEOUT,
        TransportError::PortNotFound(_) => ExitCodes::PORT_NOT_FOUND,
        TransportError::PermissionDenied(_) => ExitCodes::PERMISSION_DENIED,
        TransportError::InvalidConfiguration(_) => ExitCodes::CONFIG_ERROR,
        TransportError::ConnectionFailed(_) | TransportError::NotConnected => {
            ExitCodes::CONNECTION_FAILED
        }
        TransportError::IoError(_)
        | TransportError::DirectionError(_)
        | TransportError::ShortWrite { .. } => ExitCodes::ERROR,
    }
}

fn protocol_code(err: &ProtocolError) -> u8 {
    match err {
        ProtocolError::Transport(e) => transport_code(e),
        ProtocolError::ChecksumMismatch { .. } => ExitCodes::CHECKSUM_ERROR,
        ProtocolError::Malformed(FrameDefect::Exception { .. }) => ExitCodes::DEVICE_EXCEPTION,
        ProtocolError::Malformed(_) => ExitCodes::MALFORMED_REPLY,
        ProtocolError::Unexpected { .. } => ExitCodes::UNEXPECTED_REPLY,
        ProtocolError::NoAddressAssigned => ExitCodes::NO_ADDRESS,
        ProtocolError::InvalidAddress(_) | ProtocolError::AssignmentMismatch { .. } => {
            ExitCodes::INVALID_ADDRESS
        }
    }
}

const DOCUMENTED: [u8; 15] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 127];

/// Exit code description
pub fn exit_code_description(code: u8) -> &'static str {
    match code {
        0 => "Success",
        1 => "General error",
        2 => "Invalid arguments",
        3 => "Connection failed",
        4 => "No reply from probe",
        5 => "Port not found",
        6 => "Permission denied",
        7 => "Configuration error",
        8 => "Reply checksum mismatch",
        9 => "Malformed reply",
        10 => "Unexpected reply",
        11 => "Probe reported an exception",
        12 => "No probe address known",
        13 => "Invalid or unacknowledged address",
        127 => "Internal error",
        _ => "Unknown error",
    }
}

/// Print exit code table
pub fn print_exit_codes() {
    println!("Exit Codes:");
    for code in DOCUMENTED {
        println!("  {:>3}  {}", code, exit_code_description(code));
    }
}
