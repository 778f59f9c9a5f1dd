//! Transport layer for the probe bus
//!
//! The protocol only needs a half-duplex byte pipe with explicit direction
//! control. Implementations:
//! - Serial ports with RS-485 driver-enable on RTS
//! - A simulated probe for tests and dry runs (see [`crate::core::simulator`])

mod serial;

pub use serial::{list_ports, DirectionControl, SerialConfig, SerialParity, SerialTransport};

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Bus direction of a half-duplex transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Driver enabled, we own the bus
    Transmit,
    /// Driver released, listening for the probe
    Receive,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transmit => write!(f, "TX"),
            Self::Receive => write!(f, "RX"),
        }
    }
}

/// Transport error types
#[derive(Error, Debug)]
pub enum TransportError {
    /// Connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// No reply within the read timeout
    #[error("No reply within {0} ms")]
    Timeout(u64),

    /// Port not found
    #[error("Port not found: {0}")]
    PortNotFound(String),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Not connected
    #[error("Not connected")]
    NotConnected,

    /// Direction control failed
    #[error("Direction control failed: {0}")]
    DirectionError(String),

    /// Fewer bytes written than requested
    #[error("Short write: {written} of {expected} bytes")]
    ShortWrite {
        /// Bytes accepted by the port
        written: usize,
        /// Frame length
        expected: usize,
    },
}

/// Transport statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    /// Bytes sent
    pub bytes_sent: u64,
    /// Bytes received
    pub bytes_received: u64,
    /// Frames sent
    pub frames_sent: u64,
    /// Reads that returned at least one byte
    pub reads: u64,
    /// Reads that timed out empty
    pub timeouts: u64,
}

/// Half-duplex byte transport to the probe bus
pub trait Transport: Send {
    /// Open the underlying device with its configured line settings
    fn open(&mut self) -> Result<(), TransportError>;

    /// Check if open
    fn is_open(&self) -> bool;

    /// Switch the bus driver direction
    fn set_direction(&mut self, direction: Direction) -> Result<(), TransportError>;

    /// Write a complete frame
    fn send(&mut self, data: &[u8]) -> Result<usize, TransportError>;

    /// Read up to `buf.len()` bytes, returning early once the buffer is full.
    /// Never blocks past `timeout`; returns `Ok(0)` if nothing arrived.
    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError>;

    /// Get connection info string
    fn connection_info(&self) -> String;

    /// Get statistics
    fn stats(&self) -> TransportStats;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn open(&mut self) -> Result<(), TransportError> {
        (**self).open()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn set_direction(&mut self, direction: Direction) -> Result<(), TransportError> {
        (**self).set_direction(direction)
    }

    fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        (**self).send(data)
    }

    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError> {
        (**self).receive(buf, timeout)
    }

    fn connection_info(&self) -> String {
        (**self).connection_info()
    }

    fn stats(&self) -> TransportStats {
        (**self).stats()
    }
}
