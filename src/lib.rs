//! # SYWA Probe Library
//!
//! Modbus RTU protocol layer for SYWA magnetostrictive level probes on a
//! half-duplex RS-485 bus:
//! - Address discovery and assignment over broadcast
//! - Reading the eight-float measurement block
//! - CRC-16/Modbus framing and strict reply validation
//! - Serial transport with RTS driver-enable, plus a simulated probe
//!
//! ## Example
//!
//! ```rust,no_run
//! use sywa_probe::{ExchangeTiming, ProbeSession, SerialConfig, SerialTransport};
//!
//! fn main() -> anyhow::Result<()> {
//!     let transport = SerialTransport::new(SerialConfig::new("/dev/ttyUSB0", 9600));
//!     let mut session = ProbeSession::new(transport, ExchangeTiming::default());
//!     session.initialize()?;
//!
//!     let address = session.discover_address()?;
//!     let set = session.read_measurements()?;
//!     println!("probe {}: fuel {} mm", address, set.fuel_level());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod core;

// Re-exports for convenience
pub use crate::cli::{CliResult, ExitCodes, OutputFormat};
pub use crate::config::{ConfigError, ProbeConfig};
pub use crate::core::protocol::{
    checksum, parse, DeviceAddress, FrameDefect, Measurement, MeasurementSet, Payload,
    ProtocolError, RequestKind, ResponseOutcome,
};
pub use crate::core::session::{ExchangeTiming, ProbeSession, SessionStats};
pub use crate::core::simulator::{DiscoveryEncoding, Fault, SimulatedProbe};
pub use crate::core::transport::{
    Direction, DirectionControl, SerialConfig, SerialParity, SerialTransport, Transport,
    TransportError, TransportStats,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
