//! Core module containing the probe protocol stack
//!
//! This module provides:
//! - Protocol layer (CRC, request frames, reply parsing, measurements)
//! - Transport layer for the RS-485 bus
//! - Probe session (one blocking exchange per operation)
//! - Simulated probe for tests and dry runs

pub mod protocol;
pub mod session;
pub mod simulator;
pub mod transport;
