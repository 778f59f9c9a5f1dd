//! Virtual SYWA probe
//!
//! A [`Transport`] that answers discovery, assignment and read requests the
//! way a single probe on the bus would. Faults can be scheduled to exercise
//! the error paths of a session without hardware.

use crate::core::protocol::checksum;
use crate::core::protocol::frame::{decode_request, DeviceAddress, ExceptionCode, Request};
use crate::core::protocol::measurement::{MeasurementSet, BLOCK_LEN};
use crate::core::protocol::FunctionCode;
use crate::core::transport::{Direction, Transport, TransportError, TransportStats};
use std::collections::VecDeque;
use std::time::Duration;

/// How the probe reports its address to a discovery request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiscoveryEncoding {
    /// Byte count 1, the address byte alone
    #[default]
    SingleByte,
    /// Byte count 2, the full register big-endian (`00 aa`)
    Register,
}

/// Fault to apply to the next reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Send nothing
    Drop,
    /// Flip every bit of one payload byte after the CRC is computed
    Corrupt,
    /// Answer with a Modbus exception
    Exception(ExceptionCode),
    /// Send these bytes verbatim instead of the real reply
    Replace(Vec<u8>),
    /// Send only the first `n` bytes of the real reply
    Truncate(usize),
}

/// Simulated probe
#[derive(Debug)]
pub struct SimulatedProbe {
    address: u8,
    measurements: MeasurementSet,
    discovery: DiscoveryEncoding,
    faults: VecDeque<Fault>,
    direction: Direction,
    open: bool,
    pending: Vec<u8>,
    direction_changes: u64,
    received: Vec<Vec<u8>>,
    stats: TransportStats,
}

impl SimulatedProbe {
    /// Create a probe listening on `address`
    pub fn new(address: u8) -> Self {
        Self {
            address,
            measurements: MeasurementSet::default(),
            discovery: DiscoveryEncoding::default(),
            faults: VecDeque::new(),
            direction: Direction::Receive,
            open: false,
            pending: Vec::new(),
            direction_changes: 0,
            received: Vec::new(),
            stats: TransportStats::default(),
        }
    }

    /// Set the values the probe reports
    #[must_use]
    pub fn with_measurements(mut self, measurements: MeasurementSet) -> Self {
        self.measurements = measurements;
        self
    }

    /// Set the discovery reply encoding
    #[must_use]
    pub fn with_discovery(mut self, encoding: DiscoveryEncoding) -> Self {
        self.discovery = encoding;
        self
    }

    /// Current probe address
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Replace the reported values
    pub fn set_measurements(&mut self, measurements: MeasurementSet) {
        self.measurements = measurements;
    }

    /// Queue a fault for the next reply
    pub fn push_fault(&mut self, fault: Fault) {
        self.faults.push_back(fault);
    }

    /// Number of `set_direction` calls seen
    pub fn direction_changes(&self) -> u64 {
        self.direction_changes
    }

    /// Request frames received, in order
    pub fn received_frames(&self) -> &[Vec<u8>] {
        &self.received
    }

    /// Did the bus see any traffic or direction change at all?
    pub fn is_idle(&self) -> bool {
        self.direction_changes == 0 && self.received.is_empty() && self.stats == TransportStats::default()
    }

    fn respond(&mut self, frame: &[u8]) -> Option<Vec<u8>> {
        let request = match decode_request(frame) {
            Ok(request) => request,
            Err(reason) => {
                tracing::debug!("Simulated probe ignoring frame: {}", reason);
                return None;
            }
        };

        match request {
            Request::DiscoverAddress => {
                let mut reply = vec![0x00, u8::from(FunctionCode::ReadHoldingRegisters)];
                match self.discovery {
                    DiscoveryEncoding::SingleByte => reply.extend_from_slice(&[1, self.address]),
                    DiscoveryEncoding::Register => reply.extend_from_slice(&[2, 0x00, self.address]),
                }
                checksum::append(&mut reply);
                Some(reply)
            }
            Request::AssignAddress { address } => {
                if DeviceAddress::unicast(address).is_none() {
                    return Some(exception(
                        0x00,
                        FunctionCode::WriteSingleRegister,
                        ExceptionCode::IllegalDataValue,
                    ));
                }
                self.address = address;
                Some(frame.to_vec())
            }
            Request::ReadMeasurements { target } if target.value() == self.address => {
                let mut reply = vec![
                    self.address,
                    u8::from(FunctionCode::ReadHoldingRegisters),
                    BLOCK_LEN as u8,
                ];
                reply.extend_from_slice(&self.measurements.to_block());
                checksum::append(&mut reply);
                Some(reply)
            }
            Request::ReadMeasurements { .. } => None,
        }
    }

    fn apply_fault(&mut self, frame: &[u8], reply: Option<Vec<u8>>) -> Option<Vec<u8>> {
        let Some(fault) = self.faults.pop_front() else {
            return reply;
        };
        tracing::debug!("Simulated probe applying fault {:?}", fault);

        match fault {
            Fault::Drop => None,
            Fault::Corrupt => reply.map(|mut reply| {
                // last byte before the CRC
                if let Some(byte) = reply.len().checked_sub(3).and_then(|i| reply.get_mut(i)) {
                    *byte ^= 0xFF;
                }
                reply
            }),
            Fault::Exception(code) => {
                let function = FunctionCode::from_u8(frame.get(1).copied().unwrap_or_default())
                    .unwrap_or(FunctionCode::ReadHoldingRegisters);
                let address = frame.first().copied().unwrap_or_default();
                Some(exception(address, function, code))
            }
            Fault::Replace(bytes) => Some(bytes),
            Fault::Truncate(len) => reply.map(|mut reply| {
                reply.truncate(len);
                reply
            }),
        }
    }
}

fn exception(address: u8, function: FunctionCode, code: ExceptionCode) -> Vec<u8> {
    let mut reply = vec![address, u8::from(function) | 0x80, code as u8];
    checksum::append(&mut reply);
    reply
}

impl Transport for SimulatedProbe {
    fn open(&mut self) -> Result<(), TransportError> {
        self.open = true;
        self.direction = Direction::Receive;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn set_direction(&mut self, direction: Direction) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::NotConnected);
        }
        self.direction = direction;
        self.direction_changes += 1;
        Ok(())
    }

    fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        if !self.open {
            return Err(TransportError::NotConnected);
        }
        if self.direction != Direction::Transmit {
            return Err(TransportError::DirectionError("send while in receive mode".into()));
        }

        self.stats.bytes_sent += data.len() as u64;
        self.stats.frames_sent += 1;
        self.received.push(data.to_vec());

        let reply = self.respond(data);
        self.pending = self.apply_fault(data, reply).unwrap_or_default();
        Ok(data.len())
    }

    fn receive(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize, TransportError> {
        if !self.open {
            return Err(TransportError::NotConnected);
        }
        if self.direction != Direction::Receive {
            return Err(TransportError::DirectionError("receive while in transmit mode".into()));
        }

        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);

        if n == 0 {
            self.stats.timeouts += 1;
        } else {
            self.stats.reads += 1;
            self.stats.bytes_received += n as u64;
        }
        Ok(n)
    }

    fn connection_info(&self) -> String {
        format!("simulated probe @ address {}", self.address)
    }

    fn stats(&self) -> TransportStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::protocol::{build_assign_address, build_discover_address, build_read_measurements};

    fn exchange(probe: &mut SimulatedProbe, frame: &[u8]) -> Vec<u8> {
        probe.set_direction(Direction::Transmit).unwrap();
        probe.send(frame).unwrap();
        probe.set_direction(Direction::Receive).unwrap();
        let mut buf = [0u8; 64];
        let n = probe.receive(&mut buf, Duration::from_millis(10)).unwrap();
        buf[..n].to_vec()
    }

    #[test]
    fn test_discovery_encodings() {
        let mut probe = SimulatedProbe::new(5);
        probe.open().unwrap();
        let reply = exchange(&mut probe, &build_discover_address());
        assert_eq!(&reply[..4], &[0x00, 0x04, 0x01, 0x05]);
        assert!(checksum::verify(&reply));

        let mut probe = SimulatedProbe::new(5).with_discovery(DiscoveryEncoding::Register);
        probe.open().unwrap();
        let reply = exchange(&mut probe, &build_discover_address());
        assert_eq!(&reply[..5], &[0x00, 0x04, 0x02, 0x00, 0x05]);
    }

    #[test]
    fn test_assignment_echo_changes_address() {
        let mut probe = SimulatedProbe::new(5);
        probe.open().unwrap();
        let request = build_assign_address(12);
        assert_eq!(exchange(&mut probe, &request), request);
        assert_eq!(probe.address(), 12);
    }

    #[test]
    fn test_read_ignores_other_addresses() {
        let mut probe = SimulatedProbe::new(5);
        probe.open().unwrap();
        let other = DeviceAddress::unicast(6).unwrap();
        assert!(exchange(&mut probe, &build_read_measurements(other)).is_empty());
        assert_eq!(probe.stats().timeouts, 1);

        let own = DeviceAddress::unicast(5).unwrap();
        assert_eq!(exchange(&mut probe, &build_read_measurements(own)).len(), 37);
    }

    #[test]
    fn test_faults_apply_once() {
        let mut probe = SimulatedProbe::new(5);
        probe.open().unwrap();
        probe.push_fault(Fault::Corrupt);
        let reply = exchange(&mut probe, &build_discover_address());
        assert!(!checksum::verify(&reply));
        let reply = exchange(&mut probe, &build_discover_address());
        assert!(checksum::verify(&reply));
    }

    #[test]
    fn test_direction_enforced() {
        let mut probe = SimulatedProbe::new(5);
        assert!(matches!(probe.send(&[0]), Err(TransportError::NotConnected)));
        probe.open().unwrap();
        assert!(matches!(
            probe.send(&build_discover_address()),
            Err(TransportError::DirectionError(_))
        ));
    }
}
