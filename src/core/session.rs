//! Probe session
//!
//! A session owns one transport and talks to one probe on it. Every public
//! operation is a single blocking exchange:
//!
//! ```text
//! TX on -> send frame -> RX on -> settle -> one bounded read -> parse
//! ```
//!
//! Session state (address, last measurements) only changes after a reply
//! has passed every check.

use crate::core::protocol::{
    self, build_assign_address, build_discover_address, build_read_measurements, describe_frame,
    DeviceAddress, MeasurementSet, Payload, ProtocolError, RequestKind,
};
use crate::core::transport::{Direction, Transport, TransportError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Timing of one exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeTiming {
    /// Pause between releasing the bus and starting the read
    pub settle: Duration,
    /// Upper bound on the read
    pub read_timeout: Duration,
}

impl Default for ExchangeTiming {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(50),
            read_timeout: Duration::from_millis(1000),
        }
    }
}

/// Exchange counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Exchanges attempted (requests put on the bus)
    pub exchanges: u64,
    /// Exchanges that produced a valid reply
    pub successes: u64,
    /// Transport failures, including timeouts
    pub transport_errors: u64,
    /// Replies with a bad CRC
    pub checksum_errors: u64,
    /// Structurally bad replies
    pub malformed: u64,
    /// Replies that did not match the request
    pub unexpected: u64,
}

impl SessionStats {
    fn record<R>(&mut self, result: &Result<R, ProtocolError>) {
        self.exchanges += 1;
        match result {
            Ok(_) => self.successes += 1,
            Err(ProtocolError::Transport(_)) => self.transport_errors += 1,
            Err(ProtocolError::ChecksumMismatch { .. }) => self.checksum_errors += 1,
            Err(ProtocolError::Malformed(_)) => self.malformed += 1,
            Err(ProtocolError::Unexpected { .. }) => self.unexpected += 1,
            Err(_) => {}
        }
    }

    /// Failed exchanges
    pub fn failures(&self) -> u64 {
        self.exchanges - self.successes
    }
}

/// Session with one probe
pub struct ProbeSession<T: Transport> {
    transport: T,
    timing: ExchangeTiming,
    address: Option<DeviceAddress>,
    measurements: Option<MeasurementSet>,
    stats: SessionStats,
}

impl<T: Transport> ProbeSession<T> {
    /// Create a session; nothing touches the transport until [`Self::initialize`]
    pub fn new(transport: T, timing: ExchangeTiming) -> Self {
        Self {
            transport,
            timing,
            address: None,
            measurements: None,
            stats: SessionStats::default(),
        }
    }

    /// Start with a known probe address (e.g. from configuration)
    #[must_use]
    pub fn with_address(mut self, address: DeviceAddress) -> Self {
        self.use_address(address);
        self
    }

    /// Target a probe whose address is already known. Broadcast is ignored.
    pub fn use_address(&mut self, address: DeviceAddress) {
        if !address.is_broadcast() {
            self.address = Some(address);
        }
    }

    /// Open the transport. Sends no protocol bytes.
    pub fn initialize(&mut self) -> Result<(), TransportError> {
        self.transport.open()?;
        info!("Session ready on {}", self.transport.connection_info());
        Ok(())
    }

    /// Ask the probe on the bus for its address and adopt it
    pub fn discover_address(&mut self) -> Result<DeviceAddress, ProtocolError> {
        let kind = RequestKind::DiscoverAddress;
        let value = self.exchange(kind, &build_discover_address(), |payload| match payload {
            Payload::Discovered(value) => Some(value),
            _ => None,
        })?;

        let address = u8::try_from(value)
            .ok()
            .and_then(DeviceAddress::unicast)
            .ok_or_else(|| {
                warn!("Discovery reported address {:#x}, outside the unicast range", value);
                ProtocolError::InvalidAddress(value)
            })?;

        info!("Discovered probe at address {}", address);
        self.address = Some(address);
        Ok(address)
    }

    /// Give the probe on the bus a new address and adopt it
    pub fn assign_address(&mut self, new_address: u8) -> Result<(), ProtocolError> {
        let Some(address) = DeviceAddress::unicast(new_address) else {
            return Err(ProtocolError::InvalidAddress(u32::from(new_address)));
        };

        let kind = RequestKind::AssignAddress;
        let echoed = self.exchange(kind, &build_assign_address(new_address), |payload| match payload {
            Payload::Assigned(echoed) => Some(echoed),
            _ => None,
        })?;

        if echoed != new_address {
            warn!("Probe acknowledged address {} instead of {}", echoed, new_address);
            return Err(ProtocolError::AssignmentMismatch {
                requested: new_address,
                echoed,
            });
        }

        info!("Probe address set to {}", address);
        self.address = Some(address);
        Ok(())
    }

    /// Read the measurement block from the current probe
    pub fn read_measurements(&mut self) -> Result<MeasurementSet, ProtocolError> {
        let target = self.address.ok_or(ProtocolError::NoAddressAssigned)?;

        let kind = RequestKind::ReadMeasurements { target };
        let set = self.exchange(kind, &build_read_measurements(target), |payload| match payload {
            Payload::Measurements(set) => Some(set),
            _ => None,
        })?;

        self.measurements = Some(set);
        Ok(set)
    }

    /// Address of the probe this session talks to
    pub fn current_address(&self) -> Option<DeviceAddress> {
        self.address
    }

    /// Last successfully read measurements
    pub fn last_measurements(&self) -> Option<MeasurementSet> {
        self.measurements
    }

    /// Exchange counters
    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Exchange timing
    pub fn timing(&self) -> ExchangeTiming {
        self.timing
    }

    /// Underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Underlying transport, mutable
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Give the transport back
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Run one exchange and pull the payload `extract` accepts out of the reply.
    /// A valid reply carrying any other payload counts as unexpected.
    fn exchange<R>(
        &mut self,
        kind: RequestKind,
        frame: &[u8],
        extract: impl FnOnce(Payload) -> Option<R>,
    ) -> Result<R, ProtocolError> {
        let result = self.transact(&kind, frame).and_then(|(payload, leading)| {
            extract(payload).ok_or_else(|| {
                warn!("{} reply carried {:?}", kind.name(), payload);
                ProtocolError::Unexpected {
                    expected: kind.reply_address(),
                    found: leading,
                }
            })
        });
        self.stats.record(&result);
        result
    }

    /// Returns the payload and the leading address byte of the reply
    fn transact(&mut self, kind: &RequestKind, frame: &[u8]) -> Result<(Payload, u8), ProtocolError> {
        debug!("TX [{}] {}", kind.name(), describe_frame(frame));

        self.transport.set_direction(Direction::Transmit)?;
        let sent = self.transport.send(frame);
        // Release the bus even if the write failed
        let released = self.transport.set_direction(Direction::Receive);
        let written = sent?;
        released?;
        if written != frame.len() {
            return Err(TransportError::ShortWrite {
                written,
                expected: frame.len(),
            }
            .into());
        }

        if !self.timing.settle.is_zero() {
            std::thread::sleep(self.timing.settle);
        }

        let mut buf = vec![0u8; kind.expected_reply_len()];
        let n = self.transport.receive(&mut buf, self.timing.read_timeout)?;
        if n == 0 {
            debug!("RX [{}] nothing", kind.name());
            let millis = u64::try_from(self.timing.read_timeout.as_millis()).unwrap_or(u64::MAX);
            return Err(TransportError::Timeout(millis).into());
        }

        let reply = &buf[..n];
        debug!("RX [{}] {}", kind.name(), describe_frame(reply));

        let outcome = protocol::parse(kind, reply);
        if !outcome.is_valid() {
            warn!("Rejected {} reply {}: {:?}", kind.name(), hex::encode(reply), outcome);
        }
        outcome.into_result().map(|payload| (payload, reply[0]))
    }
}
