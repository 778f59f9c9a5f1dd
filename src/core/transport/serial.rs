//! Serial port transport implementation
//!
//! RS-485 adapters either switch direction on their own or expose the
//! transceiver's driver-enable pin through RTS.

use super::{Direction, Transport, TransportError, TransportStats};
use serde::{Deserialize, Serialize};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{Read, Write};
use std::time::{Duration, Instant};

/// Longest single blocking read on the port; bounds timeout overshoot
const READ_SLICE: Duration = Duration::from_millis(10);

/// Serial port parity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SerialParity {
    /// No parity
    #[default]
    None,
    /// Odd parity
    Odd,
    /// Even parity
    Even,
}

impl std::str::FromStr for SerialParity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "n" => Ok(Self::None),
            "odd" | "o" => Ok(Self::Odd),
            "even" | "e" => Ok(Self::Even),
            other => Err(format!("unknown parity '{}'", other)),
        }
    }
}

/// How the RS-485 driver-enable line is driven
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DirectionControl {
    /// Adapter switches direction itself
    #[default]
    Auto,
    /// RTS high while transmitting
    Rts,
    /// RTS low while transmitting
    RtsInverted,
}

impl DirectionControl {
    /// RTS level for a direction, `None` when the adapter handles it
    fn rts_level(self, direction: Direction) -> Option<bool> {
        let transmit = direction == Direction::Transmit;
        match self {
            Self::Auto => None,
            Self::Rts => Some(transmit),
            Self::RtsInverted => Some(!transmit),
        }
    }
}

/// Serial port configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Port name (e.g., COM3, /dev/ttyUSB0)
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits (5, 6, 7, 8)
    pub data_bits: u8,
    /// Stop bits (1, 2)
    pub stop_bits: u8,
    /// Parity
    pub parity: SerialParity,
    /// RS-485 direction control
    pub direction: DirectionControl,
}

impl SerialConfig {
    /// Create a new serial configuration with probe defaults (8N1)
    pub fn new(port: &str, baud_rate: u32) -> Self {
        Self {
            port: port.to_string(),
            baud_rate,
            data_bits: 8,
            stop_bits: 1,
            parity: SerialParity::None,
            direction: DirectionControl::Auto,
        }
    }

    /// Set parity
    #[must_use]
    pub fn parity(mut self, parity: SerialParity) -> Self {
        self.parity = parity;
        self
    }

    /// Set direction control
    #[must_use]
    pub fn direction(mut self, direction: DirectionControl) -> Self {
        self.direction = direction;
        self
    }

    /// Reject settings the port cannot be opened with
    pub fn validate(&self) -> Result<(), TransportError> {
        if self.port.is_empty() {
            return Err(TransportError::InvalidConfiguration("port name is empty".into()));
        }
        if self.baud_rate == 0 {
            return Err(TransportError::InvalidConfiguration("baud rate is zero".into()));
        }
        if !(5..=8).contains(&self.data_bits) {
            return Err(TransportError::InvalidConfiguration(format!(
                "data bits must be 5-8, got {}",
                self.data_bits
            )));
        }
        if !(1..=2).contains(&self.stop_bits) {
            return Err(TransportError::InvalidConfiguration(format!(
                "stop bits must be 1 or 2, got {}",
                self.stop_bits
            )));
        }
        Ok(())
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self::new("/dev/ttyUSB0", 9600)
    }
}

/// Serial port transport
pub struct SerialTransport {
    config: SerialConfig,
    port: Option<Box<dyn SerialPort>>,
    stats: TransportStats,
}

impl SerialTransport {
    /// Create a new serial transport; the port stays closed until [`Transport::open`]
    pub fn new(config: SerialConfig) -> Self {
        Self {
            config,
            port: None,
            stats: TransportStats::default(),
        }
    }

    /// Configuration in use
    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    fn port(&mut self) -> Result<&mut Box<dyn SerialPort>, TransportError> {
        self.port.as_mut().ok_or(TransportError::NotConnected)
    }
}

impl Transport for SerialTransport {
    fn open(&mut self) -> Result<(), TransportError> {
        self.config.validate()?;

        let data_bits = match self.config.data_bits {
            5 => DataBits::Five,
            6 => DataBits::Six,
            7 => DataBits::Seven,
            _ => DataBits::Eight,
        };

        let stop_bits = match self.config.stop_bits {
            2 => StopBits::Two,
            _ => StopBits::One,
        };

        let parity = match self.config.parity {
            SerialParity::Odd => Parity::Odd,
            SerialParity::Even => Parity::Even,
            SerialParity::None => Parity::None,
        };

        let port = serialport::new(&self.config.port, self.config.baud_rate)
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .parity(parity)
            .flow_control(FlowControl::None)
            .timeout(READ_SLICE)
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => {
                    TransportError::PortNotFound(self.config.port.clone())
                }
                serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
                    TransportError::PermissionDenied(self.config.port.clone())
                }
                serialport::ErrorKind::Io(std::io::ErrorKind::NotFound) => {
                    TransportError::PortNotFound(self.config.port.clone())
                }
                _ => TransportError::ConnectionFailed(e.to_string()),
            })?;

        tracing::debug!("Opened {}", self.connection_info());
        self.port = Some(port);
        self.stats = TransportStats::default();

        // Start out listening so the bus is released
        self.set_direction(Direction::Receive)
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn set_direction(&mut self, direction: Direction) -> Result<(), TransportError> {
        let Some(level) = self.config.direction.rts_level(direction) else {
            return Ok(());
        };
        self.port()?
            .write_request_to_send(level)
            .map_err(|e| TransportError::DirectionError(e.to_string()))
    }

    fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let port = self.port()?;
        port.write_all(data)?;
        // The driver must stay enabled until the last stop bit is out
        port.flush()?;

        self.stats.bytes_sent += data.len() as u64;
        self.stats.frames_sent += 1;
        Ok(data.len())
    }

    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError> {
        let deadline = Instant::now() + timeout;
        let port = self.port()?;
        let mut filled = 0;

        while filled < buf.len() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            port.set_timeout(remaining.min(READ_SLICE))
                .map_err(|e| TransportError::IoError(std::io::Error::other(e)))?;

            match port.read(&mut buf[filled..]) {
                Ok(n) => filled += n,
                Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => {}
                Err(e) => return Err(TransportError::IoError(e)),
            }
        }

        if filled == 0 {
            self.stats.timeouts += 1;
        } else {
            self.stats.reads += 1;
            self.stats.bytes_received += filled as u64;
        }
        Ok(filled)
    }

    fn connection_info(&self) -> String {
        format!(
            "{} @ {} baud ({}{}{}, direction {:?})",
            self.config.port,
            self.config.baud_rate,
            self.config.data_bits,
            match self.config.parity {
                SerialParity::None => "N",
                SerialParity::Odd => "O",
                SerialParity::Even => "E",
            },
            self.config.stop_bits,
            self.config.direction,
        )
    }

    fn stats(&self) -> TransportStats {
        self.stats
    }
}

/// List available serial ports
pub fn list_ports() -> Result<Vec<serialport::SerialPortInfo>, TransportError> {
    serialport::available_ports().map_err(|e| TransportError::IoError(e.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parity_from_str() {
        assert_eq!("N".parse::<SerialParity>(), Ok(SerialParity::None));
        assert_eq!("even".parse::<SerialParity>(), Ok(SerialParity::Even));
        assert!("mark".parse::<SerialParity>().is_err());
    }

    #[test]
    fn test_rts_levels() {
        assert_eq!(DirectionControl::Auto.rts_level(Direction::Transmit), None);
        assert_eq!(DirectionControl::Rts.rts_level(Direction::Transmit), Some(true));
        assert_eq!(DirectionControl::Rts.rts_level(Direction::Receive), Some(false));
        assert_eq!(DirectionControl::RtsInverted.rts_level(Direction::Transmit), Some(false));
    }

    #[test]
    fn test_validate() {
        assert!(SerialConfig::default().validate().is_ok());
        assert!(SerialConfig::new("", 9600).validate().is_err());
        assert!(SerialConfig::new("COM3", 0).validate().is_err());
        let mut config = SerialConfig::new("COM3", 9600);
        config.stop_bits = 3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_closed_port_errors() {
        let mut transport = SerialTransport::new(SerialConfig::default());
        assert!(!transport.is_open());
        assert!(matches!(transport.send(&[0x00]), Err(TransportError::NotConnected)));
        let mut buf = [0u8; 4];
        assert!(matches!(
            transport.receive(&mut buf, Duration::from_millis(1)),
            Err(TransportError::NotConnected)
        ));
    }

    #[test]
    fn test_connection_info() {
        let transport = SerialTransport::new(
            SerialConfig::new("COM3", 19200)
                .parity(SerialParity::Even)
                .direction(DirectionControl::Rts),
        );
        assert_eq!(transport.connection_info(), "COM3 @ 19200 baud (8E1, direction Rts)");
    }
}
