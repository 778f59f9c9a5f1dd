//! Output formatting for probe readings

use crate::core::protocol::{
    DeviceAddress, Measurement, MeasurementSet, Payload, RequestKind, ResponseOutcome,
};
use crate::core::session::SessionStats;
use chrono::{DateTime, Local};

/// Output format for CLI results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Aligned, human readable
    #[default]
    Text,
    /// One JSON object per line
    Json,
    /// Comma separated, header printed once
    Csv,
}

/// A timestamped measurement block from one probe
#[derive(Debug, Clone, Copy)]
pub struct Reading {
    /// When the reply was accepted
    pub timestamp: DateTime<Local>,
    /// Probe address
    pub address: DeviceAddress,
    /// Values
    pub measurements: MeasurementSet,
}

impl Reading {
    /// Stamp a measurement set with the current time
    pub fn now(address: DeviceAddress, measurements: MeasurementSet) -> Self {
        Self {
            timestamp: Local::now(),
            address,
            measurements,
        }
    }
}

/// CSV header matching [`format_reading`] rows
pub fn csv_header() -> String {
    let mut columns = vec!["timestamp", "address"];
    columns.extend(Measurement::ALL.iter().map(|m| m.key()));
    columns.join(",")
}

/// Format one reading
pub fn format_reading(reading: &Reading, format: OutputFormat) -> String {
    let timestamp = reading.timestamp.to_rfc3339();
    match format {
        OutputFormat::Text => {
            let mut out = format!("{}  probe {}\n", timestamp, reading.address);
            for (measurement, value) in reading.measurements.iter() {
                out.push_str(&format!("  {:<26} {:>12.3}\n", measurement.to_string(), value));
            }
            out.pop();
            out
        }
        OutputFormat::Json => {
            let mut values = serde_json::Map::new();
            for (measurement, value) in reading.measurements.iter() {
                values.insert(measurement.key().to_string(), serde_json::json!(value));
            }
            serde_json::json!({
                "timestamp": timestamp,
                "address": reading.address.value(),
                "measurements": values,
            })
            .to_string()
        }
        OutputFormat::Csv => {
            let mut fields = vec![timestamp, reading.address.value().to_string()];
            fields.extend(reading.measurements.iter().map(|(_, value)| value.to_string()));
            fields.join(",")
        }
    }
}

/// Format an address result (discover / assign)
pub fn format_address(action: &str, address: DeviceAddress, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => format!("{}: probe address {}", action, address),
        OutputFormat::Json => serde_json::json!({
            "action": action,
            "address": address.value(),
        })
        .to_string(),
        OutputFormat::Csv => format!("action,address\n{},{}", action, address.value()),
    }
}

/// Format the outcome of parsing a captured reply. CSV output of a
/// measurement block goes through [`format_reading`] instead.
pub fn format_outcome(kind: &RequestKind, outcome: &ResponseOutcome, format: OutputFormat) -> String {
    if format == OutputFormat::Json {
        return serde_json::json!({
            "request": kind.name(),
            "valid": outcome.is_valid(),
            "outcome": outcome,
        })
        .to_string();
    }

    match outcome {
        ResponseOutcome::Valid(Payload::Discovered(value)) => {
            format!("{} reply: address {:#x}", kind.name(), value)
        }
        ResponseOutcome::Valid(Payload::Assigned(address)) => {
            format!("{} reply: address {}", kind.name(), address)
        }
        ResponseOutcome::Valid(Payload::Measurements(set)) => {
            let mut out = format!("{} reply:", kind.name());
            for (measurement, value) in set.iter() {
                out.push_str(&format!("\n  {:<26} {:>12.3}", measurement.to_string(), value));
            }
            out
        }
        rejected => format!("{} reply rejected: {:?}", kind.name(), rejected),
    }
}

/// Format session counters
pub fn format_stats(stats: &SessionStats, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => format!(
            "{} exchanges, {} ok, {} timeouts/transport, {} crc, {} malformed, {} unexpected",
            stats.exchanges,
            stats.successes,
            stats.transport_errors,
            stats.checksum_errors,
            stats.malformed,
            stats.unexpected
        ),
        OutputFormat::Json => serde_json::json!({
            "exchanges": stats.exchanges,
            "successes": stats.successes,
            "transport_errors": stats.transport_errors,
            "checksum_errors": stats.checksum_errors,
            "malformed": stats.malformed,
            "unexpected": stats.unexpected,
        })
        .to_string(),
        OutputFormat::Csv => format!(
            "exchanges,successes,transport_errors,checksum_errors,malformed,unexpected\n{},{},{},{},{},{}",
            stats.exchanges,
            stats.successes,
            stats.transport_errors,
            stats.checksum_errors,
            stats.malformed,
            stats.unexpected
        ),
    }
}
