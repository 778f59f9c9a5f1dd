//! Config file round trips

use sywa_probe::config::{LogFormat, ProbeConfig};
use sywa_probe::{ConfigError, DirectionControl, SerialParity};

#[test]
fn save_and_load_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("probe.toml");

    let mut config = ProbeConfig::default();
    config.serial.port = "/dev/ttyRS485".to_string();
    config.serial.baud_rate = 19200;
    config.serial.parity = SerialParity::Even;
    config.serial.direction = DirectionControl::Rts;
    config.timing.settle_ms = 5;
    config.probe.address = Some(33);
    config.logging.format = LogFormat::Json;

    config.save_to(&path).unwrap();
    let loaded = ProbeConfig::load_from(&path).unwrap();
    assert_eq!(loaded, config);
    assert_eq!(loaded.probe_address().map(|a| a.value()), Some(33));
}

#[test]
fn minimal_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("probe.toml");
    std::fs::write(&path, "[timing]\nread_timeout_ms = 300\n").unwrap();

    let loaded = ProbeConfig::load_from(&path).unwrap();
    assert_eq!(loaded.timing.read_timeout_ms, 300);
    assert_eq!(loaded.timing.settle_ms, ProbeConfig::default().timing.settle_ms);
    assert_eq!(loaded.serial, ProbeConfig::default().serial);
}

#[test]
fn load_errors_are_typed() {
    let dir = tempfile::tempdir().unwrap();

    let missing = dir.path().join("absent.toml");
    assert!(matches!(ProbeConfig::load_from(&missing), Err(ConfigError::Io(_))));

    let garbage = dir.path().join("garbage.toml");
    std::fs::write(&garbage, "[serial\nport = 3").unwrap();
    assert!(matches!(ProbeConfig::load_from(&garbage), Err(ConfigError::Parse(_))));

    let invalid = dir.path().join("invalid.toml");
    std::fs::write(&invalid, "[probe]\naddress = 0\n").unwrap();
    assert!(matches!(ProbeConfig::load_from(&invalid), Err(ConfigError::Invalid(_))));
}
