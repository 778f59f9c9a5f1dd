//! SYWA probe CLI - Command-line interface
//!
//! Discovers, addresses and polls a SYWA level probe on an RS-485 bus.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use sywa_probe::cli::{
    csv_header, format_address, format_outcome, format_reading, format_stats, print_exit_codes,
    CliResult, OutputFormat, Reading,
};
use sywa_probe::config::{LogFormat, LoggingConfig};
use sywa_probe::core::protocol::{self, DeviceAddress, MeasurementSet, RequestKind, ResponseOutcome};
use sywa_probe::core::transport::list_ports;
use sywa_probe::{ProbeConfig, ProbeSession, SerialTransport, SimulatedProbe, Transport};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// SYWA probe CLI
#[derive(Parser, Debug)]
#[command(
    name = "sywa-cli",
    version,
    about = "Modbus RTU tool for SYWA magnetostrictive level probes",
    long_about = None
)]
struct Cli {
    /// Config file (defaults to the per-user probe.toml)
    #[arg(short, long, global = true, env = "SYWA_CONFIG")]
    config: Option<PathBuf>,

    /// Serial port, overrides the config file
    #[arg(short, long, global = true)]
    port: Option<String>,

    /// Baud rate, overrides the config file
    #[arg(short, long, global = true)]
    baud: Option<u32>,

    /// Talk to a simulated probe at this address instead of a serial port
    #[arg(long, global = true, value_name = "ADDRESS")]
    simulate: Option<u8>,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Verbose output (frame dumps)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List available serial ports
    ListPorts,

    /// Ask the probe on the bus for its address
    Discover,

    /// Give the probe on the bus a new address
    Assign {
        /// New address (1-255)
        address: u8,
    },

    /// Read the measurement block once
    Read {
        /// Probe address; discovered when neither this nor the config has one
        #[arg(short, long)]
        address: Option<u8>,
    },

    /// Read repeatedly until Ctrl+C
    Poll {
        /// Probe address; discovered when neither this nor the config has one
        #[arg(short, long)]
        address: Option<u8>,

        /// Delay between reads
        #[arg(short, long, default_value = "1000")]
        interval_ms: u64,

        /// Stop after this many reads
        #[arg(short = 'n', long)]
        count: Option<u64>,
    },

    /// Compute the Modbus CRC of hex bytes
    Crc {
        /// Bytes as hex, spaces allowed (e.g. "01 03 00 00 00 02")
        hex: String,
    },

    /// Parse a captured reply frame
    Decode {
        /// Request that produced the reply
        #[arg(short, long, value_enum)]
        kind: KindArg,

        /// Probe address for read replies
        #[arg(short, long)]
        address: Option<u8>,

        /// Reply bytes as hex, spaces allowed
        hex: String,
    },

    /// Print the exit code table
    ExitCodes,
}

/// Request kind for `decode`
#[derive(Debug, Clone, Copy, ValueEnum)]
enum KindArg {
    /// Address discovery reply
    Discover,
    /// Address assignment reply
    Assign,
    /// Measurement read reply
    Read,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let loaded = load_config(&cli);
    let logging = loaded
        .as_ref()
        .map(|config| config.logging.clone())
        .unwrap_or_default();
    init_logging(&cli, &logging);

    let result = match loaded.and_then(|config| run(&cli, config)) {
        Ok(result) => result,
        Err(err) => CliResult::from_error(&err),
    };

    if let Some(msg) = result.message() {
        if result.is_success() {
            if !cli.quiet {
                println!("{}", msg);
            }
        } else {
            eprintln!("Error: {}", msg);
        }
    }
    result.to_exit_code()
}

fn load_config(cli: &Cli) -> anyhow::Result<ProbeConfig> {
    let mut config = match &cli.config {
        Some(path) => ProbeConfig::load_from(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ProbeConfig::load()?,
    };

    if let Some(port) = &cli.port {
        config.serial.port.clone_from(port);
    }
    if let Some(baud) = cli.baud {
        config.serial.baud_rate = baud;
    }
    Ok(config)
}

fn init_logging(cli: &Cli, logging: &LoggingConfig) {
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else if cli.quiet {
        EnvFilter::new("error")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level))
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    match logging.format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn run(cli: &Cli, config: ProbeConfig) -> anyhow::Result<CliResult> {
    match &cli.command {
        Commands::ListPorts => show_ports(cli),
        Commands::Discover => {
            let mut session = open_session(cli, &config)?;
            let address = session.discover_address()?;
            println!("{}", format_address("discover", address, cli.format));
            Ok(CliResult::success())
        }
        Commands::Assign { address } => {
            let mut session = open_session(cli, &config)?;
            session.assign_address(*address)?;
            let Some(assigned) = session.current_address() else {
                return Ok(CliResult::error(
                    sywa_probe::ExitCodes::INTERNAL_ERROR,
                    "address not recorded after assignment",
                ));
            };
            println!("{}", format_address("assign", assigned, cli.format));
            Ok(CliResult::success())
        }
        Commands::Read { address } => {
            let mut session = open_session(cli, &config)?;
            let target = resolve_address(&mut session, *address)?;
            let set = session.read_measurements()?;
            if cli.format == OutputFormat::Csv {
                println!("{}", csv_header());
            }
            println!("{}", format_reading(&Reading::now(target, set), cli.format));
            Ok(CliResult::success())
        }
        Commands::Poll {
            address,
            interval_ms,
            count,
        } => poll(cli, &config, *address, Duration::from_millis(*interval_ms), *count),
        Commands::Crc { hex: input } => {
            let Some(data) = parse_hex(input) else {
                return Ok(CliResult::invalid_args(format!("not a hex string: {}", input)));
            };
            let crc = protocol::checksum(&data);
            let mut frame = data;
            protocol::checksum::append(&mut frame);
            match cli.format {
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::json!({ "crc": format!("{:04X}", crc), "frame": hex::encode(&frame) })
                ),
                OutputFormat::Csv => println!("crc,frame\n{:04X},{}", crc, hex::encode(&frame)),
                OutputFormat::Text => {
                    println!("CRC:   0x{:04X}", crc);
                    println!("Frame: {}", protocol::describe_frame(&frame));
                }
            }
            Ok(CliResult::success())
        }
        Commands::Decode { kind, address, hex: input } => decode(cli, *kind, *address, input),
        Commands::ExitCodes => {
            print_exit_codes();
            Ok(CliResult::success())
        }
    }
}

fn show_ports(cli: &Cli) -> anyhow::Result<CliResult> {
    let ports = list_ports()?;

    if ports.is_empty() {
        return Ok(CliResult::success_with_message("No serial ports found."));
    }

    match cli.format {
        OutputFormat::Json => {
            let json: Vec<serde_json::Value> = ports
                .iter()
                .map(|p| {
                    serde_json::json!({
                        "name": p.port_name,
                        "type": format!("{:?}", p.port_type)
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Csv => {
            println!("name,type");
            for port in &ports {
                println!("{},{:?}", port.port_name, port.port_type);
            }
        }
        OutputFormat::Text => {
            for port in &ports {
                println!("{}", port.port_name);
            }
        }
    }
    Ok(CliResult::success())
}

fn open_session(cli: &Cli, config: &ProbeConfig) -> anyhow::Result<ProbeSession<Box<dyn Transport>>> {
    let transport: Box<dyn Transport> = match cli.simulate {
        Some(address) => Box::new(SimulatedProbe::new(address).with_measurements(demo_measurements())),
        None => Box::new(SerialTransport::new(config.serial.clone())),
    };

    let mut session = ProbeSession::new(transport, config.timing());
    if let Some(address) = config.probe_address() {
        session = session.with_address(address);
    }
    session.initialize().context("opening probe bus")?;
    Ok(session)
}

fn resolve_address(
    session: &mut ProbeSession<Box<dyn Transport>>,
    requested: Option<u8>,
) -> anyhow::Result<DeviceAddress> {
    if let Some(value) = requested {
        let address = DeviceAddress::unicast(value)
            .ok_or(protocol::ProtocolError::InvalidAddress(u32::from(value)))?;
        session.use_address(address);
        return Ok(address);
    }
    if let Some(address) = session.current_address() {
        return Ok(address);
    }
    info!("No probe address configured, discovering");
    Ok(session.discover_address()?)
}

fn poll(
    cli: &Cli,
    config: &ProbeConfig,
    address: Option<u8>,
    interval: Duration,
    count: Option<u64>,
) -> anyhow::Result<CliResult> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let mut session = open_session(cli, config)?;
    let target = resolve_address(&mut session, address)?;

    if cli.format == OutputFormat::Csv {
        println!("{}", csv_header());
    }

    let mut reads = 0u64;
    while running.load(Ordering::SeqCst) && count.map_or(true, |n| reads < n) {
        let started = Instant::now();
        match session.read_measurements() {
            Ok(set) => println!("{}", format_reading(&Reading::now(target, set), cli.format)),
            Err(e) => warn!("Read from probe {} failed: {}", target, e),
        }
        reads += 1;

        if count.is_some_and(|n| reads >= n) {
            break;
        }
        while running.load(Ordering::SeqCst) && started.elapsed() < interval {
            std::thread::sleep(Duration::from_millis(20).min(interval));
        }
    }

    let stats = session.stats();
    info!("{}", format_stats(&stats, OutputFormat::Text));
    if stats.successes == 0 && stats.exchanges > 0 {
        return Ok(CliResult::error(
            sywa_probe::ExitCodes::TIMEOUT,
            format!("no valid reply in {} reads", stats.exchanges),
        ));
    }
    Ok(CliResult::success())
}

fn decode(cli: &Cli, kind: KindArg, address: Option<u8>, input: &str) -> anyhow::Result<CliResult> {
    let Some(data) = parse_hex(input) else {
        return Ok(CliResult::invalid_args(format!("not a hex string: {}", input)));
    };

    let kind = match kind {
        KindArg::Discover => RequestKind::DiscoverAddress,
        KindArg::Assign => RequestKind::AssignAddress,
        KindArg::Read => {
            let Some(target) = address.and_then(DeviceAddress::unicast) else {
                return Ok(CliResult::invalid_args("read replies need --address 1..=255"));
            };
            RequestKind::ReadMeasurements { target }
        }
    };

    let outcome = protocol::parse(&kind, &data);
    match &outcome {
        ResponseOutcome::Valid(protocol::Payload::Measurements(set))
            if cli.format == OutputFormat::Csv =>
        {
            println!("{}", csv_header());
            if let Some(target) = address.and_then(DeviceAddress::unicast) {
                println!("{}", format_reading(&Reading::now(target, *set), cli.format));
            }
        }
        // Rejections reach stderr through the exit code path
        ResponseOutcome::Valid(_) => println!("{}", format_outcome(&kind, &outcome, cli.format)),
        _ if cli.format == OutputFormat::Json => {
            println!("{}", format_outcome(&kind, &outcome, cli.format));
        }
        _ => {}
    }

    match outcome.into_result() {
        Ok(_) => Ok(CliResult::success()),
        Err(e) => Ok(CliResult::from(&e)),
    }
}

fn parse_hex(input: &str) -> Option<Vec<u8>> {
    let cleaned: String = input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':' && *c != ',')
        .collect();
    let cleaned = cleaned.trim_start_matches("0x");
    hex::decode(cleaned).ok()
}

fn demo_measurements() -> MeasurementSet {
    MeasurementSet::new([1520.5, 12.25, 18.5, 18.0, 18.25, 18.5, 18.75, 19.0])
}
