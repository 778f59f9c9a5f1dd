//! CLI Module
//!
//! Provides command-line interface support:
//! - Exit codes for automation
//! - Text, JSON and CSV output of probe readings

pub mod exit_codes;
pub mod output;

pub use exit_codes::{exit_code_description, print_exit_codes, CliResult, ExitCodes};
pub use output::{
    csv_header, format_address, format_outcome, format_reading, format_stats, OutputFormat, Reading,
};
