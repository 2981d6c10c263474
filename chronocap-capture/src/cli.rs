//! CLI argument parsing for chronocap.
//!
//! The daemon takes a configuration file (required) and a log mode; all
//! capture behaviour lives in the configuration file so that a reload can
//! change it without touching the command line.

use std::path::PathBuf;

use clap::Parser;
use thiserror::Error;

use crate::logger::LogMode;

/// Default log mode when `-l` is not given.
pub const DEFAULT_LOG_MODE: &str = "terminal";

/// Errors from CLI argument validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CliError {
    #[error("unexpected log mode: {0} (accepted: terminal, file, syslog, disabled)")]
    InvalidLogMode(String),
}

/// Chronologically ordered parallel packet capture daemon.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "chronocap")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: PathBuf,

    /// Where log output goes: terminal, file, syslog or disabled.
    #[arg(short = 'l', long = "log", default_value = DEFAULT_LOG_MODE)]
    pub log: String,
}

impl Cli {
    /// Resolve the `-l` string into a log mode, accepting the documented
    /// aliases.
    pub fn log_mode(&self) -> Result<LogMode, CliError> {
        match self.log.as_str() {
            "terminal" | "stderr" => Ok(LogMode::Terminal),
            "file" => Ok(LogMode::File),
            "syslog" => Ok(LogMode::Syslog),
            "disabled" | "off" | "none" => Ok(LogMode::Disabled),
            other => Err(CliError::InvalidLogMode(other.to_string())),
        }
    }
}

/// Parse CLI arguments from an iterator of strings.
/// Useful for testing.
pub fn parse_from<I, T>(iter: I) -> Result<Cli, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    Cli::try_parse_from(iter)
}
