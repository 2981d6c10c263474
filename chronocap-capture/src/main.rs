//! chronocap daemon binary.
//!
//! Entry point: parses the command line, installs signal handlers before
//! any thread exists, loads the configuration and hands control to the
//! supervisor, which forks the capture child.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use chronocap_capture::cli::Cli;
use chronocap_capture::config::Config;
use chronocap_capture::engine::run_capture;
use chronocap_capture::exit::{capture_exit_code, codes, supervisor_exit_code};
use chronocap_capture::logger::{build_logger, LogMode, Logger};
use chronocap_capture::source::open_source;
use chronocap_capture::{signals, supervisor};

fn main() -> ExitCode {
    // Usage and argument errors both leave with a non-zero status.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(codes::INVALID_ARGS as u8);
        }
    };

    let log_mode = match cli.log_mode() {
        Ok(mode) => mode,
        Err(e) => {
            eprintln!("chronocap: {}", e);
            return ExitCode::from(codes::INVALID_ARGS as u8);
        }
    };

    // Handlers go in after basic init but before any thread or fork, so
    // every signal lands on this thread's flags.
    if let Err(e) = signals::install_handlers() {
        eprintln!("chronocap: failed to install signal handlers: {}", e);
        return ExitCode::from(codes::SUPERVISOR_ERROR as u8);
    }

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("chronocap: {}", e);
            return ExitCode::from(codes::CONFIG_ERROR as u8);
        }
    };

    let logger = match build_logger(log_mode, config.log_file.as_deref()) {
        Ok(logger) => logger,
        Err(e) => {
            eprintln!("chronocap: {}", e);
            return ExitCode::from(codes::LOG_ERROR as u8);
        }
    };

    let child = move |config: &Config| run_child(log_mode, config);
    match supervisor::run(&cli.config, config, &*logger, child) {
        Ok(()) => ExitCode::from(codes::SUCCESS as u8),
        Err(e) => {
            logger.error(&format!("{}", e));
            ExitCode::from(supervisor_exit_code(&e) as u8)
        }
    }
}

/// Body of the forked capture child; the return value is its exit status.
fn run_child(log_mode: LogMode, config: &Config) -> i32 {
    // Build a fresh logger from the (possibly re-read) configuration.
    let logger: Arc<dyn Logger> = match build_logger(log_mode, config.log_file.as_deref()) {
        Ok(logger) => logger,
        Err(e) => {
            eprintln!("chronocap: {}", e);
            return codes::LOG_ERROR;
        }
    };

    let source = match open_source(&config.input_uri) {
        Ok(source) => source,
        Err(e) => {
            logger.error(&format!(
                "failed to start capture source {}: {}",
                config.input_uri, e
            ));
            return codes::CAPTURE_ERROR;
        }
    };

    match run_capture(config, source, logger.clone()) {
        Ok(()) => codes::SUCCESS,
        Err(e) => {
            logger.error(&format!("{}", e));
            capture_exit_code(&e)
        }
    }
}
