//! Parent/child process supervision.
//!
//! The supervisor exists so that one long-lived parent process holds the
//! daemon's lifetime (as service managers expect) while the actual capture
//! runs in a forked child. The parent only waits for signals: halt
//! forwards TERM to the child, a hangup forwards HUP (the child drains and
//! exits on its own), re-reads configuration and forks a replacement.
//! A child that exits outside a reload is a bug being surfaced, not
//! something to restart over.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use thiserror::Error;

use crate::config::{Config, ConfigError};
use crate::logger::Logger;
use crate::signals;

/// How long the supervisor sleeps between signal-flag polls.
const SUPERVISE_POLL: Duration = Duration::from_micros(100);

/// Errors that stop the supervisor.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("fork failed: {0}")]
    Fork(io::Error),

    #[error("cannot read pidfile {path}: {reason}")]
    Pid { path: PathBuf, reason: String },

    #[error("cannot signal capture process {pid}: {source}")]
    Kill { pid: i32, source: io::Error },

    #[error("cannot re-read configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("capture child terminated unexpectedly")]
    ChildDied,
}

/// Which side of a fork we are on.
enum Forked {
    Child,
    Parent,
}

fn fork_process() -> Result<Forked, SupervisorError> {
    match unsafe { libc::fork() } {
        -1 => Err(SupervisorError::Fork(io::Error::last_os_error())),
        0 => Ok(Forked::Child),
        _ => Ok(Forked::Parent),
    }
}

/// Read the capture child's PID from the configured pidfile.
fn read_running_pid(path: &Path) -> Result<i32, SupervisorError> {
    let text = fs::read_to_string(path).map_err(|e| SupervisorError::Pid {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    text.trim()
        .parse::<i32>()
        .map_err(|e| SupervisorError::Pid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

fn signal_pid(pid: i32, signal: libc::c_int) -> Result<(), SupervisorError> {
    if unsafe { libc::kill(pid, signal) } != 0 {
        return Err(SupervisorError::Kill {
            pid,
            source: io::Error::last_os_error(),
        });
    }
    Ok(())
}

/// Supervise capture children until halt.
///
/// `run_child` is invoked inside each forked child and must not return to
/// the supervisor loop; its result becomes the child's exit status.
pub fn run<F>(
    config_path: &Path,
    mut config: Config,
    logger: &dyn Logger,
    run_child: F,
) -> Result<(), SupervisorError>
where
    F: Fn(&Config) -> i32,
{
    if let Forked::Child = fork_process()? {
        std::process::exit(run_child(&config));
    }

    let mut restart_triggered = false;
    loop {
        if signals::halt_signalled() {
            break;
        }

        if signals::take_reload() {
            // Forward the hangup; the running child drains its current
            // interval and exits on its own.
            let pid = match read_running_pid(&config.pid_file) {
                Ok(pid) => pid,
                Err(e) => {
                    logger.error(&format!("{}", e));
                    return Err(e);
                }
            };
            restart_triggered = true;
            if let Err(e) = signal_pid(pid, libc::SIGHUP) {
                logger.error(&format!(
                    "failed to send HUP to running capture process: {}",
                    e
                ));
                return Err(e);
            }

            // Re-read configuration ourselves, in case the pidfile
            // location changed, then start the replacement child.
            config = Config::load(config_path)?;
            if let Forked::Child = fork_process()? {
                std::process::exit(run_child(&config));
            }
        }

        while signals::consume_child_exit() {
            if !restart_triggered {
                logger.error("capture child process terminated unexpectedly");
                return Err(SupervisorError::ChildDied);
            }
            restart_triggered = false;
        }

        thread::sleep(SUPERVISE_POLL);
    }

    // Halting: pass the TERM along to the running child.
    match read_running_pid(&config.pid_file) {
        Ok(pid) => {
            if let Err(e) = signal_pid(pid, libc::SIGTERM) {
                logger.error(&format!(
                    "failed to send TERM to running capture process: {}",
                    e
                ));
            }
        }
        Err(e) => logger.error(&format!("{}", e)),
    }
    Ok(())
}
