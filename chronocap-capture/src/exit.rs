//! Exit codes for the chronocap daemon.
//!
//! Following Unix conventions for exit codes.

use crate::engine::CaptureError;
use crate::supervisor::SupervisorError;

/// Exit code constants.
pub mod codes {
    /// Successful execution.
    pub const SUCCESS: i32 = 0;
    /// Invalid command-line arguments.
    pub const INVALID_ARGS: i32 = 1;
    /// Configuration file missing or invalid.
    pub const CONFIG_ERROR: i32 = 2;
    /// Logging could not be set up.
    pub const LOG_ERROR: i32 = 3;
    /// Capture run failed.
    pub const CAPTURE_ERROR: i32 = 4;
    /// Supervision failed (pidfile, fork or signalling trouble).
    pub const SUPERVISOR_ERROR: i32 = 5;
}

/// Map a capture-run error to the child's exit code.
pub fn capture_exit_code(_error: &CaptureError) -> i32 {
    codes::CAPTURE_ERROR
}

/// Map a supervisor error to the parent's exit code.
pub fn supervisor_exit_code(error: &SupervisorError) -> i32 {
    match error {
        SupervisorError::Config(_) => codes::CONFIG_ERROR,
        _ => codes::SUPERVISOR_ERROR,
    }
}
