//! Logging for the capture daemon.
//!
//! Provides a trait-based logging system so the capture and merge paths can
//! be tested deterministically, plus the concrete sinks selected by the
//! `-l` command-line flag: terminal (stderr), file, syslog or disabled.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use syslog::{Facility, Formatter3164};
use thiserror::Error;

/// Severity of a log message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Error => write!(f, "error"),
            Level::Warning => write!(f, "warning"),
            Level::Info => write!(f, "info"),
        }
    }
}

/// Log sink selected by the `-l` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogMode {
    /// Log to stderr.
    Terminal,
    /// Log to the file named in the configuration.
    File,
    /// Log to the local syslog daemon.
    Syslog,
    /// Discard all log output.
    Disabled,
}

/// Errors from constructing a logger.
#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("cannot open log file {path}: {source}")]
    OpenFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot connect to syslog: {0}")]
    Syslog(String),
}

/// Trait for logging output.
///
/// Implementations must be thread-safe; the workers, the merging thread and
/// the main thread all log concurrently.
pub trait Logger: Send + Sync {
    /// Log a message at the given severity.
    fn log(&self, level: Level, message: &str);

    /// Log an error.
    fn error(&self, message: &str) {
        self.log(Level::Error, message);
    }

    /// Log a warning.
    fn warning(&self, message: &str) {
        self.log(Level::Warning, message);
    }

    /// Log an informational message.
    fn info(&self, message: &str) {
        self.log(Level::Info, message);
    }
}

/// Logger that writes to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrLogger;

impl StderrLogger {
    pub fn new() -> Self {
        Self
    }
}

impl Logger for StderrLogger {
    fn log(&self, level: Level, message: &str) {
        let _ = writeln!(std::io::stderr(), "chronocap: {}: {}", level, message);
    }
}

/// Logger that appends timestamped lines to a file.
#[derive(Debug)]
pub struct FileLogger {
    file: Mutex<File>,
}

impl FileLogger {
    /// Open (or create) the log file in append mode.
    pub fn create(path: &Path) -> Result<Self, LoggerError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| LoggerError::OpenFile {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl Logger for FileLogger {
    fn log(&self, level: Level, message: &str) {
        let stamp = Utc::now().format("%Y-%m-%d %H:%M:%S");
        if let Ok(mut file) = self.file.lock() {
            // A failing log write has nowhere better to be reported.
            let _ = writeln!(file, "{} chronocap: {}: {}", stamp, level, message);
        }
    }
}

/// Logger that forwards to the local syslog daemon.
pub struct SyslogLogger {
    inner: Mutex<syslog::Logger<syslog::LoggerBackend, Formatter3164>>,
}

impl SyslogLogger {
    /// Connect to the local syslog socket with the daemon facility.
    pub fn connect() -> Result<Self, LoggerError> {
        let formatter = Formatter3164 {
            facility: Facility::LOG_DAEMON,
            hostname: None,
            process: "chronocap".to_string(),
            pid: std::process::id(),
        };
        let inner = syslog::unix(formatter)
            .map_err(|e| LoggerError::Syslog(e.to_string()))?;
        Ok(Self {
            inner: Mutex::new(inner),
        })
    }
}

impl Logger for SyslogLogger {
    fn log(&self, level: Level, message: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            let _ = match level {
                Level::Error => inner.err(message),
                Level::Warning => inner.warning(message),
                Level::Info => inner.info(message),
            };
        }
    }
}

/// A no-op logger that discards all messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLogger;

impl NullLogger {
    pub fn new() -> Self {
        Self
    }
}

impl Logger for NullLogger {
    fn log(&self, _level: Level, _message: &str) {
        // Discard
    }
}

/// Mock logger for testing that captures all messages.
#[derive(Debug, Clone, Default)]
pub struct MockLogger {
    messages: Arc<RwLock<Vec<LogEntry>>>,
}

/// A captured log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub level: Level,
    pub message: String,
}

impl MockLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all captured log entries.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.messages.read().unwrap().clone()
    }

    /// Get all captured messages (just the text).
    pub fn messages(&self) -> Vec<String> {
        self.entries().iter().map(|e| e.message.clone()).collect()
    }

    /// Get messages at a specific severity.
    pub fn messages_at_level(&self, level: Level) -> Vec<String> {
        self.entries()
            .iter()
            .filter(|e| e.level == level)
            .map(|e| e.message.clone())
            .collect()
    }

    /// Check if any message contains the given substring.
    pub fn contains(&self, substring: &str) -> bool {
        self.messages().iter().any(|m| m.contains(substring))
    }

    /// Get count of captured messages.
    pub fn count(&self) -> usize {
        self.messages.read().unwrap().len()
    }
}

impl Logger for MockLogger {
    fn log(&self, level: Level, message: &str) {
        self.messages.write().unwrap().push(LogEntry {
            level,
            message: message.to_string(),
        });
    }
}

/// Build the logger selected by the log mode. `log_file` names the file for
/// [`LogMode::File`]; when absent a file in the working directory is used.
pub fn build_logger(
    mode: LogMode,
    log_file: Option<&Path>,
) -> Result<Arc<dyn Logger>, LoggerError> {
    match mode {
        LogMode::Terminal => Ok(Arc::new(StderrLogger::new())),
        LogMode::File => {
            let default = Path::new("chronocap.log");
            let path = log_file.unwrap_or(default);
            Ok(Arc::new(FileLogger::create(path)?))
        }
        LogMode::Syslog => Ok(Arc::new(SyslogLogger::connect()?)),
        LogMode::Disabled => Ok(Arc::new(NullLogger::new())),
    }
}
