//! Daemon configuration.
//!
//! The configuration file is YAML. Only `input_uri` and `output_template`
//! are required; everything else has defaults suitable for a telescope
//! deployment. A reload (SIGHUP to the supervisor) re-reads this file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Default rotation interval in seconds (five minutes).
pub const DEFAULT_INTERVAL_SEC: u32 = 300;

/// Default number of capture worker threads.
pub const DEFAULT_THREADS: usize = 2;

/// Default PID file location.
pub const DEFAULT_PID_FILE: &str = "/var/run/chronocap.pid";

/// Default trace file format.
pub const DEFAULT_FILE_FORMAT: &str = "pcapfile";

/// Errors from loading or validating the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("interval must be at least 1 second")]
    InvalidInterval,

    #[error("threads must be at least 1")]
    InvalidThreads,

    #[error("input_uri must not be empty")]
    EmptyInput,

    #[error("output_template must not be empty")]
    EmptyTemplate,
}

fn default_interval() -> u32 {
    DEFAULT_INTERVAL_SEC
}

fn default_threads() -> usize {
    DEFAULT_THREADS
}

fn default_pid_file() -> PathBuf {
    PathBuf::from(DEFAULT_PID_FILE)
}

fn default_file_format() -> String {
    DEFAULT_FILE_FORMAT.to_string()
}

/// Daemon configuration, deserialised from the YAML file given with `-c`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Capture source URI, e.g. `pcapfile:/traces/telescope.pcap`.
    pub input_uri: String,

    /// Output filename template; supports strftime directives plus
    /// `%N` (monitor id), `%P` (program tag), `%f` (trace format
    /// extension) and `%s` (interval unix seconds).
    pub output_template: String,

    /// Rotation interval in seconds.
    #[serde(default = "default_interval")]
    pub interval: u32,

    /// Number of capture worker threads.
    #[serde(default = "default_threads")]
    pub threads: usize,

    /// Strip layer-2 VLAN tags before writing. Leave off unless tagged
    /// traffic is actually expected.
    #[serde(default)]
    pub strip_vlans: bool,

    /// Write a `.stats` sidecar per merged interval.
    #[serde(default)]
    pub write_stats: bool,

    /// Where the capture child records its PID for the supervisor.
    #[serde(default = "default_pid_file")]
    pub pid_file: PathBuf,

    /// Monitor name substituted for `%N` in the template.
    #[serde(default)]
    pub monitor_id: Option<String>,

    /// Trace file format for output URIs and the `%f` extension.
    #[serde(default = "default_file_format")]
    pub file_format: String,

    /// Log file used by the `file` log mode.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Config {
    /// Load and validate the configuration from a file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Parse and validate configuration from YAML text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate field values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.input_uri.is_empty() {
            return Err(ConfigError::EmptyInput);
        }
        if self.output_template.is_empty() {
            return Err(ConfigError::EmptyTemplate);
        }
        if self.interval == 0 {
            return Err(ConfigError::InvalidInterval);
        }
        if self.threads == 0 {
            return Err(ConfigError::InvalidThreads);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = "\
input_uri: pcapfile:/traces/input.pcap
output_template: /data/telescope-%s.%f
";

    // ===========================================
    // Parsing and defaults
    // ===========================================

    #[test]
    fn test_minimal_config_parses() {
        let config = Config::parse(MINIMAL).expect("parse");
        assert_eq!(config.input_uri, "pcapfile:/traces/input.pcap");
        assert_eq!(config.output_template, "/data/telescope-%s.%f");
    }

    #[test]
    fn test_defaults() {
        let config = Config::parse(MINIMAL).expect("parse");
        assert_eq!(config.interval, DEFAULT_INTERVAL_SEC);
        assert_eq!(config.threads, DEFAULT_THREADS);
        assert!(!config.strip_vlans);
        assert!(!config.write_stats);
        assert_eq!(config.pid_file, PathBuf::from(DEFAULT_PID_FILE));
        assert!(config.monitor_id.is_none());
        assert_eq!(config.file_format, DEFAULT_FILE_FORMAT);
        assert!(config.log_file.is_none());
    }

    #[test]
    fn test_full_config_parses() {
        let text = "\
input_uri: pcapfile:/traces/input.pcap
output_template: /data/%N-%P-%s.%f
interval: 60
threads: 4
strip_vlans: true
write_stats: true
pid_file: /tmp/chronocap.pid
monitor_id: telescope-west
file_format: pcapfile
log_file: /var/log/chronocap.log
";
        let config = Config::parse(text).expect("parse");
        assert_eq!(config.interval, 60);
        assert_eq!(config.threads, 4);
        assert!(config.strip_vlans);
        assert!(config.write_stats);
        assert_eq!(config.pid_file, PathBuf::from("/tmp/chronocap.pid"));
        assert_eq!(config.monitor_id.as_deref(), Some("telescope-west"));
        assert_eq!(config.log_file, Some(PathBuf::from("/var/log/chronocap.log")));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let text = format!("{}compression: gzip\n", MINIMAL);
        let result = Config::parse(&text);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_input_uri_rejected() {
        let result = Config::parse("output_template: /data/out-%s.%f\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_malformed_yaml_rejected() {
        let result = Config::parse(":::");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    // ===========================================
    // Validation
    // ===========================================

    #[test]
    fn test_zero_interval_rejected() {
        let text = format!("{}interval: 0\n", MINIMAL);
        let result = Config::parse(&text);
        assert!(matches!(result, Err(ConfigError::InvalidInterval)));
    }

    #[test]
    fn test_zero_threads_rejected() {
        let text = format!("{}threads: 0\n", MINIMAL);
        let result = Config::parse(&text);
        assert!(matches!(result, Err(ConfigError::InvalidThreads)));
    }

    #[test]
    fn test_empty_input_uri_rejected() {
        let text = "\
input_uri: \"\"
output_template: /data/out-%s.%f
";
        let result = Config::parse(text);
        assert!(matches!(result, Err(ConfigError::EmptyInput)));
    }

    #[test]
    fn test_empty_template_rejected() {
        let text = "\
input_uri: pcapfile:/traces/input.pcap
output_template: \"\"
";
        let result = Config::parse(text);
        assert!(matches!(result, Err(ConfigError::EmptyTemplate)));
    }

    // ===========================================
    // Loading from disk
    // ===========================================

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, MINIMAL).expect("write config");

        let config = Config::load(&path).expect("load");
        assert_eq!(config.input_uri, "pcapfile:/traces/input.pcap");
    }

    #[test]
    fn test_load_missing_file_is_error() {
        let result = Config::load(Path::new("/nonexistent-dir-for-test/config.yaml"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            ConfigError::InvalidInterval.to_string(),
            "interval must be at least 1 second"
        );
        assert_eq!(
            ConfigError::InvalidThreads.to_string(),
            "threads must be at least 1"
        );
    }

    #[test]
    fn test_config_clone_and_eq() {
        let config = Config::parse(MINIMAL).expect("parse");
        let cloned = config.clone();
        assert_eq!(config, cloned);
    }
}
