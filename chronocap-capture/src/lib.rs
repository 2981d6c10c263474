//! chronocap capture daemon.
//!
//! This crate provides the two-phase capture-and-merge engine: N worker
//! threads stream packets from a shared capture source into thread-private
//! interim trace files, and a single merging thread combines each
//! completed interval into one chronologically ordered output file with a
//! `.done` marker for downstream archival. A supervisor process forks and
//! signals the capture child so reloads never lose the interval in
//! flight.

pub mod channel;
pub mod cli;
pub mod config;
pub mod engine;
pub mod exit;
pub mod logger;
pub mod merger;
pub mod signals;
pub mod source;
pub mod stats;
pub mod supervisor;
pub mod template;
pub mod worker;

pub use channel::{coordination_channel, CoordinationRecord, RecordReceiver, RecordSender};
pub use cli::{parse_from, Cli, CliError};
pub use config::{Config, ConfigError};
pub use engine::{run_capture, CaptureError};
pub use logger::{build_logger, Level, LogMode, Logger, MockLogger, NullLogger, StderrLogger};
pub use merger::{MergeSettings, Merger, PendingInterval};
pub use signals::SharedFlag;
pub use source::{
    open_source, ChannelSource, PacketSource, PacketStream, ReplaySource, SourceError,
    StreamEvent,
};
pub use stats::{write_stats_file, CaptureStats};
pub use template::{Marker, NameTemplate, TemplateError};
pub use worker::{handle_packet, handle_tick, worker_loop, CaptureShared, WorkerOptions, WorkerState};
