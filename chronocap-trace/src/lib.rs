//! Packet model and trace-file codec for chronocap.
//!
//! This crate provides:
//! - `Packet`, the captured-frame representation with microsecond
//!   timestamps and the VLAN-strip transform
//! - A classic pcap file reader and writer (uncompressed, caller-thread
//!   I/O only)
//! - `FastTraceWriter`, the asynchronous interim writer whose open file
//!   descriptor can be detached for hand-off to the merging thread

pub mod fast_writer;
pub mod packet;
pub mod pcap;

pub use fast_writer::{close_detached, FastTraceWriter, FastWriterError};
pub use packet::Packet;
pub use pcap::{strip_scheme, TraceError, TraceReader, TraceWriter};
