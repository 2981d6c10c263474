//! Coordination records between capture workers and the merging thread.
//!
//! Every worker holds a cloned sender; the main thread holds one more that
//! it only ever uses to send `Stop` at shutdown. The merging thread is the
//! sole receiver. Per-sender FIFO ordering is all the merger relies on:
//! a worker's interval-done records arrive in increasing timestamp order.

use std::os::unix::io::RawFd;
use std::sync::mpsc::{self, Receiver, Sender};

use crate::stats::CaptureStats;

/// A record on the coordination channel.
#[derive(Debug)]
pub enum CoordinationRecord {
    /// A worker has finished writing the interval starting at `timestamp`.
    ///
    /// `src_fd` is the detached descriptor of the interim file, fully
    /// written; the merger owns it from here and must close it. It is
    /// absent when the worker opened no interim file for the interval.
    IntervalDone {
        worker_id: usize,
        timestamp: u32,
        src_fd: Option<RawFd>,
        stats: Option<CaptureStats>,
    },

    /// The main thread is shutting the merger down.
    Stop,
}

pub type RecordSender = Sender<CoordinationRecord>;
pub type RecordReceiver = Receiver<CoordinationRecord>;

/// Create the coordination channel. Unbounded: transient bursts are
/// absorbed by the channel's internal buffering, and sends from the
/// per-packet path never block.
pub fn coordination_channel() -> (RecordSender, RecordReceiver) {
    mpsc::channel()
}
