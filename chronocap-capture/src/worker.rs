//! Capture worker hot path.
//!
//! Each worker owns its interval bookkeeping and interim writer outright;
//! nothing here is shared except the halt/reload flags, the drained-worker
//! counter and the coordination channel. The per-packet path does no
//! blocking I/O: appends are queued to the writer's I/O thread and the
//! interval rotation hands the file descriptor to the merger instead of
//! closing it here.

use std::path::Path;
use std::sync::Mutex;

use chronocap_trace::{FastTraceWriter, Packet};

use crate::channel::{CoordinationRecord, RecordSender};
use crate::logger::Logger;
use crate::signals::SharedFlag;
use crate::source::{PacketStream, StreamEvent};
use crate::stats::CaptureStats;
use crate::template::NameTemplate;

/// State shared between the capture workers and the main thread.
#[derive(Debug)]
pub struct CaptureShared {
    /// Global halt: raised by signals, by any unrecoverable error, or when
    /// every worker has drained after a reload.
    pub halt: SharedFlag,
    /// Reload request: workers close out their current interval once and
    /// stop accepting packets.
    pub reload: SharedFlag,
    workers: usize,
    workers_ended: Mutex<usize>,
}

impl CaptureShared {
    pub fn new(workers: usize) -> Self {
        Self {
            halt: SharedFlag::new(),
            reload: SharedFlag::new(),
            workers,
            workers_ended: Mutex::new(0),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Record one worker as drained; the last one raises the halt flag.
    pub fn worker_ended(&self) {
        let mut ended = self.workers_ended.lock().unwrap();
        *ended += 1;
        if *ended >= self.workers {
            self.halt.trigger();
        }
    }

    #[cfg(test)]
    fn ended_count(&self) -> usize {
        *self.workers_ended.lock().unwrap()
    }
}

/// Per-worker capture options, taken from the configuration.
#[derive(Debug, Clone, Copy)]
pub struct WorkerOptions {
    pub interval: u32,
    pub strip_vlans: bool,
    pub write_stats: bool,
}

/// Per-worker mutable state.
pub struct WorkerState {
    pub worker_id: usize,
    /// 0 until the first packet establishes the starting interval.
    pub current_interval_start: u32,
    pub next_boundary: u32,
    pub writer: FastTraceWriter,
    pub interim_path: Option<String>,
    pub last_seen_missing: u64,
    pub last_seen_accepted: u64,
    /// Once set, every further packet is dropped on the floor.
    pub ending: bool,
}

impl WorkerState {
    pub fn new(worker_id: usize) -> Self {
        Self {
            worker_id,
            current_interval_start: 0,
            next_boundary: 0,
            writer: FastTraceWriter::new(),
            interim_path: None,
            last_seen_missing: 0,
            last_seen_accepted: 0,
            ending: false,
        }
    }
}

/// Per-packet handler.
///
/// Establishes the starting interval from the source's globally-first
/// packet, closes out intervals the packet's timestamp has passed (and the
/// current one on reload), then appends the packet to the interim file.
/// Every failure path raises the global halt flag and returns normally so
/// the capture source can shut down cleanly.
pub fn handle_packet<S: PacketStream + ?Sized, L: Logger + ?Sized>(
    state: &mut WorkerState,
    mut packet: Packet,
    stream: &S,
    shared: &CaptureShared,
    names: &NameTemplate,
    opts: &WorkerOptions,
    tx: &RecordSender,
    logger: &L,
) {
    if state.ending {
        return;
    }

    if state.current_interval_start == 0 {
        // First packet seen by this worker. Every worker derives the same
        // starting interval from the globally-first packet time, so the
        // merger sees all of them acknowledge interval T0 even if this
        // worker's own traffic starts after the first boundary.
        let first = match stream.first_packet_time() {
            Some(first) => first,
            None => {
                logger.error(&format!(
                    "worker {}: no first-packet time available from capture source",
                    state.worker_id
                ));
                shared.halt.trigger();
                return;
            }
        };
        if opts.interval == 0 {
            logger.error(&format!(
                "worker {}: interval has been assigned a bad value of 0",
                state.worker_id
            ));
            shared.halt.trigger();
            return;
        }
        state.current_interval_start = first - first % opts.interval;
        state.next_boundary = state.current_interval_start + opts.interval;
    }

    while shared.reload.is_set() || packet.ts_sec >= state.next_boundary {
        let stats = if opts.write_stats {
            Some(stream.stats())
        } else {
            None
        };

        // Do not close the interim file here: close() blocks even when
        // the writes themselves are asynchronous. Detach the descriptor
        // and let the merger close it.
        let src_fd = if state.interim_path.take().is_some() {
            match state.writer.detach() {
                Ok(fd) => fd,
                Err(e) => {
                    logger.error(&format!(
                        "worker {}: failed to detach interim writer: {}",
                        state.worker_id, e
                    ));
                    shared.halt.trigger();
                    return;
                }
            }
        } else {
            None
        };

        let record = CoordinationRecord::IntervalDone {
            worker_id: state.worker_id,
            timestamp: state.current_interval_start,
            src_fd,
            stats,
        };
        if tx.send(record).is_err() {
            logger.error(&format!(
                "worker {}: error sending interval-done record to merging thread",
                state.worker_id
            ));
            shared.halt.trigger();
            return;
        }

        state.current_interval_start = state.next_boundary;
        state.next_boundary += opts.interval;

        if shared.reload.is_set() {
            state.ending = true;
            shared.worker_ended();
            logger.info(&format!(
                "worker {} marked as ending after reload",
                state.worker_id
            ));
            return;
        }
    }

    if state.interim_path.is_none() {
        let name = match names.interim(state.current_interval_start, state.worker_id) {
            Ok(name) => name,
            Err(e) => {
                logger.error(&format!(
                    "worker {}: unable to create suitable interim file name: {}",
                    state.worker_id, e
                ));
                shared.halt.trigger();
                return;
            }
        };
        if let Err(e) = state.writer.open(Path::new(&name)) {
            logger.error(&format!(
                "worker {}: unable to open interim file {}: {}",
                state.worker_id, name, e
            ));
            shared.halt.trigger();
            return;
        }
        state.interim_path = Some(name);
    }

    if opts.strip_vlans {
        packet.strip_vlans();
    }

    if let Err(e) = state.writer.append(&packet) {
        logger.error(&format!(
            "worker {}: failed to write packet to interim file: {}",
            state.worker_id, e
        ));
        shared.halt.trigger();
    }
}

/// ~1 Hz tick handler: warn when the capture source reports new drops.
pub fn handle_tick<L: Logger + ?Sized>(state: &mut WorkerState, stats: &CaptureStats, logger: &L) {
    if let Some(missing) = stats.missing {
        if missing > state.last_seen_missing {
            let accepted = stats.accepted.unwrap_or(0);
            logger.warning(&format!(
                "worker {} dropped {} packets in last second (accepted {})",
                state.worker_id,
                missing - state.last_seen_missing,
                accepted.saturating_sub(state.last_seen_accepted),
            ));
            state.last_seen_missing = missing;
        }
    }
    if let Some(accepted) = stats.accepted {
        state.last_seen_accepted = accepted;
    }
}

/// Worker thread body: pump the stream until halt or end of source.
pub fn worker_loop<S: PacketStream, L: Logger + ?Sized>(
    mut stream: S,
    mut state: WorkerState,
    shared: &CaptureShared,
    names: &NameTemplate,
    opts: &WorkerOptions,
    tx: &RecordSender,
    logger: &L,
) {
    loop {
        if shared.halt.is_set() {
            return;
        }
        match stream.next_event() {
            Ok(StreamEvent::Packet(packet)) => {
                handle_packet(&mut state, packet, &stream, shared, names, opts, tx, logger);
            }
            Ok(StreamEvent::Tick(_)) => {
                let stats = stream.stats();
                handle_tick(&mut state, &stats, logger);
            }
            Ok(StreamEvent::Finished) => return,
            Err(e) => {
                logger.error(&format!(
                    "worker {}: capture source error: {}",
                    state.worker_id, e
                ));
                shared.halt.trigger();
                return;
            }
        }
    }
}
