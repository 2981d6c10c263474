//! Packet source abstraction.
//!
//! The capture engine is written against the `PacketSource` /
//! `PacketStream` seam: a source opens one stream per worker, each stream
//! delivers that worker's packets in arrival order plus periodic ticks.
//! A live-interface source is one more implementation of this seam; in
//! this tree the concrete sources are the offline trace replay used for
//! telescope trace reprocessing and a channel-backed source for tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;

use chronocap_trace::{Packet, TraceError, TraceReader};

use crate::stats::CaptureStats;

/// Per-worker queue depth for the replay feeder.
const REPLAY_QUEUE_DEPTH: usize = 1024;

/// How long a stream waits for an event before synthesising a tick, so
/// workers can observe the halt flag even when traffic stalls.
const IDLE_TICK: Duration = Duration::from_millis(100);

/// Errors from opening or reading a capture source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("cannot open capture source {uri}: {reason}")]
    Open { uri: String, reason: String },

    #[error("unsupported capture source scheme in {0}")]
    UnsupportedScheme(String),

    #[error("capture source stream error: {0}")]
    Stream(#[from] TraceError),
}

/// One event from a per-worker packet stream.
#[derive(Debug)]
pub enum StreamEvent {
    /// A captured packet, owned by the worker for the duration of its
    /// handler only.
    Packet(Packet),
    /// Periodic timer event carrying the current trace-time unix second
    /// (0 when the stream is idle and no packet time is known yet).
    Tick(u64),
    /// The source has no more packets for this worker.
    Finished,
}

/// A per-worker packet stream.
pub trait PacketStream: Send {
    /// Produce the next event. Must not block unboundedly: when no packet
    /// is available a tick or `Finished` arrives within bounded time so
    /// the worker can observe the halt flag.
    fn next_event(&mut self) -> Result<StreamEvent, SourceError>;

    /// Unix second of the globally-first packet seen by any stream of the
    /// owning source. All workers use this to agree on the starting
    /// interval.
    fn first_packet_time(&self) -> Option<u32>;

    /// Cumulative capture statistics for this stream's thread. Fields the
    /// source cannot measure are absent.
    fn stats(&self) -> CaptureStats;
}

/// A capture source that fans packets out to N worker streams.
pub trait PacketSource {
    type Stream: PacketStream + 'static;

    /// Open one stream per worker. Called once, before workers spawn.
    fn start(&mut self, workers: usize) -> Result<Vec<Self::Stream>, SourceError>;
}

/// Build the source selected by the configured input URI.
pub fn open_source(input_uri: &str) -> Result<ReplaySource, SourceError> {
    match input_uri.split_once(':') {
        Some(("pcapfile", _)) => Ok(ReplaySource::new(input_uri)),
        _ => Err(SourceError::UnsupportedScheme(input_uri.to_string())),
    }
}

// ===========================================
// Offline trace replay
// ===========================================

/// Replays an on-disk trace through N worker streams.
///
/// A feeder thread reads the trace and distributes packets round-robin
/// over bounded per-worker queues, injecting a tick into every stream
/// whenever trace time crosses a second boundary. When the trace is
/// exhausted the queues close and every stream reports `Finished`.
pub struct ReplaySource {
    uri: String,
    feeder: Option<JoinHandle<()>>,
}

impl ReplaySource {
    pub fn new(uri: &str) -> Self {
        Self {
            uri: uri.to_string(),
            feeder: None,
        }
    }
}

impl PacketSource for ReplaySource {
    type Stream = ReplayStream;

    fn start(&mut self, workers: usize) -> Result<Vec<ReplayStream>, SourceError> {
        let mut reader = TraceReader::open(&self.uri).map_err(|e| SourceError::Open {
            uri: self.uri.clone(),
            reason: e.to_string(),
        })?;

        let first_packet = Arc::new(OnceLock::new());
        let mut senders = Vec::with_capacity(workers);
        let mut streams = Vec::with_capacity(workers);
        for _ in 0..workers {
            let (tx, rx) = mpsc::sync_channel(REPLAY_QUEUE_DEPTH);
            senders.push(tx);
            streams.push(ReplayStream {
                rx,
                first_packet: first_packet.clone(),
                accepted: Arc::new(AtomicU64::new(0)),
                last_sec: 0,
            });
        }
        let counters: Vec<Arc<AtomicU64>> =
            streams.iter().map(|s| s.accepted.clone()).collect();

        let feeder = thread::Builder::new()
            .name("replay-feeder".to_string())
            .spawn(move || {
                feed_streams(&mut reader, &senders, &counters, &first_packet, workers);
                // Dropping the senders closes every stream.
            })
            .map_err(|e| SourceError::Open {
                uri: self.uri.clone(),
                reason: e.to_string(),
            })?;
        self.feeder = Some(feeder);

        Ok(streams)
    }
}

fn feed_streams(
    reader: &mut TraceReader<std::io::BufReader<std::fs::File>>,
    senders: &[SyncSender<StreamEvent>],
    counters: &[Arc<AtomicU64>],
    first_packet: &OnceLock<u32>,
    workers: usize,
) {
    let mut next = 0usize;
    let mut last_tick_sec: Option<u32> = None;
    loop {
        let packet = match reader.next_packet() {
            Ok(Some(packet)) => packet,
            // A damaged tail is treated as end of trace.
            Ok(None) | Err(_) => return,
        };

        let _ = first_packet.set(packet.ts_sec);

        if last_tick_sec.map_or(true, |sec| packet.ts_sec > sec) {
            last_tick_sec = Some(packet.ts_sec);
            for sender in senders {
                if sender.send(StreamEvent::Tick(packet.ts_sec as u64)).is_err() {
                    return;
                }
            }
        }

        counters[next].fetch_add(1, Ordering::SeqCst);
        if senders[next].send(StreamEvent::Packet(packet)).is_err() {
            // Worker went away (halt); stop feeding.
            return;
        }
        next = (next + 1) % workers;
    }
}

impl Drop for ReplaySource {
    fn drop(&mut self) {
        if let Some(feeder) = self.feeder.take() {
            let _ = feeder.join();
        }
    }
}

/// One worker's view of a [`ReplaySource`].
pub struct ReplayStream {
    rx: Receiver<StreamEvent>,
    first_packet: Arc<OnceLock<u32>>,
    accepted: Arc<AtomicU64>,
    last_sec: u64,
}

impl PacketStream for ReplayStream {
    fn next_event(&mut self) -> Result<StreamEvent, SourceError> {
        match self.rx.recv_timeout(IDLE_TICK) {
            Ok(StreamEvent::Packet(packet)) => {
                self.last_sec = packet.ts_sec as u64;
                Ok(StreamEvent::Packet(packet))
            }
            Ok(event) => Ok(event),
            Err(RecvTimeoutError::Timeout) => Ok(StreamEvent::Tick(self.last_sec)),
            Err(RecvTimeoutError::Disconnected) => Ok(StreamEvent::Finished),
        }
    }

    fn first_packet_time(&self) -> Option<u32> {
        self.first_packet.get().copied()
    }

    fn stats(&self) -> CaptureStats {
        let accepted = self.accepted.load(Ordering::SeqCst);
        CaptureStats {
            accepted: Some(accepted),
            received: Some(accepted),
            ..CaptureStats::default()
        }
    }
}

// ===========================================
// Channel-backed source for tests
// ===========================================

/// Test-harness source: the test pushes events per worker and controls
/// the shared first-packet time and per-thread statistics directly.
pub struct ChannelSource {
    first_packet: Arc<OnceLock<u32>>,
    handles: Vec<ChannelHandle>,
    receivers: Vec<Receiver<StreamEvent>>,
}

/// The test's handle to one worker's stream.
#[derive(Clone)]
pub struct ChannelHandle {
    tx: SyncSender<StreamEvent>,
    stats: Arc<Mutex<CaptureStats>>,
}

impl ChannelHandle {
    /// Queue an event for the worker.
    pub fn push(&self, event: StreamEvent) {
        self.tx.send(event).expect("stream receiver gone");
    }

    /// Queue a packet for the worker.
    pub fn push_packet(&self, packet: Packet) {
        self.push(StreamEvent::Packet(packet));
    }

    /// Set the statistics the stream will report.
    pub fn set_stats(&self, stats: CaptureStats) {
        *self.stats.lock().unwrap() = stats;
    }
}

impl ChannelSource {
    pub fn new(workers: usize) -> Self {
        let first_packet = Arc::new(OnceLock::new());
        let mut handles = Vec::with_capacity(workers);
        let mut receivers = Vec::with_capacity(workers);
        for _ in 0..workers {
            let (tx, rx) = mpsc::sync_channel(REPLAY_QUEUE_DEPTH);
            handles.push(ChannelHandle {
                tx,
                stats: Arc::new(Mutex::new(CaptureStats::default())),
            });
            receivers.push(rx);
        }
        Self {
            first_packet,
            handles,
            receivers,
        }
    }

    /// The test's handle for worker `index`.
    pub fn handle(&self, index: usize) -> ChannelHandle {
        self.handles[index].clone()
    }

    /// Set the globally-first packet time all streams report.
    pub fn set_first_packet_time(&self, ts_sec: u32) {
        let _ = self.first_packet.set(ts_sec);
    }
}

impl PacketSource for ChannelSource {
    type Stream = ChannelStream;

    fn start(&mut self, workers: usize) -> Result<Vec<ChannelStream>, SourceError> {
        assert_eq!(workers, self.handles.len(), "worker count mismatch");
        Ok(self
            .receivers
            .drain(..)
            .zip(self.handles.iter())
            .map(|(rx, handle)| ChannelStream {
                rx,
                first_packet: self.first_packet.clone(),
                stats: handle.stats.clone(),
            })
            .collect())
    }
}

/// One worker's view of a [`ChannelSource`].
pub struct ChannelStream {
    rx: Receiver<StreamEvent>,
    first_packet: Arc<OnceLock<u32>>,
    stats: Arc<Mutex<CaptureStats>>,
}

impl PacketStream for ChannelStream {
    fn next_event(&mut self) -> Result<StreamEvent, SourceError> {
        match self.rx.recv_timeout(IDLE_TICK) {
            Ok(event) => Ok(event),
            Err(RecvTimeoutError::Timeout) => Ok(StreamEvent::Tick(0)),
            Err(RecvTimeoutError::Disconnected) => Ok(StreamEvent::Finished),
        }
    }

    fn first_packet_time(&self) -> Option<u32> {
        self.first_packet.get().copied()
    }

    fn stats(&self) -> CaptureStats {
        *self.stats.lock().unwrap()
    }
}
