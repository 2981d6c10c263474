//! Interval merging thread.
//!
//! The merger is the sole consumer of the coordination channel. It closes
//! descriptors handed off by the workers (close() blocks, which is exactly
//! why it happens here and not on the packet path), tracks which workers
//! have finished each interval, and once an interval is complete performs
//! a k-way chronological merge of the interim files into the final output
//! trace, followed by the `.done` marker and the optional `.stats`
//! sidecar.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::sync::Arc;

use thiserror::Error;

use chronocap_clock::Clock;
use chronocap_trace::{
    close_detached, strip_scheme, Packet, TraceError, TraceReader, TraceWriter,
};

use crate::channel::{CoordinationRecord, RecordReceiver};
use crate::logger::Logger;
use crate::stats::{write_stats_file, CaptureStats};
use crate::template::{NameTemplate, TemplateError};

/// Errors that abandon the merge of one interval.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("file name error: {0}")]
    Template(#[from] TemplateError),

    #[error("trace error: {0}")]
    Trace(#[from] TraceError),
}

/// Merge-side settings, taken from the configuration.
#[derive(Debug, Clone, Copy)]
pub struct MergeSettings {
    pub workers: usize,
    pub write_stats: bool,
}

/// An interval awaiting completion reports from some subset of workers.
#[derive(Debug)]
pub struct PendingInterval {
    pub timestamp: u32,
    /// Worker ids paired with their statistics snapshots, in report order.
    pub reports: Vec<(usize, Option<CaptureStats>)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadStatus {
    NoPacketBuffered,
    PacketBuffered,
    EndOfStream,
}

/// One interim file being drained during a merge.
struct InterimReader {
    uri: String,
    source: Option<TraceReader<BufReader<File>>>,
    next_packet: Option<Packet>,
    status: ReadStatus,
}

impl InterimReader {
    /// Open the interim file at `uri`. A worker that saw no packets for
    /// the interval never created the file, so any open failure simply
    /// means there is nothing to read from this worker.
    fn open(uri: String) -> Self {
        match TraceReader::open(&uri) {
            Ok(source) => Self {
                uri,
                source: Some(source),
                next_packet: None,
                status: ReadStatus::NoPacketBuffered,
            },
            Err(_) => Self {
                uri,
                source: None,
                next_packet: None,
                status: ReadStatus::EndOfStream,
            },
        }
    }

    fn read_next(&mut self) -> Result<Option<Packet>, TraceError> {
        match self.source.as_mut() {
            Some(source) => source.next_packet(),
            None => Ok(None),
        }
    }

    fn next_timestamp(&self) -> u64 {
        self.next_packet
            .as_ref()
            .map(|p| p.ts_micros())
            .unwrap_or(u64::MAX)
    }
}

/// Pick the interim reader whose buffered packet is chronologically next.
///
/// Linear scan: readers needing a packet read one (EOF flips them to
/// `EndOfStream`); among the buffered candidates the lowest timestamp
/// wins, and on equal timestamps the lowest worker index, because an
/// equal timestamp does not displace the earlier candidate.
fn choose_next_merge_packet(readers: &mut [InterimReader], logger: &dyn Logger) -> Option<usize> {
    let mut candidate: Option<usize> = None;

    for index in 0..readers.len() {
        match readers[index].status {
            ReadStatus::EndOfStream => continue,
            ReadStatus::NoPacketBuffered => match readers[index].read_next() {
                Ok(Some(packet)) => {
                    readers[index].next_packet = Some(packet);
                    readers[index].status = ReadStatus::PacketBuffered;
                }
                Ok(None) => {
                    readers[index].status = ReadStatus::EndOfStream;
                    continue;
                }
                Err(e) => {
                    logger.warning(&format!(
                        "error reading interim file {}: {}",
                        readers[index].uri, e
                    ));
                    readers[index].status = ReadStatus::EndOfStream;
                    continue;
                }
            },
            ReadStatus::PacketBuffered => {}
        }

        candidate = match candidate {
            None => Some(index),
            Some(best) => {
                if readers[index].next_timestamp() < readers[best].next_timestamp() {
                    Some(index)
                } else {
                    Some(best)
                }
            }
        };
    }

    candidate
}

/// The merging thread's state.
pub struct Merger<C: Clock> {
    names: NameTemplate,
    settings: MergeSettings,
    clock: C,
    logger: Arc<dyn Logger>,
    pending: BTreeMap<u32, PendingInterval>,
}

impl<C: Clock> Merger<C> {
    pub fn new(
        names: NameTemplate,
        settings: MergeSettings,
        clock: C,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self {
            names,
            settings,
            clock,
            logger,
            pending: BTreeMap::new(),
        }
    }

    /// Receive loop: runs until a `Stop` record or channel failure.
    pub fn run(mut self, rx: RecordReceiver) {
        loop {
            match rx.recv() {
                Err(_) => {
                    self.logger
                        .error("error receiving on coordination channel in merging thread");
                    break;
                }
                Ok(CoordinationRecord::Stop) => break,
                Ok(CoordinationRecord::IntervalDone {
                    worker_id,
                    timestamp,
                    src_fd,
                    stats,
                }) => {
                    // Close the handed-off descriptor here: the blocking
                    // close waits out any remaining interim I/O where the
                    // packet path cannot afford to.
                    if let Some(fd) = src_fd {
                        close_detached(fd);
                    }
                    self.interval_done(worker_id, timestamp, stats);
                }
            }
        }
    }

    /// Record one worker's completion of an interval; merge when it is the
    /// last one.
    pub fn interval_done(
        &mut self,
        worker_id: usize,
        timestamp: u32,
        stats: Option<CaptureStats>,
    ) {
        let workers = self.settings.workers;
        let entry = self
            .pending
            .entry(timestamp)
            .or_insert_with(|| PendingInterval {
                timestamp,
                reports: Vec::with_capacity(workers),
            });
        entry.reports.push((worker_id, stats));
        if entry.reports.len() < workers {
            return;
        }

        if let Some((&oldest, _)) = self.pending.iter().next() {
            if oldest != timestamp {
                self.logger.warning(&format!(
                    "completed interval {} out of order (interval {} still pending)",
                    timestamp, oldest
                ));
            }
        }

        let Some(finished) = self.pending.remove(&timestamp) else {
            return;
        };
        match self.merge_interval(&finished) {
            Ok(()) => {
                self.logger
                    .info(&format!("done merging output files for {}", timestamp));
            }
            Err(e) => {
                self.logger.error(&format!(
                    "failed to merge interim output files for interval {}: {}",
                    timestamp, e
                ));
            }
        }
    }

    /// Merge one completed interval. On error the merge is abandoned and
    /// no `.done` marker appears, but interim files are still removed.
    fn merge_interval(&self, finished: &PendingInterval) -> Result<(), MergeError> {
        let started_msec = self.clock.now_unix_msec();

        let mut readers = Vec::with_capacity(self.settings.workers);
        let mut uri_error = None;
        for worker in 0..self.settings.workers {
            match self.names.interim_uri(finished.timestamp, worker) {
                Ok(uri) => readers.push(InterimReader::open(uri)),
                Err(e) => {
                    uri_error = Some(e);
                    break;
                }
            }
        }

        let result = match uri_error {
            Some(e) => Err(MergeError::Template(e)),
            None => self.write_merged(finished.timestamp, &mut readers),
        };

        if self.settings.write_stats {
            self.write_stats_sidecar(finished, started_msec);
        }

        if result.is_ok() {
            // Archival scripts poll for this empty marker; it only exists
            // once the merged file is complete.
            self.touch_done_marker(finished.timestamp);
        }

        for reader in &mut readers {
            if reader.source.take().is_some() {
                let path = strip_scheme(&reader.uri);
                if let Err(e) = fs::remove_file(path) {
                    self.logger
                        .warning(&format!("failed to remove interim file {}: {}", path, e));
                }
            }
        }

        result
    }

    fn write_merged(
        &self,
        timestamp: u32,
        readers: &mut [InterimReader],
    ) -> Result<(), MergeError> {
        let outname = self.names.merged_uri(timestamp)?;
        let mut writer = TraceWriter::create(&outname)?;

        while let Some(index) = choose_next_merge_packet(readers, &*self.logger) {
            let Some(packet) = readers[index].next_packet.take() else {
                break;
            };
            writer.write_packet(&packet)?;
            readers[index].status = ReadStatus::NoPacketBuffered;
        }

        writer.finish()?;
        Ok(())
    }

    fn write_stats_sidecar(&self, finished: &PendingInterval, started_msec: u64) {
        let name = match self.names.stats_file(finished.timestamp) {
            Ok(name) => name,
            Err(e) => {
                self.logger
                    .error(&format!("unable to derive stats file name: {}", e));
                return;
            }
        };
        let elapsed = self.clock.now_unix_msec().saturating_sub(started_msec);
        match File::create(&name) {
            Ok(file) => {
                let mut out = BufWriter::new(file);
                let written =
                    write_stats_file(&mut out, finished.timestamp, &finished.reports, elapsed)
                        .and_then(|_| out.flush());
                if let Err(e) = written {
                    self.logger
                        .error(&format!("error while writing stats file '{}': {}", name, e));
                }
            }
            Err(e) => {
                self.logger
                    .error(&format!("error while creating stats file '{}': {}", name, e));
            }
        }
    }

    fn touch_done_marker(&self, timestamp: u32) {
        let name = match self.names.done_marker(timestamp) {
            Ok(name) => name,
            Err(e) => {
                self.logger
                    .error(&format!("unable to derive done marker name: {}", e));
                return;
            }
        };
        // The file only has to exist; content is irrelevant.
        match File::create(&name) {
            Ok(_) => {}
            Err(e) => {
                self.logger
                    .error(&format!("error while creating done marker '{}': {}", name, e));
            }
        }
    }

    #[cfg(test)]
    fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::MockLogger;
    use chronocap_clock::MockClock;
    use std::path::Path;
    use tempfile::tempdir;

    const INTERVAL_T0: u32 = 1700000000;

    struct Fixture {
        _dir: tempfile::TempDir,
        base: std::path::PathBuf,
        names: NameTemplate,
        logger: MockLogger,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempdir().expect("tempdir");
            let base = dir.path().to_path_buf();
            let template = format!("{}/out-%s.%f", base.display());
            Self {
                _dir: dir,
                base,
                names: NameTemplate::new(&template, None, "pcapfile"),
                logger: MockLogger::new(),
            }
        }

        fn merger(&self, workers: usize, write_stats: bool) -> Merger<MockClock> {
            Merger::new(
                self.names.clone(),
                MergeSettings {
                    workers,
                    write_stats,
                },
                MockClock::new(1700001000),
                Arc::new(self.logger.clone()),
            )
        }

        fn write_interim(&self, timestamp: u32, worker: usize, packets: &[Packet]) {
            let path = self.names.interim(timestamp, worker).expect("interim name");
            let mut writer = TraceWriter::create(&path).expect("create interim");
            for packet in packets {
                writer.write_packet(packet).expect("write");
            }
            writer.finish().expect("finish");
        }

        fn merged_path(&self, timestamp: u32) -> std::path::PathBuf {
            self.base.join(format!("out-{}.pcap", timestamp))
        }

        fn read_merged(&self, timestamp: u32) -> Vec<Packet> {
            let mut reader =
                TraceReader::open_path(&self.merged_path(timestamp)).expect("open merged");
            let mut packets = Vec::new();
            while let Some(packet) = reader.next_packet().expect("read") {
                packets.push(packet);
            }
            packets
        }

        fn done_exists(&self, timestamp: u32) -> bool {
            self.base
                .join(format!("out-{}.pcap.done", timestamp))
                .exists()
        }

        fn interim_exists(&self, timestamp: u32, worker: usize) -> bool {
            Path::new(&self.names.interim(timestamp, worker).unwrap()).exists()
        }
    }

    fn packet(ts_sec: u32, ts_usec: u32, tag: u8) -> Packet {
        Packet::new(ts_sec, ts_usec, vec![tag; 20])
    }

    fn report(merger: &mut Merger<MockClock>, worker: usize, timestamp: u32) {
        merger.interval_done(worker, timestamp, None);
    }

    // ===========================================
    // Pending-interval bookkeeping
    // ===========================================

    #[test]
    fn test_pending_interval_waits_for_all_workers() {
        let fixture = Fixture::new();
        let mut merger = fixture.merger(3, false);

        report(&mut merger, 0, INTERVAL_T0);
        report(&mut merger, 1, INTERVAL_T0);
        assert_eq!(merger.pending_len(), 1);
        assert!(!fixture.done_exists(INTERVAL_T0));

        report(&mut merger, 2, INTERVAL_T0);
        assert_eq!(merger.pending_len(), 0);
        assert!(fixture.done_exists(INTERVAL_T0));
    }

    #[test]
    fn test_single_worker_interval_merges_immediately() {
        let fixture = Fixture::new();
        fixture.write_interim(INTERVAL_T0, 0, &[packet(INTERVAL_T0 + 1, 0, 1)]);
        let mut merger = fixture.merger(1, false);

        report(&mut merger, 0, INTERVAL_T0);

        assert!(fixture.done_exists(INTERVAL_T0));
        assert_eq!(fixture.read_merged(INTERVAL_T0).len(), 1);
    }

    #[test]
    fn test_distinct_intervals_tracked_separately() {
        let fixture = Fixture::new();
        let mut merger = fixture.merger(2, false);

        report(&mut merger, 0, INTERVAL_T0);
        report(&mut merger, 0, INTERVAL_T0 + 300);
        assert_eq!(merger.pending_len(), 2);
    }

    #[test]
    fn test_out_of_order_completion_merges_and_warns() {
        let fixture = Fixture::new();
        let t1 = INTERVAL_T0 + 300;
        let mut merger = fixture.merger(3, false);

        // Worker 2 is slow to finish T0; T1 completes first.
        report(&mut merger, 0, INTERVAL_T0);
        report(&mut merger, 1, INTERVAL_T0);
        for worker in 0..3 {
            report(&mut merger, worker, t1);
        }

        assert!(fixture.done_exists(t1));
        assert!(!fixture.done_exists(INTERVAL_T0));
        assert!(fixture.logger.contains("out of order"));

        report(&mut merger, 2, INTERVAL_T0);
        assert!(fixture.done_exists(INTERVAL_T0));
        assert_eq!(merger.pending_len(), 0);
    }

    // ===========================================
    // K-way merge
    // ===========================================

    #[test]
    fn test_merge_orders_across_workers() {
        let fixture = Fixture::new();
        fixture.write_interim(
            INTERVAL_T0,
            0,
            &[
                packet(INTERVAL_T0 + 1, 0, 10),
                packet(INTERVAL_T0 + 3, 500000, 11),
            ],
        );
        fixture.write_interim(
            INTERVAL_T0,
            1,
            &[
                packet(INTERVAL_T0 + 2, 0, 20),
                packet(INTERVAL_T0 + 59, 900000, 21),
            ],
        );
        let mut merger = fixture.merger(2, false);

        report(&mut merger, 0, INTERVAL_T0);
        report(&mut merger, 1, INTERVAL_T0);

        let merged = fixture.read_merged(INTERVAL_T0);
        let tags: Vec<u8> = merged.iter().map(|p| p.data[0]).collect();
        assert_eq!(tags, vec![10, 20, 11, 21]);

        let times: Vec<u64> = merged.iter().map(|p| p.ts_micros()).collect();
        let mut sorted = times.clone();
        sorted.sort_unstable();
        assert_eq!(times, sorted);
    }

    #[test]
    fn test_merge_tie_break_prefers_lowest_worker() {
        let fixture = Fixture::new();
        fixture.write_interim(INTERVAL_T0, 0, &[packet(INTERVAL_T0 + 5, 0, 0)]);
        fixture.write_interim(INTERVAL_T0, 1, &[packet(INTERVAL_T0 + 5, 0, 1)]);
        let mut merger = fixture.merger(2, false);

        report(&mut merger, 0, INTERVAL_T0);
        report(&mut merger, 1, INTERVAL_T0);

        let merged = fixture.read_merged(INTERVAL_T0);
        assert_eq!(merged[0].data[0], 0);
        assert_eq!(merged[1].data[0], 1);
    }

    #[test]
    fn test_merge_with_silent_worker() {
        let fixture = Fixture::new();
        fixture.write_interim(INTERVAL_T0, 0, &[packet(INTERVAL_T0 + 1, 0, 1)]);
        fixture.write_interim(INTERVAL_T0, 1, &[packet(INTERVAL_T0 + 2, 0, 2)]);
        // Worker 2 saw nothing and never created an interim file.
        let mut merger = fixture.merger(3, false);

        for worker in 0..3 {
            report(&mut merger, worker, INTERVAL_T0);
        }

        assert!(fixture.done_exists(INTERVAL_T0));
        assert_eq!(fixture.read_merged(INTERVAL_T0).len(), 2);
    }

    #[test]
    fn test_merge_all_workers_silent_writes_empty_trace() {
        let fixture = Fixture::new();
        let mut merger = fixture.merger(2, false);

        report(&mut merger, 0, INTERVAL_T0);
        report(&mut merger, 1, INTERVAL_T0);

        assert!(fixture.done_exists(INTERVAL_T0));
        assert!(fixture.read_merged(INTERVAL_T0).is_empty());
    }

    #[test]
    fn test_merge_deletes_interim_files() {
        let fixture = Fixture::new();
        fixture.write_interim(INTERVAL_T0, 0, &[packet(INTERVAL_T0 + 1, 0, 1)]);
        fixture.write_interim(INTERVAL_T0, 1, &[packet(INTERVAL_T0 + 2, 0, 2)]);
        let mut merger = fixture.merger(2, false);

        assert!(fixture.interim_exists(INTERVAL_T0, 0));
        report(&mut merger, 0, INTERVAL_T0);
        report(&mut merger, 1, INTERVAL_T0);

        assert!(!fixture.interim_exists(INTERVAL_T0, 0));
        assert!(!fixture.interim_exists(INTERVAL_T0, 1));
    }

    #[test]
    fn test_merge_failure_skips_done_marker() {
        let fixture = Fixture::new();

        // An unwritable output directory makes the merge fail.
        let bad_names = NameTemplate::new("/nonexistent-dir-for-test/out-%s.%f", None, "pcapfile");
        let mut merger = Merger::new(
            bad_names,
            MergeSettings {
                workers: 1,
                write_stats: false,
            },
            MockClock::new(1700001000),
            Arc::new(fixture.logger.clone()),
        );
        merger.interval_done(0, INTERVAL_T0, None);

        assert!(fixture.logger.contains("failed to merge"));
        assert!(!Path::new("/nonexistent-dir-for-test/out-1700000000.pcap.done").exists());
        assert_eq!(merger.pending_len(), 0);
    }

    // ===========================================
    // Run loop
    // ===========================================

    #[test]
    fn test_run_stops_on_stop_record() {
        let fixture = Fixture::new();
        let merger = fixture.merger(1, false);
        let (tx, rx) = crate::channel::coordination_channel();

        tx.send(CoordinationRecord::Stop).expect("send");
        merger.run(rx);
    }

    #[test]
    fn test_run_stops_when_channel_closes() {
        let fixture = Fixture::new();
        let merger = fixture.merger(1, false);
        let (tx, rx) = crate::channel::coordination_channel();

        drop(tx);
        merger.run(rx);
        assert!(fixture.logger.contains("error receiving"));
    }

    #[test]
    fn test_run_merges_interval_records() {
        let fixture = Fixture::new();
        fixture.write_interim(INTERVAL_T0, 0, &[packet(INTERVAL_T0 + 1, 0, 9)]);
        let merger = fixture.merger(1, false);
        let (tx, rx) = crate::channel::coordination_channel();

        tx.send(CoordinationRecord::IntervalDone {
            worker_id: 0,
            timestamp: INTERVAL_T0,
            src_fd: None,
            stats: None,
        })
        .expect("send");
        tx.send(CoordinationRecord::Stop).expect("send stop");

        merger.run(rx);
        assert!(fixture.done_exists(INTERVAL_T0));
    }

    // ===========================================
    // Stats sidecar
    // ===========================================

    #[test]
    fn test_stats_sidecar_written_when_enabled() {
        let fixture = Fixture::new();
        let mut merger = fixture.merger(2, true);

        let w0 = CaptureStats {
            accepted: Some(100),
            dropped: Some(0),
            ..CaptureStats::default()
        };
        let w1 = CaptureStats {
            accepted: Some(200),
            dropped: Some(5),
            ..CaptureStats::default()
        };
        merger.interval_done(0, INTERVAL_T0, Some(w0));
        merger.interval_done(1, INTERVAL_T0, Some(w1));

        let stats_path = fixture.base.join(format!("out-{}.pcap.stats", INTERVAL_T0));
        let text = std::fs::read_to_string(&stats_path).expect("stats file");

        assert!(text.starts_with(&format!("time:{}\n", INTERVAL_T0)));
        assert!(text.contains("thread:0 accepted_pkts:100\n"));
        assert!(text.contains("thread:1 accepted_pkts:200\n"));
        assert!(text.contains("thread:-1 accepted_pkts:300\n"));
        assert!(text.contains("thread:-1 dropped_pkts:5\n"));

        let duration_line = text
            .lines()
            .find(|l| l.starts_with("merge_duration_msec:"))
            .expect("duration line");
        let value: i64 = duration_line
            .split(':')
            .nth(1)
            .unwrap()
            .parse()
            .expect("numeric duration");
        assert!(value >= 0);
    }

    #[test]
    fn test_stats_sidecar_absent_when_disabled() {
        let fixture = Fixture::new();
        let mut merger = fixture.merger(1, false);

        report(&mut merger, 0, INTERVAL_T0);

        let stats_path = fixture.base.join(format!("out-{}.pcap.stats", INTERVAL_T0));
        assert!(!stats_path.exists());
    }

    // ===========================================
    // choose_next_merge_packet
    // ===========================================

    fn reader_for(fixture: &Fixture, timestamp: u32, worker: usize) -> InterimReader {
        InterimReader::open(fixture.names.interim_uri(timestamp, worker).unwrap())
    }

    #[test]
    fn test_choose_next_returns_none_when_all_eof() {
        let fixture = Fixture::new();
        let mut readers = vec![
            reader_for(&fixture, INTERVAL_T0, 0),
            reader_for(&fixture, INTERVAL_T0, 1),
        ];
        assert_eq!(
            choose_next_merge_packet(&mut readers, &fixture.logger),
            None
        );
    }

    #[test]
    fn test_choose_next_picks_lowest_timestamp() {
        let fixture = Fixture::new();
        fixture.write_interim(INTERVAL_T0, 0, &[packet(INTERVAL_T0 + 9, 0, 0)]);
        fixture.write_interim(INTERVAL_T0, 1, &[packet(INTERVAL_T0 + 2, 0, 1)]);
        let mut readers = vec![
            reader_for(&fixture, INTERVAL_T0, 0),
            reader_for(&fixture, INTERVAL_T0, 1),
        ];

        assert_eq!(
            choose_next_merge_packet(&mut readers, &fixture.logger),
            Some(1)
        );
    }

    #[test]
    fn test_choose_next_compares_microseconds() {
        let fixture = Fixture::new();
        fixture.write_interim(INTERVAL_T0, 0, &[packet(INTERVAL_T0 + 1, 600, 0)]);
        fixture.write_interim(INTERVAL_T0, 1, &[packet(INTERVAL_T0 + 1, 400, 1)]);
        let mut readers = vec![
            reader_for(&fixture, INTERVAL_T0, 0),
            reader_for(&fixture, INTERVAL_T0, 1),
        ];

        assert_eq!(
            choose_next_merge_packet(&mut readers, &fixture.logger),
            Some(1)
        );
    }

    #[test]
    fn test_choose_next_rereads_after_consuming() {
        let fixture = Fixture::new();
        fixture.write_interim(
            INTERVAL_T0,
            0,
            &[packet(INTERVAL_T0 + 1, 0, 0), packet(INTERVAL_T0 + 4, 0, 0)],
        );
        fixture.write_interim(INTERVAL_T0, 1, &[packet(INTERVAL_T0 + 2, 0, 1)]);
        let mut readers = vec![
            reader_for(&fixture, INTERVAL_T0, 0),
            reader_for(&fixture, INTERVAL_T0, 1),
        ];

        let mut order = Vec::new();
        while let Some(index) = choose_next_merge_packet(&mut readers, &fixture.logger) {
            let packet = readers[index].next_packet.take().unwrap();
            readers[index].status = ReadStatus::NoPacketBuffered;
            order.push((index, packet.ts_sec));
        }
        assert_eq!(
            order,
            vec![
                (0, INTERVAL_T0 + 1),
                (1, INTERVAL_T0 + 2),
                (0, INTERVAL_T0 + 4)
            ]
        );
    }
}
