//! Capture process runtime.
//!
//! Wires the pieces together inside the capture child: writes the PID
//! file, starts the merging thread, opens the source's per-worker streams,
//! spawns the workers with all signals blocked (so delivery stays on the
//! main thread), then sleep-polls the halt flag until shutdown.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use thiserror::Error;

use chronocap_clock::SystemClock;

use crate::channel::{coordination_channel, CoordinationRecord};
use crate::config::Config;
use crate::logger::Logger;
use crate::merger::{MergeSettings, Merger};
use crate::signals;
use crate::source::{PacketSource, SourceError};
use crate::template::NameTemplate;
use crate::worker::{worker_loop, CaptureShared, WorkerOptions, WorkerState};

/// How long the main thread sleeps between halt-flag polls.
const HALT_POLL: Duration = Duration::from_micros(100);

/// Errors that abort the capture run.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("error opening pidfile '{path}': {source}")]
    PidFile { path: PathBuf, source: io::Error },

    #[error("failed to start capture source: {0}")]
    Source(#[from] SourceError),

    #[error("capture source opened {got} streams for {wanted} workers")]
    StreamCount { wanted: usize, got: usize },

    #[error("failed to spawn thread: {0}")]
    Spawn(io::Error),

    #[error("failed to adjust signal mask: {0}")]
    SignalMask(io::Error),
}

/// Write this process's PID so the supervisor can signal it.
fn write_pid_file(path: &Path) -> Result<(), CaptureError> {
    fs::write(path, format!("{}\n", std::process::id())).map_err(|source| CaptureError::PidFile {
        path: path.to_path_buf(),
        source,
    })
}

/// Run one capture until halt: the body of the capture child process.
pub fn run_capture<P: PacketSource>(
    config: &Config,
    mut source: P,
    logger: Arc<dyn Logger>,
) -> Result<(), CaptureError> {
    write_pid_file(&config.pid_file)?;

    let names = NameTemplate::new(
        &config.output_template,
        config.monitor_id.as_deref(),
        &config.file_format,
    );
    let shared = Arc::new(CaptureShared::new(config.threads));
    let (tx, rx) = coordination_channel();

    // The merger must be consuming before any worker can push, so its
    // thread starts first.
    let merger = Merger::new(
        names.clone(),
        MergeSettings {
            workers: config.threads,
            write_stats: config.write_stats,
        },
        SystemClock,
        logger.clone(),
    );
    let merger_thread = thread::Builder::new()
        .name("merger".to_string())
        .spawn(move || merger.run(rx))
        .map_err(CaptureError::Spawn)?;

    let streams = source.start(config.threads)?;
    if streams.len() != config.threads {
        return Err(CaptureError::StreamCount {
            wanted: config.threads,
            got: streams.len(),
        });
    }

    // Block every signal while the workers spawn; they inherit the blocked
    // mask and the handlers keep firing on this thread only.
    let blocked = signals::block_all_signals().map_err(CaptureError::SignalMask)?;

    let opts = WorkerOptions {
        interval: config.interval,
        strip_vlans: config.strip_vlans,
        write_stats: config.write_stats,
    };
    let mut workers = Vec::with_capacity(config.threads);
    for (worker_id, stream) in streams.into_iter().enumerate() {
        let shared = shared.clone();
        let names = names.clone();
        let tx = tx.clone();
        let logger = logger.clone();
        let handle = thread::Builder::new()
            .name(format!("worker-{}", worker_id))
            .spawn(move || {
                worker_loop(
                    stream,
                    WorkerState::new(worker_id),
                    &shared,
                    &names,
                    &opts,
                    &tx,
                    &*logger,
                );
            })
            .map_err(CaptureError::Spawn)?;
        workers.push(handle);
    }

    blocked.restore().map_err(CaptureError::SignalMask)?;
    logger.info(&format!(
        "successfully started capture source {}",
        config.input_uri
    ));

    loop {
        if signals::halt_signalled() {
            shared.halt.trigger();
        }
        if signals::take_reload() {
            shared.reload.trigger();
        }
        if shared.halt.is_set() {
            break;
        }
        if workers.iter().all(|worker| worker.is_finished()) {
            // Offline sources drain to completion.
            break;
        }
        thread::sleep(HALT_POLL);
    }

    shared.halt.trigger();
    for worker in workers {
        let _ = worker.join();
    }

    // Workers are gone; tell the merger to finish and wait for it.
    if tx.send(CoordinationRecord::Stop).is_err() {
        logger.error("error sending halt record to merge thread");
    }
    drop(tx);
    let _ = merger_thread.join();

    logger.info("all threads have joined, exiting");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::MockLogger;
    use crate::source::{ChannelSource, ReplaySource, StreamEvent};
    use chronocap_trace::{Packet, TraceReader, TraceWriter};
    use tempfile::tempdir;

    fn config_for(dir: &Path, threads: usize, input_uri: &str) -> Config {
        Config::parse(&format!(
            "input_uri: {}\noutput_template: {}/merged-%s.%f\ninterval: 60\nthreads: {}\npid_file: {}/chronocap.pid\n",
            input_uri,
            dir.display(),
            threads,
            dir.display(),
        ))
        .expect("config")
    }

    #[test]
    fn test_write_pid_file_contents() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("chronocap.pid");

        write_pid_file(&path).expect("write pid");

        let text = std::fs::read_to_string(&path).expect("read pid");
        assert_eq!(text, format!("{}\n", std::process::id()));
    }

    #[test]
    fn test_write_pid_file_bad_path() {
        let result = write_pid_file(Path::new("/nonexistent-dir-for-test/chronocap.pid"));
        assert!(matches!(result, Err(CaptureError::PidFile { .. })));
    }

    #[test]
    fn test_run_capture_replays_trace_end_to_end() {
        let dir = tempdir().expect("tempdir");
        let input = dir.path().join("input.pcap");

        // The first packet aligns the starting interval to 1699999980.
        // Packets at 1..=3.5 fall in it; the later ones land in the next
        // interval, which never closes (no packet past its boundary), so
        // exactly one merged file appears.
        let mut writer =
            TraceWriter::create(&input.to_string_lossy()).expect("create input");
        for (sec, usec) in [
            (1700000001u32, 0u32),
            (1700000002, 0),
            (1700000003, 500000),
            (1700000059, 900000),
            (1700000061, 0),
            (1700000062, 0),
        ] {
            writer
                .write_packet(&Packet::new(sec, usec, vec![0u8; 40]))
                .expect("write");
        }
        writer.finish().expect("finish");

        let config = config_for(
            dir.path(),
            2,
            &format!("pcapfile:{}", input.display()),
        );
        let logger = MockLogger::new();
        let source = ReplaySource::new(&config.input_uri);

        run_capture(&config, source, Arc::new(logger.clone())).expect("run");

        let merged_path = dir.path().join("merged-1699999980.pcap");
        assert!(merged_path.exists());
        assert!(dir.path().join("merged-1699999980.pcap.done").exists());

        let mut reader = TraceReader::open_path(&merged_path).expect("open merged");
        let mut times = Vec::new();
        while let Some(packet) = reader.next_packet().expect("read") {
            times.push(packet.ts_micros());
        }
        assert_eq!(
            times,
            vec![1700000001000000, 1700000002000000, 1700000003500000]
        );

        // PID file was written by the run.
        assert!(dir.path().join("chronocap.pid").exists());
        assert!(logger.contains("all threads have joined"));
    }

    #[test]
    fn test_run_capture_halts_when_workers_finish() {
        let dir = tempdir().expect("tempdir");
        let config = config_for(dir.path(), 1, "pcapfile:unused");

        let mut source = ChannelSource::new(1);
        let handle = source.handle(0);
        handle.push(StreamEvent::Finished);

        run_capture(&config, source, Arc::new(MockLogger::new())).expect("run");
    }

    #[test]
    fn test_run_capture_missing_input_is_source_error() {
        let dir = tempdir().expect("tempdir");
        let config = config_for(
            dir.path(),
            1,
            "pcapfile:/nonexistent-dir-for-test/in.pcap",
        );
        let source = ReplaySource::new(&config.input_uri);

        let result = run_capture(&config, source, Arc::new(MockLogger::new()));
        assert!(matches!(result, Err(CaptureError::Source(_))));
    }

    #[test]
    fn test_run_capture_bad_pid_file_is_error() {
        let dir = tempdir().expect("tempdir");
        let mut config = config_for(dir.path(), 1, "pcapfile:unused");
        config.pid_file = PathBuf::from("/nonexistent-dir-for-test/chronocap.pid");

        let source = ChannelSource::new(1);
        let result = run_capture(&config, source, Arc::new(MockLogger::new()));
        assert!(matches!(result, Err(CaptureError::PidFile { .. })));
    }
}
