//! Asynchronous interim trace writer.
//!
//! Each capture worker owns one `FastTraceWriter`. Appends from the
//! per-packet path only encode into a buffer and enqueue it to a dedicated
//! I/O thread, so the hot path never waits on disk. At an interval
//! rotation the writer is *detached*: the open file descriptor is pulled
//! back out (after the queued writes for it have drained) and handed to
//! the merger, which performs the blocking `close()` far away from the
//! packet path.

use std::fs::File;
use std::io::Write;
use std::os::unix::io::{FromRawFd, IntoRawFd, RawFd};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use thiserror::Error;

use crate::packet::Packet;
use crate::pcap::{encode_file_header, encode_record};

/// Errors surfaced to the hot path.
#[derive(Debug, Error)]
pub enum FastWriterError {
    #[error("failed to open interim file: {0}")]
    Open(#[from] std::io::Error),

    #[error("interim write failed on I/O thread")]
    WriteFailed,

    #[error("interim I/O thread is gone")]
    ChannelClosed,
}

enum IoCmd {
    Attach(File),
    Write(Vec<u8>),
    Detach(Sender<RawFd>),
}

/// Hot-path file writer with a detachable descriptor.
pub struct FastTraceWriter {
    tx: Option<Sender<IoCmd>>,
    io_thread: Option<JoinHandle<()>>,
    failed: Arc<AtomicBool>,
    attached: bool,
}

impl FastTraceWriter {
    /// Create the writer and start its I/O thread. No file is attached
    /// yet; `open` attaches one per interval.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        let failed = Arc::new(AtomicBool::new(false));
        let thread_failed = failed.clone();
        let io_thread = thread::Builder::new()
            .name("interim-io".to_string())
            .spawn(move || io_loop(rx, thread_failed))
            .expect("spawn interim I/O thread");

        Self {
            tx: Some(tx),
            io_thread: Some(io_thread),
            failed,
            attached: false,
        }
    }

    /// True if a file is currently attached.
    pub fn is_open(&self) -> bool {
        self.attached
    }

    /// Open a new interim file and queue its trace header. Called once per
    /// interval when the first packet for it arrives.
    pub fn open(&mut self, path: &Path) -> Result<(), FastWriterError> {
        let file = File::create(path)?;
        self.send(IoCmd::Attach(file))?;

        let mut header = Vec::with_capacity(24);
        encode_file_header(&mut header);
        self.send(IoCmd::Write(header))?;

        self.failed.store(false, Ordering::SeqCst);
        self.attached = true;
        Ok(())
    }

    /// Enqueue one packet for writing. Never blocks on disk; a failure on
    /// the I/O thread is reported by the first append after it happens.
    pub fn append(&self, packet: &Packet) -> Result<(), FastWriterError> {
        if self.failed.load(Ordering::SeqCst) {
            return Err(FastWriterError::WriteFailed);
        }
        let mut buf = Vec::with_capacity(16 + packet.data.len());
        encode_record(packet, &mut buf);
        self.send(IoCmd::Write(buf))
    }

    /// Detach the current file, returning its raw descriptor for hand-off.
    ///
    /// Waits only for the writes already queued ahead of the detach to
    /// drain (the commands are processed in FIFO order), so the returned
    /// descriptor refers to a fully written file. The descriptor's owner
    /// is now the caller; `close()` is deliberately not performed here.
    pub fn detach(&mut self) -> Result<Option<RawFd>, FastWriterError> {
        if !self.attached {
            return Ok(None);
        }
        let (reply_tx, reply_rx) = mpsc::channel();
        self.send(IoCmd::Detach(reply_tx))?;
        let fd = reply_rx
            .recv()
            .map_err(|_| FastWriterError::ChannelClosed)?;
        self.attached = false;
        Ok(Some(fd))
    }

    fn send(&self, cmd: IoCmd) -> Result<(), FastWriterError> {
        match &self.tx {
            Some(tx) => tx.send(cmd).map_err(|_| FastWriterError::ChannelClosed),
            None => Err(FastWriterError::ChannelClosed),
        }
    }
}

impl Default for FastTraceWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for FastTraceWriter {
    fn drop(&mut self) {
        // Closing the command channel stops the I/O thread; any file still
        // attached is flushed and closed there.
        self.tx.take();
        if let Some(handle) = self.io_thread.take() {
            let _ = handle.join();
        }
    }
}

fn io_loop(rx: Receiver<IoCmd>, failed: Arc<AtomicBool>) {
    let mut file: Option<File> = None;
    for cmd in rx {
        match cmd {
            IoCmd::Attach(f) => {
                file = Some(f);
            }
            IoCmd::Write(buf) => {
                if let Some(f) = file.as_mut() {
                    if f.write_all(&buf).is_err() {
                        failed.store(true, Ordering::SeqCst);
                    }
                }
            }
            IoCmd::Detach(reply) => {
                if let Some(f) = file.take() {
                    // Ownership of the descriptor leaves this thread; the
                    // receiver is responsible for close().
                    let _ = reply.send(f.into_raw_fd());
                }
            }
        }
    }
}

/// Close a descriptor previously returned by [`FastTraceWriter::detach`].
pub fn close_detached(fd: RawFd) {
    // Re-wrap the raw descriptor so the blocking close runs here, on the
    // caller's (cold-path) thread.
    drop(unsafe { File::from_raw_fd(fd) });
}
