//! Classic pcap trace file codec.
//!
//! Writes and reads the original libpcap file format: a 24-byte global
//! header followed by 16-byte per-record headers and raw frame bytes.
//! Output is always uncompressed; all I/O happens on the calling thread.
//!
//! Readers accept files of either byte order. Writers emit native byte
//! order, which is what the rest of the toolchain around this daemon
//! expects.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use thiserror::Error;

use crate::packet::Packet;

/// Magic number of a microsecond-resolution pcap file.
const PCAP_MAGIC: u32 = 0xa1b2_c3d4;

/// The same magic as read from a file of the opposite endianness.
const PCAP_MAGIC_SWAPPED: u32 = 0xd4c3_b2a1;

const PCAP_VERSION_MAJOR: u16 = 2;
const PCAP_VERSION_MINOR: u16 = 4;

/// Snap length advertised in the global header.
const PCAP_SNAPLEN: u32 = 65535;

/// DLT_EN10MB: Ethernet link type.
const LINKTYPE_ETHERNET: u32 = 1;

/// Upper bound on a single record's captured length. A record claiming
/// more than this is treated as corruption rather than an allocation
/// request.
const MAX_RECORD_LEN: u32 = 1 << 20;

/// Errors from reading or writing trace files.
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("not a pcap file (magic {0:#010x})")]
    BadMagic(u32),

    #[error("truncated trace file")]
    Truncated,

    #[error("corrupt record (captured length {0})")]
    BadRecord(u32),
}

/// Strip a leading `scheme:` prefix from a trace URI, yielding a bare
/// filesystem path. A path without a scheme is returned unchanged.
pub fn strip_scheme(uri: &str) -> &str {
    match uri.split_once(':') {
        Some((_, path)) => path,
        None => uri,
    }
}

/// Encode the pcap global header into `buf`.
pub fn encode_file_header(buf: &mut Vec<u8>) {
    buf.extend_from_slice(&PCAP_MAGIC.to_ne_bytes());
    buf.extend_from_slice(&PCAP_VERSION_MAJOR.to_ne_bytes());
    buf.extend_from_slice(&PCAP_VERSION_MINOR.to_ne_bytes());
    buf.extend_from_slice(&0i32.to_ne_bytes()); // thiszone
    buf.extend_from_slice(&0u32.to_ne_bytes()); // sigfigs
    buf.extend_from_slice(&PCAP_SNAPLEN.to_ne_bytes());
    buf.extend_from_slice(&LINKTYPE_ETHERNET.to_ne_bytes());
}

/// Encode one packet record (header plus frame bytes) into `buf`.
pub fn encode_record(packet: &Packet, buf: &mut Vec<u8>) {
    buf.extend_from_slice(&packet.ts_sec.to_ne_bytes());
    buf.extend_from_slice(&packet.ts_usec.to_ne_bytes());
    buf.extend_from_slice(&packet.cap_len().to_ne_bytes());
    buf.extend_from_slice(&packet.orig_len.to_ne_bytes());
    buf.extend_from_slice(&packet.data);
}

/// Blocking trace file writer used for the merged output.
///
/// The hot-path interim files use [`crate::fast_writer::FastTraceWriter`]
/// instead; the merger can afford to block.
pub struct TraceWriter<W: Write> {
    inner: W,
}

impl TraceWriter<BufWriter<File>> {
    /// Create a trace file at `uri` (any `scheme:` prefix is ignored) and
    /// write the global header.
    pub fn create(uri: &str) -> Result<Self, TraceError> {
        let file = File::create(strip_scheme(uri))?;
        TraceWriter::from_writer(BufWriter::new(file))
    }
}

impl<W: Write> TraceWriter<W> {
    /// Wrap an arbitrary writer and emit the global header.
    pub fn from_writer(mut inner: W) -> Result<Self, TraceError> {
        let mut header = Vec::with_capacity(24);
        encode_file_header(&mut header);
        inner.write_all(&header)?;
        Ok(Self { inner })
    }

    /// Append one packet record.
    pub fn write_packet(&mut self, packet: &Packet) -> Result<(), TraceError> {
        let mut buf = Vec::with_capacity(16 + packet.data.len());
        encode_record(packet, &mut buf);
        self.inner.write_all(&buf)?;
        Ok(())
    }

    /// Flush and close the writer.
    pub fn finish(mut self) -> Result<(), TraceError> {
        self.inner.flush()?;
        Ok(())
    }
}

/// Streaming trace file reader.
pub struct TraceReader<R: Read> {
    inner: R,
    swapped: bool,
}

impl TraceReader<BufReader<File>> {
    /// Open a trace file at `uri` (any `scheme:` prefix is ignored).
    pub fn open(uri: &str) -> Result<Self, TraceError> {
        let file = File::open(strip_scheme(uri))?;
        TraceReader::from_reader(BufReader::new(file))
    }

    /// Open a trace file by filesystem path.
    pub fn open_path(path: &Path) -> Result<Self, TraceError> {
        let file = File::open(path)?;
        TraceReader::from_reader(BufReader::new(file))
    }
}

impl<R: Read> TraceReader<R> {
    /// Wrap an arbitrary reader, consuming and validating the global
    /// header.
    pub fn from_reader(mut inner: R) -> Result<Self, TraceError> {
        let mut header = [0u8; 24];
        read_exact_or_truncated(&mut inner, &mut header)?;

        let magic = u32::from_ne_bytes([header[0], header[1], header[2], header[3]]);
        let swapped = match magic {
            PCAP_MAGIC => false,
            PCAP_MAGIC_SWAPPED => true,
            other => return Err(TraceError::BadMagic(other)),
        };

        Ok(Self { inner, swapped })
    }

    /// Read the next packet. Returns `Ok(None)` at a clean end of stream.
    pub fn next_packet(&mut self) -> Result<Option<Packet>, TraceError> {
        let mut header = [0u8; 16];
        match self.inner.read(&mut header)? {
            0 => return Ok(None),
            16 => {}
            n => {
                // Partial header: finish the read or report truncation.
                read_exact_or_truncated(&mut self.inner, &mut header[n..])?;
            }
        }

        let ts_sec = self.field(&header[0..4]);
        let ts_usec = self.field(&header[4..8]);
        let cap_len = self.field(&header[8..12]);
        let orig_len = self.field(&header[12..16]);

        if cap_len > MAX_RECORD_LEN {
            return Err(TraceError::BadRecord(cap_len));
        }

        let mut data = vec![0u8; cap_len as usize];
        read_exact_or_truncated(&mut self.inner, &mut data)?;

        Ok(Some(Packet {
            ts_sec,
            ts_usec,
            orig_len,
            data,
        }))
    }

    fn field(&self, bytes: &[u8]) -> u32 {
        let raw = u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if self.swapped {
            raw.swap_bytes()
        } else {
            raw
        }
    }
}

fn read_exact_or_truncated<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<(), TraceError> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            TraceError::Truncated
        } else {
            TraceError::Io(e)
        }
    })
}
