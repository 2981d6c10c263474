//! Per-thread capture statistics and the `.stats` sidecar format.
//!
//! Statistics are cumulative counters sampled from the capture source. A
//! source may be unable to measure some fields; those are absent and are
//! rendered as `-1` in the sidecar so downstream tooling can tell "zero"
//! from "not measured".

use std::io::{self, Write};

/// Thread id used for the aggregated summary lines.
pub const SUMMARY_THREAD_ID: i64 = -1;

/// Cumulative capture counters for one worker thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub accepted: Option<u64>,
    pub filtered: Option<u64>,
    pub received: Option<u64>,
    pub dropped: Option<u64>,
    pub captured: Option<u64>,
    pub missing: Option<u64>,
    pub errors: Option<u64>,
}

impl CaptureStats {
    /// Fold another worker's counters into this aggregate. A field becomes
    /// valid in the aggregate as soon as any contributor has it.
    pub fn absorb(&mut self, other: &CaptureStats) {
        merge_field(&mut self.accepted, other.accepted);
        merge_field(&mut self.filtered, other.filtered);
        merge_field(&mut self.received, other.received);
        merge_field(&mut self.dropped, other.dropped);
        merge_field(&mut self.captured, other.captured);
        merge_field(&mut self.missing, other.missing);
        merge_field(&mut self.errors, other.errors);
    }

    fn fields(&self) -> [(&'static str, Option<u64>); 7] {
        [
            ("accepted", self.accepted),
            ("filtered", self.filtered),
            ("received", self.received),
            ("dropped", self.dropped),
            ("captured", self.captured),
            ("missing", self.missing),
            ("errors", self.errors),
        ]
    }
}

fn merge_field(dst: &mut Option<u64>, src: Option<u64>) {
    if let Some(value) = src {
        *dst = Some(dst.unwrap_or(0) + value);
    }
}

/// Write the `.stats` sidecar for one merged interval.
///
/// Schema: a `time:` line, one line per field per reporting worker, the
/// same fields aggregated under thread id `-1`, and the merge duration.
pub fn write_stats_file<W: Write>(
    out: &mut W,
    timestamp: u32,
    reports: &[(usize, Option<CaptureStats>)],
    merge_duration_msec: u64,
) -> io::Result<()> {
    writeln!(out, "time:{}", timestamp)?;

    let mut overall = CaptureStats::default();
    for (worker_id, stats) in reports {
        let stats = stats.unwrap_or_default();
        write_fields(out, *worker_id as i64, &stats)?;
        overall.absorb(&stats);
    }
    write_fields(out, SUMMARY_THREAD_ID, &overall)?;

    writeln!(out, "merge_duration_msec:{}", merge_duration_msec)?;
    Ok(())
}

fn write_fields<W: Write>(out: &mut W, thread_id: i64, stats: &CaptureStats) -> io::Result<()> {
    for (name, value) in stats.fields() {
        let rendered = value.map(|v| v as i64).unwrap_or(-1);
        writeln!(out, "thread:{} {}_pkts:{}", thread_id, name, rendered)?;
    }
    Ok(())
}
