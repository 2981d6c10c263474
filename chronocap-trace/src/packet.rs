//! Captured packet representation.
//!
//! A `Packet` is a copy of one captured frame plus its capture timestamp at
//! microsecond resolution. Workers append packets to interim files in
//! arrival order; the merger compares packets across workers by
//! `ts_micros()` to restore a single chronological order.

/// Ethertype for 802.1Q VLAN tagging.
const ETHERTYPE_VLAN: u16 = 0x8100;
/// Ethertype for 802.1ad provider bridging (QinQ outer tag).
const ETHERTYPE_QINQ: u16 = 0x88a8;
/// Legacy QinQ ethertype still seen in the wild.
const ETHERTYPE_QINQ_OLD: u16 = 0x9100;

/// Offset of the ethertype field in an untagged Ethernet header.
const ETHERTYPE_OFFSET: usize = 12;

/// One captured packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Capture timestamp, Unix seconds.
    pub ts_sec: u32,
    /// Capture timestamp, microseconds within the second.
    pub ts_usec: u32,
    /// Original length of the frame on the wire. May exceed `data.len()`
    /// when the capture was truncated by a snap length.
    pub orig_len: u32,
    /// Captured frame bytes, starting at the layer-2 header.
    pub data: Vec<u8>,
}

impl Packet {
    /// Create a packet whose captured bytes are the full frame.
    pub fn new(ts_sec: u32, ts_usec: u32, data: Vec<u8>) -> Self {
        let orig_len = data.len() as u32;
        Self {
            ts_sec,
            ts_usec,
            orig_len,
            data,
        }
    }

    /// Number of captured bytes.
    pub fn cap_len(&self) -> u32 {
        self.data.len() as u32
    }

    /// High-resolution timestamp for chronological comparison.
    pub fn ts_micros(&self) -> u64 {
        self.ts_sec as u64 * 1_000_000 + self.ts_usec as u64
    }

    /// Remove layer-2 VLAN tags from the frame, repeatedly for stacked
    /// (QinQ) tags. Both the captured and the on-wire lengths shrink by
    /// four bytes per removed tag.
    ///
    /// Non-trivial cost per packet; callers should only enable this when
    /// tagged traffic is actually expected.
    pub fn strip_vlans(&mut self) {
        loop {
            if self.data.len() < ETHERTYPE_OFFSET + 4 {
                return;
            }
            let ethertype = u16::from_be_bytes([
                self.data[ETHERTYPE_OFFSET],
                self.data[ETHERTYPE_OFFSET + 1],
            ]);
            match ethertype {
                ETHERTYPE_VLAN | ETHERTYPE_QINQ | ETHERTYPE_QINQ_OLD => {
                    // Drop the tag: the 4 bytes starting at the ethertype.
                    // The inner ethertype slides into its place.
                    self.data.drain(ETHERTYPE_OFFSET..ETHERTYPE_OFFSET + 4);
                    self.orig_len = self.orig_len.saturating_sub(4);
                }
                _ => return,
            }
        }
    }
}
