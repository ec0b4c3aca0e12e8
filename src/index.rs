//! Seek tables.
//!
//! Two granularities: the sync index records one checkpoint per emitted
//! synchronization marker (one PTS per stream), for coarse multi-stream
//! seeking; the packet index records one entry per packet, for locating
//! any individual packet without a sync boundary.
//!
//! Both are serialized as tagged, length-prefixed blocks inside the
//! footer, so an unknown block can be skipped whole.

use crate::io::{varint, BufferChannel, Channel};
use crate::{Error, Result};

/// Tag opening a sync-index block.
pub const SYNC_INDEX_TAG: [u8; 8] = *b"GAVFSIDX";

/// Tag opening a packet-index block.
pub const PACKET_INDEX_TAG: [u8; 8] = *b"GAVFPIDX";

/// Largest accepted index block (64 MB).
pub(crate) const MAX_INDEX_BLOCK: u64 = 64 * 1024 * 1024;

/// One synchronization checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct SyncEntry {
    /// Absolute byte position of the sync marker.
    pub position: u64,
    /// One PTS per stream, indexed by stream id - 1.
    pub pts: Vec<i64>,
}

/// Ordered checkpoints for coarse-grained multi-stream seeking.
///
/// Only interleaved multi-stream programs carry one; the per-entry PTS
/// array length is the program's stream count, fixed once built.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct SyncIndex {
    stream_count: usize,
    entries: Vec<SyncEntry>,
}

impl SyncIndex {
    /// Create an empty index for a program with `stream_count` streams.
    pub fn new(stream_count: usize) -> Self {
        Self {
            stream_count,
            entries: Vec::new(),
        }
    }

    /// Append a checkpoint. `pts` must hold one value per stream.
    pub fn add(&mut self, position: u64, pts: Vec<i64>) {
        debug_assert_eq!(pts.len(), self.stream_count);
        self.entries.push(SyncEntry { position, pts });
    }

    /// All checkpoints, in file order.
    pub fn entries(&self) -> &[SyncEntry] {
        &self.entries
    }

    /// Number of checkpoints.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index has no checkpoints.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Latest checkpoint whose PTS for `stream` (0-based index) is at or
    /// before `pts`. Entry point for backward seeking.
    pub fn checkpoint_before(&self, stream: usize, pts: i64) -> Option<&SyncEntry> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.pts.get(stream).is_some_and(|&p| p <= pts))
    }

    pub(crate) fn write_to<C: Channel + ?Sized>(&self, ch: &mut C) -> Result<()> {
        ch.write_all(&SYNC_INDEX_TAG)?;
        let mut block = BufferChannel::new();
        varint::write_uvarint(&mut block, self.entries.len() as u64)?;
        for entry in &self.entries {
            varint::write_uvarint(&mut block, entry.position)?;
            for &pts in &entry.pts {
                varint::write_svarint(&mut block, pts)?;
            }
        }
        varint::write_bytes(ch, block.data())
    }

    pub(crate) fn read_from<C: Channel + ?Sized>(ch: &mut C, stream_count: usize) -> Result<Self> {
        let block = varint::read_bytes(ch, MAX_INDEX_BLOCK)?;
        let mut sub = BufferChannel::from_vec(block);
        let count = varint::read_uvarint(&mut sub)?;
        let mut entries = Vec::new();
        for _ in 0..count {
            let position = varint::read_uvarint(&mut sub)?;
            let mut pts = Vec::with_capacity(stream_count);
            for _ in 0..stream_count {
                pts.push(varint::read_svarint(&mut sub)?);
            }
            entries.push(SyncEntry { position, pts });
        }
        Ok(Self {
            stream_count,
            entries,
        })
    }
}

/// One packet-index entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct PacketEntry {
    /// Owning stream id.
    pub stream_id: u32,
    /// Packet flag bits.
    pub flags: u32,
    /// Absolute byte position of the packet record.
    pub position: u64,
    /// Presentation timestamp.
    pub pts: i64,
}

/// Ordered per-packet seek table for fine-grained single-stream seeking.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct PacketIndex {
    entries: Vec<PacketEntry>,
}

impl PacketIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry.
    pub fn add(&mut self, stream_id: u32, flags: u32, position: u64, pts: i64) {
        self.entries.push(PacketEntry {
            stream_id,
            flags,
            position,
            pts,
        });
    }

    /// All entries, in file order.
    pub fn entries(&self) -> &[PacketEntry] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Latest entry for `stream_id` with PTS at or before `pts`.
    pub fn entry_at_or_before(&self, stream_id: u32, pts: i64) -> Option<&PacketEntry> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.stream_id == stream_id && e.pts <= pts)
    }

    pub(crate) fn write_to<C: Channel + ?Sized>(&self, ch: &mut C) -> Result<()> {
        ch.write_all(&PACKET_INDEX_TAG)?;
        let mut block = BufferChannel::new();
        varint::write_uvarint(&mut block, self.entries.len() as u64)?;
        for entry in &self.entries {
            varint::write_uvarint(&mut block, u64::from(entry.stream_id))?;
            varint::write_uvarint(&mut block, u64::from(entry.flags))?;
            varint::write_uvarint(&mut block, entry.position)?;
            varint::write_svarint(&mut block, entry.pts)?;
        }
        varint::write_bytes(ch, block.data())
    }

    pub(crate) fn read_from<C: Channel + ?Sized>(ch: &mut C) -> Result<Self> {
        let block = varint::read_bytes(ch, MAX_INDEX_BLOCK)?;
        let mut sub = BufferChannel::from_vec(block);
        let count = varint::read_uvarint(&mut sub)?;
        let mut entries = Vec::new();
        for _ in 0..count {
            let stream_id = varint::read_uvarint(&mut sub)?;
            let stream_id = u32::try_from(stream_id)
                .map_err(|_| Error::invalid_data("packet index stream id out of range"))?;
            let flags = varint::read_uvarint(&mut sub)? as u32;
            let position = varint::read_uvarint(&mut sub)?;
            let pts = varint::read_svarint(&mut sub)?;
            entries.push(PacketEntry {
                stream_id,
                flags,
                position,
                pts,
            });
        }
        Ok(Self { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::SeekFrom;

    #[test]
    fn test_sync_index_roundtrip() {
        let mut index = SyncIndex::new(2);
        index.add(100, vec![0, 0]);
        index.add(900, vec![4800, 3600]);
        index.add(2000, vec![9600, 7200]);

        let mut ch = BufferChannel::new();
        index.write_to(&mut ch).unwrap();
        ch.seek(SeekFrom::Start(0)).unwrap();

        let mut tag = [0u8; 8];
        ch.read_exact(&mut tag).unwrap();
        assert_eq!(tag, SYNC_INDEX_TAG);
        let back = SyncIndex::read_from(&mut ch, 2).unwrap();
        assert_eq!(index, back);
    }

    #[test]
    fn test_checkpoint_before() {
        let mut index = SyncIndex::new(1);
        index.add(10, vec![0]);
        index.add(20, vec![100]);
        index.add(30, vec![200]);

        assert_eq!(index.checkpoint_before(0, 150).unwrap().position, 20);
        assert_eq!(index.checkpoint_before(0, 200).unwrap().position, 30);
        assert_eq!(index.checkpoint_before(0, 0).unwrap().position, 10);
        assert!(index.checkpoint_before(0, -1).is_none());
    }

    #[test]
    fn test_packet_index_roundtrip_and_lookup() {
        let mut index = PacketIndex::new();
        index.add(1, 0, 100, 0);
        index.add(2, 1, 200, 0);
        index.add(1, 0, 300, 480);
        index.add(1, 0, 400, 960);

        let mut ch = BufferChannel::new();
        index.write_to(&mut ch).unwrap();
        ch.seek(SeekFrom::Start(0)).unwrap();

        let mut tag = [0u8; 8];
        ch.read_exact(&mut tag).unwrap();
        assert_eq!(tag, PACKET_INDEX_TAG);
        let back = PacketIndex::read_from(&mut ch).unwrap();
        assert_eq!(index, back);

        assert_eq!(back.entry_at_or_before(1, 500).unwrap().position, 300);
        assert_eq!(back.entry_at_or_before(2, 500).unwrap().position, 200);
        assert!(back.entry_at_or_before(3, 500).is_none());
    }

    #[cfg(feature = "serialize")]
    #[test]
    fn test_serde_roundtrip() {
        let mut index = PacketIndex::new();
        index.add(1, 0, 100, 0);
        let bytes = bincode::serialize(&index).unwrap();
        let back: PacketIndex = bincode::deserialize(&bytes).unwrap();
        assert_eq!(index, back);
    }
}
