//! Packet records and the flag-driven packet codec.
//!
//! A packet header only carries the fields that cannot be derived from
//! context: PTS is omitted when it equals the stream's running predictor
//! (last PTS + last duration), duration when it equals the stream's
//! declared default. The per-stream [`PacketCoder`] holds that context on
//! both sides of the wire.

use crate::io::{varint, Channel};
use crate::{Error, Result};

/// Wire tag opening every packet record.
pub const PACKET_TAG: u8 = b'P';

/// Longest accepted packet payload.
const MAX_PACKET_SIZE: u64 = 1 << 26;

/// Packet flag bits.
pub mod flags {
    /// Sync point: decoding can start at this packet.
    pub const SYNC: u32 = 1 << 0;
    /// Timestamp discontinuity: the PTS is an anchor, not an increment.
    pub const DISCONT: u32 = 1 << 1;
    /// Erasure marker: carries bytes but produces no output.
    pub const NO_OUTPUT: u32 = 1 << 2;
    /// Second field of an interlaced frame pair, sharing field 1's PTS.
    pub const FIELD2: u32 = 1 << 3;

    /// Wire-only: an explicit PTS field follows.
    pub(crate) const HAS_PTS: u32 = 1 << 4;
    /// Wire-only: an explicit duration field follows.
    pub(crate) const HAS_DURATION: u32 = 1 << 5;

    pub(crate) const PUBLIC_MASK: u32 = SYNC | DISCONT | NO_OUTPUT | FIELD2;
}

/// One multiplexed packet.
///
/// `duration < 0` is the end-of-stream sentinel; the engine never surfaces
/// such a packet as data. The demuxer reuses one `Packet` per stream
/// across reads; use [`crate::Demuxer::read_packet_into`] to copy into a
/// caller-owned packet instead.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Packet {
    /// Owning stream id (1-based).
    pub stream_id: u32,
    /// Presentation timestamp in the owning stream's timescale.
    pub pts: i64,
    /// Duration in the owning stream's timescale.
    pub duration: i64,
    /// Flag bits from [`flags`].
    pub flags: u32,
    /// Opaque payload bytes.
    pub data: Vec<u8>,
}

impl Packet {
    /// Create a packet.
    pub fn new(stream_id: u32, pts: i64, duration: i64, data: impl Into<Vec<u8>>) -> Self {
        Self {
            stream_id,
            pts,
            duration,
            flags: 0,
            data: data.into(),
        }
    }

    /// Whether this packet is a sync point.
    pub fn is_sync(&self) -> bool {
        self.flags & flags::SYNC != 0
    }

    /// Whether this packet is an erasure marker.
    pub fn is_no_output(&self) -> bool {
        self.flags & flags::NO_OUTPUT != 0
    }

    /// Whether this packet is the end-of-stream sentinel.
    pub fn is_end_of_stream(&self) -> bool {
        self.duration < 0
    }

    /// Copy this packet's fields into `dst`, reusing its payload allocation.
    pub fn clone_into(&self, dst: &mut Packet) {
        dst.stream_id = self.stream_id;
        dst.pts = self.pts;
        dst.duration = self.duration;
        dst.flags = self.flags;
        dst.data.clear();
        dst.data.extend_from_slice(&self.data);
    }
}

/// Per-stream packet codec state.
///
/// One coder per stream per session direction. The same state drives both
/// encoding (deciding which fields to omit) and decoding (reconstructing
/// them).
#[derive(Debug)]
pub struct PacketCoder {
    stream_id: u32,
    default_duration: i64,
    next_pts: Option<i64>,
    pts_offset: Option<i64>,
}

impl PacketCoder {
    /// Create a coder for one stream.
    pub fn new(stream_id: u32, default_duration: i64) -> Self {
        Self {
            stream_id,
            default_duration,
            next_pts: None,
            pts_offset: None,
        }
    }

    /// Stream this coder belongs to.
    pub fn stream_id(&self) -> u32 {
        self.stream_id
    }

    /// Predicted PTS of the next packet, if the predictor is established.
    pub fn next_pts(&self) -> Option<i64> {
        self.next_pts
    }

    /// Drop the PTS predictor so the next packet carries an explicit PTS.
    ///
    /// Invoked on both sides at sync markers, which must be decodable
    /// entry points. The per-stream PTS offset survives.
    pub fn resync(&mut self) {
        self.next_pts = None;
    }

    /// PTS offset subtracted from every surfaced packet of this stream.
    pub fn pts_offset(&self) -> Option<i64> {
        self.pts_offset
    }

    /// Pin the PTS offset before any packet is decoded.
    ///
    /// Used when the stream's true start time is known from footer
    /// statistics, so that a seek does not mistake a mid-file packet for
    /// the stream start.
    pub(crate) fn set_pts_offset(&mut self, offset: i64) {
        self.pts_offset = Some(offset);
    }

    /// Encode one packet record.
    pub fn write_packet<C: Channel + ?Sized>(&mut self, ch: &mut C, packet: &Packet) -> Result<()> {
        if packet.duration < 0 {
            return Err(Error::invalid_data(
                "end-of-stream sentinel packets are not written to the wire",
            ));
        }

        let mut wire_flags = packet.flags & flags::PUBLIC_MASK;

        // Field 2 of an interlaced pair repeats field 1's PTS, which the
        // predictor has already advanced past.
        let explicit_pts = wire_flags & (flags::DISCONT | flags::FIELD2) != 0
            || self.next_pts != Some(packet.pts);
        if explicit_pts {
            wire_flags |= flags::HAS_PTS;
        }

        let explicit_duration = self.default_duration == 0 || packet.duration != self.default_duration;
        if explicit_duration {
            wire_flags |= flags::HAS_DURATION;
        }

        ch.write_all(&[PACKET_TAG])?;
        varint::write_uvarint(ch, u64::from(self.stream_id))?;
        varint::write_uvarint(ch, u64::from(wire_flags))?;
        if explicit_pts {
            varint::write_svarint(ch, packet.pts)?;
        }
        if explicit_duration {
            varint::write_uvarint(ch, packet.duration as u64)?;
        }
        varint::write_bytes(ch, &packet.data)?;

        self.next_pts = Some(packet.pts + packet.duration);
        Ok(())
    }

    /// Decode one packet body into `packet`.
    ///
    /// The caller has already consumed the tag byte and stream id. The
    /// per-stream PTS offset is established from the first packet seen so
    /// that the stream reads from time ≈ 0.
    pub fn read_packet<C: Channel + ?Sized>(&mut self, ch: &mut C, packet: &mut Packet) -> Result<()> {
        let wire_flags = varint::read_uvarint(ch)? as u32;

        let pts = if wire_flags & flags::HAS_PTS != 0 {
            varint::read_svarint(ch)?
        } else {
            self.next_pts.ok_or_else(|| {
                Error::invalid_data(format!(
                    "stream {}: packet omits PTS but no predictor is established",
                    self.stream_id
                ))
            })?
        };

        let duration = if wire_flags & flags::HAS_DURATION != 0 {
            varint::read_uvarint(ch)? as i64
        } else {
            self.default_duration
        };

        let data = varint::read_bytes(ch, MAX_PACKET_SIZE)?;

        let offset = *self.pts_offset.get_or_insert(pts);
        self.next_pts = Some(pts + duration);

        packet.stream_id = self.stream_id;
        packet.pts = pts - offset;
        packet.duration = duration;
        packet.flags = wire_flags & flags::PUBLIC_MASK;
        packet.data = data;
        Ok(())
    }
}
