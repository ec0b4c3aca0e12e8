//! Per-stream running statistics.
//!
//! Accumulated on every written packet and persisted in the footer. At
//! close (or when a footer is parsed on open) the statistics are finalized
//! back into the stream's format descriptor: constant-frame-rate
//! detection, derived bitrate, derived max packet size.

use crate::format::{RateMode, StreamFormat};
use crate::io::{varint, Channel};
use crate::packet::Packet;
use crate::Result;

/// Sentinel for fields that no packet has touched yet. Distinct from zero,
/// which is a legal value for every bound.
pub const UNDEFINED: i64 = i64::MIN;

/// Running statistics for one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct StreamStats {
    /// Smallest payload in bytes.
    pub size_min: i64,
    /// Largest payload in bytes.
    pub size_max: i64,
    /// Shortest packet duration.
    pub duration_min: i64,
    /// Longest packet duration.
    pub duration_max: i64,
    /// PTS of the first real packet.
    pub pts_start: i64,
    /// End time (PTS + duration) of the latest real packet.
    pub pts_end: i64,
    /// Total payload bytes, erasure packets included.
    pub total_bytes: u64,
    /// Total real (non-erasure) packets.
    pub total_packets: u64,
}

impl Default for StreamStats {
    fn default() -> Self {
        Self {
            size_min: UNDEFINED,
            size_max: UNDEFINED,
            duration_min: UNDEFINED,
            duration_max: UNDEFINED,
            pts_start: UNDEFINED,
            pts_end: UNDEFINED,
            total_bytes: 0,
            total_packets: 0,
        }
    }
}

impl StreamStats {
    /// Whether any packet has been accounted yet.
    pub fn is_empty(&self) -> bool {
        self.total_bytes == 0 && self.pts_start == UNDEFINED
    }

    /// Fold one packet into the statistics.
    ///
    /// Erasure ("no-output") packets extend byte totals but not timing or
    /// duration bounds, and do not count as packets.
    pub fn update(&mut self, packet: &Packet) {
        let size = packet.data.len() as i64;

        if self.size_min == UNDEFINED || size < self.size_min {
            self.size_min = size;
        }
        if self.size_max == UNDEFINED || size > self.size_max {
            self.size_max = size;
        }
        self.total_bytes += packet.data.len() as u64;

        if packet.is_no_output() {
            return;
        }

        let end = packet.pts + packet.duration;
        if self.pts_start == UNDEFINED {
            self.pts_start = packet.pts;
            self.pts_end = end;
            self.duration_min = packet.duration;
            self.duration_max = packet.duration;
        } else {
            if packet.duration < self.duration_min {
                self.duration_min = packet.duration;
            }
            if packet.duration > self.duration_max {
                self.duration_max = packet.duration;
            }
            if end > self.pts_end {
                self.pts_end = end;
            }
        }
        self.total_packets += 1;
    }

    /// Rewrite derived format fields from the accumulated statistics.
    ///
    /// Performed once, at write close or after a footer is parsed on open.
    pub fn finalize_into(&self, format: &mut StreamFormat) {
        if self.is_empty() {
            return;
        }

        if let StreamFormat::Video(_, vf) | StreamFormat::Overlay(_, vf) = format {
            if self.duration_min == self.duration_max && self.duration_min > 0 {
                vf.rate_mode = RateMode::Constant;
                vf.frame_duration = self.duration_min as u32;
            } else if self.total_packets > 0 {
                vf.rate_mode = RateMode::Variable;
                let avg = (self.pts_end - self.pts_start) / self.total_packets as i64;
                vf.frame_duration = avg.max(0) as u32;
            }
        }

        let timescale = i64::from(format.timescale());
        let elapsed = self.pts_end.saturating_sub(self.pts_start);
        if let StreamFormat::Audio(comp, _)
        | StreamFormat::Video(comp, _)
        | StreamFormat::Overlay(comp, _) = format
        {
            if comp.bitrate == 0 && elapsed > 0 && timescale > 0 {
                let bits = self.total_bytes as i64 * 8;
                comp.bitrate = (bits * timescale / elapsed) as i32;
            }
            if comp.max_packet_size == 0 && self.size_max > 0 {
                comp.max_packet_size = self.size_max as u32;
            }
        }
    }

    pub(crate) fn write_to<C: Channel + ?Sized>(&self, ch: &mut C) -> Result<()> {
        varint::write_svarint(ch, self.size_min)?;
        varint::write_svarint(ch, self.size_max)?;
        varint::write_svarint(ch, self.duration_min)?;
        varint::write_svarint(ch, self.duration_max)?;
        varint::write_svarint(ch, self.pts_start)?;
        varint::write_svarint(ch, self.pts_end)?;
        varint::write_uvarint(ch, self.total_bytes)?;
        varint::write_uvarint(ch, self.total_packets)?;
        Ok(())
    }

    pub(crate) fn read_from<C: Channel + ?Sized>(ch: &mut C) -> Result<Self> {
        Ok(Self {
            size_min: varint::read_svarint(ch)?,
            size_max: varint::read_svarint(ch)?,
            duration_min: varint::read_svarint(ch)?,
            duration_max: varint::read_svarint(ch)?,
            pts_start: varint::read_svarint(ch)?,
            pts_end: varint::read_svarint(ch)?,
            total_bytes: varint::read_uvarint(ch)?,
            total_packets: varint::read_uvarint(ch)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{AudioFormat, Compression, VideoFormat};
    use crate::packet::{flags, Packet};

    fn packet(pts: i64, duration: i64, size: usize) -> Packet {
        Packet {
            stream_id: 1,
            pts,
            duration,
            flags: 0,
            data: vec![0; size],
        }
    }

    #[test]
    fn test_accumulation() {
        let mut stats = StreamStats::default();
        stats.update(&packet(0, 10, 100));
        stats.update(&packet(10, 10, 50));
        stats.update(&packet(20, 5, 200));

        assert_eq!(stats.size_min, 50);
        assert_eq!(stats.size_max, 200);
        assert_eq!(stats.duration_min, 5);
        assert_eq!(stats.duration_max, 10);
        assert_eq!(stats.total_packets, 3);
        assert_eq!(stats.total_bytes, 350);
        assert_eq!(stats.pts_start, 0);
        assert_eq!(stats.pts_end, 25);
    }

    #[test]
    fn test_no_output_packets_skip_timing() {
        let mut stats = StreamStats::default();
        stats.update(&packet(0, 10, 100));

        let mut erasure = packet(100, 50, 30);
        erasure.flags = flags::NO_OUTPUT;
        stats.update(&erasure);

        assert_eq!(stats.pts_end, 10);
        assert_eq!(stats.duration_max, 10);
        assert_eq!(stats.total_packets, 1);
        assert_eq!(stats.total_bytes, 130);
        assert_eq!(stats.size_min, 30);
    }

    #[test]
    fn test_finalize_constant_frame_rate() {
        let mut stats = StreamStats::default();
        for i in 0..4 {
            stats.update(&packet(i * 3600, 3600, 100));
        }

        let mut format = StreamFormat::Video(
            Compression::none(),
            VideoFormat {
                timescale: 90_000,
                rate_mode: RateMode::Variable,
                ..Default::default()
            },
        );
        stats.finalize_into(&mut format);

        let StreamFormat::Video(comp, vf) = &format else {
            unreachable!()
        };
        assert_eq!(vf.rate_mode, RateMode::Constant);
        assert_eq!(vf.frame_duration, 3600);
        // 400 bytes over 14400/90000 s
        assert_eq!(comp.bitrate, 400 * 8 * 90_000 / 14_400);
        assert_eq!(comp.max_packet_size, 100);
    }

    #[test]
    fn test_finalize_variable_frame_rate() {
        let mut stats = StreamStats::default();
        stats.update(&packet(0, 100, 10));
        stats.update(&packet(100, 200, 10));

        let mut format = StreamFormat::Video(Compression::none(), VideoFormat::default());
        stats.finalize_into(&mut format);

        let StreamFormat::Video(_, vf) = &format else {
            unreachable!()
        };
        assert_eq!(vf.rate_mode, RateMode::Variable);
        assert_eq!(vf.frame_duration, 150);
    }

    #[test]
    fn test_finalize_keeps_explicit_bitrate() {
        let mut stats = StreamStats::default();
        stats.update(&packet(0, 480, 100));

        let mut format = StreamFormat::Audio(
            Compression {
                bitrate: 64_000,
                ..Default::default()
            },
            AudioFormat {
                sample_rate: 48_000,
                ..Default::default()
            },
        );
        stats.finalize_into(&mut format);

        let StreamFormat::Audio(comp, _) = &format else {
            unreachable!()
        };
        assert_eq!(comp.bitrate, 64_000);
        assert_eq!(comp.max_packet_size, 100);
    }

    #[test]
    fn test_wire_roundtrip_with_undefined() {
        use crate::io::{BufferChannel, Channel, SeekFrom};

        let stats = StreamStats::default();
        let mut ch = BufferChannel::new();
        stats.write_to(&mut ch).unwrap();
        ch.seek(SeekFrom::Start(0)).unwrap();
        assert_eq!(StreamStats::read_from(&mut ch).unwrap(), stats);
    }
}
