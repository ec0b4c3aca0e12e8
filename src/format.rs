//! Stream format descriptors.
//!
//! The core serializes, deserializes, and diffs these records; it never
//! interprets pixel or sample semantics. Numeric sub-format codes (pixel
//! format, sample format) travel as opaque integers.

use crate::io::{varint, Channel};
use crate::{Error, Result};

/// Longest accepted codec-header blob on the wire.
const MAX_CODEC_HEADER: u64 = 1 << 20;

/// Timescale of message streams, which carry no format descriptor.
pub const MESSAGE_TIMESCALE: u32 = 1_000_000;

/// Numeric codec identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct CodecId(pub u32);

impl CodecId {
    /// Reserved id for unknown/absent compression.
    pub const NONE: Self = Self(0);
    pub const PCM: Self = Self(1);
    pub const OPUS: Self = Self(2);
    pub const AAC: Self = Self(3);
    pub const H264: Self = Self(16);
    pub const HEVC: Self = Self(17);
    pub const AV1: Self = Self(18);
    pub const UTF8: Self = Self(32);

    /// Human-readable name for known ids.
    pub fn as_str(&self) -> &'static str {
        match *self {
            Self::NONE => "none",
            Self::PCM => "pcm",
            Self::OPUS => "opus",
            Self::AAC => "aac",
            Self::H264 => "h264",
            Self::HEVC => "hevc",
            Self::AV1 => "av1",
            Self::UTF8 => "utf8",
            _ => "unknown",
        }
    }
}

impl std::fmt::Display for CodecId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.as_str(), self.0)
    }
}

/// Compression/codec descriptor attached to audio, video, and overlay
/// streams.
///
/// `bitrate` and `max_packet_size` of 0 mean unset; footer finalization
/// fills them from accumulated statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Compression {
    /// Codec identifier; [`CodecId::NONE`] when unknown.
    pub codec: CodecId,
    /// Codec-level flags, opaque to the container.
    pub flags: u32,
    /// Out-of-band codec configuration (SPS/PPS, extradata, ...).
    pub codec_header: Vec<u8>,
    /// Nominal bitrate in bits per second; 0 = unset.
    pub bitrate: i32,
    /// Largest packet payload in bytes; 0 = unset.
    pub max_packet_size: u32,
}

impl Default for CodecId {
    fn default() -> Self {
        Self::NONE
    }
}

impl Compression {
    /// Descriptor for a stream with no compression info.
    pub fn none() -> Self {
        Self::default()
    }

    fn write_to<C: Channel + ?Sized>(&self, ch: &mut C) -> Result<()> {
        varint::write_uvarint(ch, u64::from(self.codec.0))?;
        varint::write_uvarint(ch, u64::from(self.flags))?;
        varint::write_bytes(ch, &self.codec_header)?;
        varint::write_svarint(ch, i64::from(self.bitrate))?;
        varint::write_uvarint(ch, u64::from(self.max_packet_size))?;
        Ok(())
    }

    fn read_from<C: Channel + ?Sized>(ch: &mut C) -> Result<Self> {
        Ok(Self {
            codec: CodecId(read_u32(ch)?),
            flags: read_u32(ch)?,
            codec_header: varint::read_bytes(ch, MAX_CODEC_HEADER)?,
            bitrate: varint::read_svarint(ch)? as i32,
            max_packet_size: read_u32(ch)?,
        })
    }
}

/// Audio format descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioFormat {
    /// Samples per second; also the stream timescale.
    pub sample_rate: u32,
    /// Channel count.
    pub channels: u32,
    /// Opaque sample-format code.
    pub sample_format: u32,
    /// Samples per packet for fixed-frame codecs; 0 = variable.
    pub samples_per_frame: u32,
}

impl AudioFormat {
    fn write_to<C: Channel + ?Sized>(&self, ch: &mut C) -> Result<()> {
        varint::write_uvarint(ch, u64::from(self.sample_rate))?;
        varint::write_uvarint(ch, u64::from(self.channels))?;
        varint::write_uvarint(ch, u64::from(self.sample_format))?;
        varint::write_uvarint(ch, u64::from(self.samples_per_frame))?;
        Ok(())
    }

    fn read_from<C: Channel + ?Sized>(ch: &mut C) -> Result<Self> {
        Ok(Self {
            sample_rate: read_u32(ch)?,
            channels: read_u32(ch)?,
            sample_format: read_u32(ch)?,
            samples_per_frame: read_u32(ch)?,
        })
    }
}

/// Frame-rate mode of a video stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RateMode {
    /// Every frame has the same duration (`frame_duration`).
    Constant,
    /// Frame durations vary; `frame_duration` is an average at best.
    #[default]
    Variable,
}

/// Video format descriptor, shared by video and overlay streams.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VideoFormat {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Opaque pixel-format code.
    pub pixel_format: u32,
    /// Ticks per second for PTS/duration values of this stream.
    pub timescale: u32,
    /// Frame duration in timescale ticks; meaningful when `rate_mode` is
    /// constant, average otherwise. 0 = unknown.
    pub frame_duration: u32,
    /// Whether the frame rate is constant.
    pub rate_mode: RateMode,
    /// Frame-size alignment requirement; 0 = none.
    pub frame_align: u32,
}

impl VideoFormat {
    fn write_to<C: Channel + ?Sized>(&self, ch: &mut C) -> Result<()> {
        varint::write_uvarint(ch, u64::from(self.width))?;
        varint::write_uvarint(ch, u64::from(self.height))?;
        varint::write_uvarint(ch, u64::from(self.pixel_format))?;
        varint::write_uvarint(ch, u64::from(self.timescale))?;
        varint::write_uvarint(ch, u64::from(self.frame_duration))?;
        let rate = match self.rate_mode {
            RateMode::Constant => 0u64,
            RateMode::Variable => 1,
        };
        varint::write_uvarint(ch, rate)?;
        varint::write_uvarint(ch, u64::from(self.frame_align))?;
        Ok(())
    }

    fn read_from<C: Channel + ?Sized>(ch: &mut C) -> Result<Self> {
        let width = read_u32(ch)?;
        let height = read_u32(ch)?;
        let pixel_format = read_u32(ch)?;
        let timescale = read_u32(ch)?;
        let frame_duration = read_u32(ch)?;
        let rate_mode = match varint::read_uvarint(ch)? {
            0 => RateMode::Constant,
            1 => RateMode::Variable,
            other => {
                return Err(Error::invalid_data(format!(
                    "unknown frame-rate mode {other}"
                )))
            }
        };
        let frame_align = read_u32(ch)?;
        Ok(Self {
            width,
            height,
            pixel_format,
            timescale,
            frame_duration,
            rate_mode,
            frame_align,
        })
    }
}

/// Per-type payload of a stream header.
///
/// Closed sum over the five stream types; every read/write/dump site
/// matches exhaustively so a new stream type is a compile-time-checked
/// change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFormat {
    Audio(Compression, AudioFormat),
    Video(Compression, VideoFormat),
    /// Shares the video descriptor; declared overlays force variable rate
    /// and zero frame alignment.
    Overlay(Compression, VideoFormat),
    Text {
        /// Ticks per second for PTS/duration values.
        timescale: u32,
    },
    Message,
}

impl StreamFormat {
    /// Wire tag for this stream type.
    pub fn kind_tag(&self) -> u64 {
        match self {
            Self::Audio(..) => 1,
            Self::Video(..) => 2,
            Self::Text { .. } => 3,
            Self::Overlay(..) => 4,
            Self::Message => 5,
        }
    }

    /// Human-readable stream type name.
    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::Audio(..) => "audio",
            Self::Video(..) => "video",
            Self::Text { .. } => "text",
            Self::Overlay(..) => "overlay",
            Self::Message => "message",
        }
    }

    /// Ticks per second for PTS/duration values of this stream.
    pub fn timescale(&self) -> u32 {
        match self {
            Self::Audio(_, af) => af.sample_rate,
            Self::Video(_, vf) | Self::Overlay(_, vf) => vf.timescale,
            Self::Text { timescale } => *timescale,
            Self::Message => MESSAGE_TIMESCALE,
        }
    }

    /// Compression descriptor, for the types that carry one.
    pub fn compression(&self) -> Option<&Compression> {
        match self {
            Self::Audio(c, _) | Self::Video(c, _) | Self::Overlay(c, _) => Some(c),
            Self::Text { .. } | Self::Message => None,
        }
    }

    pub(crate) fn write_to<C: Channel + ?Sized>(&self, ch: &mut C) -> Result<()> {
        match self {
            Self::Audio(comp, af) => {
                comp.write_to(ch)?;
                af.write_to(ch)
            }
            Self::Video(comp, vf) | Self::Overlay(comp, vf) => {
                comp.write_to(ch)?;
                vf.write_to(ch)
            }
            Self::Text { timescale } => varint::write_uvarint(ch, u64::from(*timescale)),
            Self::Message => Ok(()),
        }
    }

    pub(crate) fn read_from<C: Channel + ?Sized>(ch: &mut C, kind_tag: u64) -> Result<Self> {
        match kind_tag {
            1 => Ok(Self::Audio(
                Compression::read_from(ch)?,
                AudioFormat::read_from(ch)?,
            )),
            2 => Ok(Self::Video(
                Compression::read_from(ch)?,
                VideoFormat::read_from(ch)?,
            )),
            3 => Ok(Self::Text {
                timescale: read_u32(ch)?,
            }),
            4 => Ok(Self::Overlay(
                Compression::read_from(ch)?,
                VideoFormat::read_from(ch)?,
            )),
            5 => Ok(Self::Message),
            other => Err(Error::invalid_data(format!(
                "unknown stream type tag {other}"
            ))),
        }
    }
}

fn read_u32<C: Channel + ?Sized>(ch: &mut C) -> Result<u32> {
    let v = varint::read_uvarint(ch)?;
    u32::try_from(v).map_err(|_| Error::invalid_data(format!("value {v} does not fit in u32")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{BufferChannel, Channel, SeekFrom};

    #[test]
    fn test_stream_format_roundtrip() {
        let formats = vec![
            StreamFormat::Audio(
                Compression {
                    codec: CodecId::OPUS,
                    flags: 0,
                    codec_header: vec![1, 2, 3],
                    bitrate: 0,
                    max_packet_size: 0,
                },
                AudioFormat {
                    sample_rate: 48_000,
                    channels: 2,
                    sample_format: 7,
                    samples_per_frame: 960,
                },
            ),
            StreamFormat::Video(
                Compression::none(),
                VideoFormat {
                    width: 1920,
                    height: 1080,
                    pixel_format: 3,
                    timescale: 90_000,
                    frame_duration: 3_600,
                    rate_mode: RateMode::Constant,
                    frame_align: 16,
                },
            ),
            StreamFormat::Text { timescale: 1000 },
            StreamFormat::Message,
        ];

        for format in formats {
            let mut ch = BufferChannel::new();
            format.write_to(&mut ch).unwrap();
            ch.seek(SeekFrom::Start(0)).unwrap();
            let back = StreamFormat::read_from(&mut ch, format.kind_tag()).unwrap();
            assert_eq!(format, back);
            assert_eq!(ch.position(), ch.len() as u64);
        }
    }

    #[test]
    fn test_timescale_per_type() {
        let audio = StreamFormat::Audio(
            Compression::none(),
            AudioFormat {
                sample_rate: 44_100,
                ..Default::default()
            },
        );
        assert_eq!(audio.timescale(), 44_100);
        assert_eq!(StreamFormat::Message.timescale(), MESSAGE_TIMESCALE);
        assert_eq!(StreamFormat::Text { timescale: 90 }.timescale(), 90);
    }

    #[test]
    fn test_unknown_kind_tag_rejected() {
        let mut ch = BufferChannel::new();
        assert!(StreamFormat::read_from(&mut ch, 99).is_err());
    }
}
