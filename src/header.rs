//! Program and stream headers.
//!
//! The program header is the file-level preamble describing every stream
//! before any packet data. It is written as a fixed 8-byte tag followed by
//! a length-prefixed block built in memory first, so a reader that cannot
//! interpret some future field can still skip the whole block.

use crate::format::{AudioFormat, Compression, RateMode, StreamFormat, VideoFormat};
use crate::io::{varint, BufferChannel, Channel};
use crate::meta::Metadata;
use crate::stats::StreamStats;
use crate::{Error, Result};

use tracing::debug;

/// Tag opening the program header.
pub const PROGRAM_TAG: [u8; 8] = *b"GAVFPROG";

/// Largest accepted program-header block (64 MB) to prevent OOM on
/// malformed files.
const MAX_HEADER_BLOCK: u64 = 64 * 1024 * 1024;

/// Largest accepted stream count.
const MAX_STREAMS: u64 = 4096;

/// Structural read/write event hooks.
///
/// Injected via the session options; invoked around program-header
/// serialization on the write path and parsing on the read path.
pub trait StructureHooks: Send {
    /// The program header is about to be written or parsed.
    fn on_header_start(&mut self) {}
    /// The program header was fully written or parsed.
    fn on_header_end(&mut self, _header: &ProgramHeader) {}
}

/// One logical stream's header.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamHeader {
    /// Stream id, unique and stable for the file's lifetime (1-based).
    pub id: u32,
    /// Type-specific format descriptor.
    pub format: StreamFormat,
    /// Stream metadata.
    pub metadata: Metadata,
    /// Declared per-packet default duration; 0 = none. Packets matching it
    /// omit their duration field on the wire.
    pub default_duration: i64,
    /// Running statistics, finalized from the footer.
    pub stats: StreamStats,
}

impl StreamHeader {
    /// Ticks per second for this stream's PTS/duration values.
    pub fn timescale(&self) -> u32 {
        self.format.timescale()
    }

    /// Whether packets of this stream may arrive out of file order relative
    /// to other streams. Text and message streams are discontinuous.
    pub fn is_discontinuous(&self) -> bool {
        matches!(
            self.format,
            StreamFormat::Text { .. } | StreamFormat::Message
        )
    }

    fn write_to<C: Channel + ?Sized>(&self, ch: &mut C) -> Result<()> {
        varint::write_uvarint(ch, self.format.kind_tag())?;
        varint::write_uvarint(ch, u64::from(self.id))?;
        self.metadata.write_to(ch)?;
        varint::write_svarint(ch, self.default_duration)?;
        self.format.write_to(ch)
    }

    fn read_from<C: Channel + ?Sized>(ch: &mut C) -> Result<Self> {
        let kind_tag = varint::read_uvarint(ch)?;
        let id = varint::read_uvarint(ch)?;
        let id = u32::try_from(id)
            .map_err(|_| Error::invalid_data(format!("stream id {id} out of range")))?;
        let metadata = Metadata::read_from(ch)?;
        let default_duration = varint::read_svarint(ch)?;
        let format = StreamFormat::read_from(ch, kind_tag)?;
        Ok(Self {
            id,
            format,
            metadata,
            default_duration,
            stats: StreamStats::default(),
        })
    }
}

/// The file-level preamble: global metadata plus every stream header.
///
/// Stream ids are dense, 1-based, and assigned in insertion order. Once
/// the header has been written (or fully read) the stream set is fixed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgramHeader {
    /// Global metadata.
    pub metadata: Metadata,
    streams: Vec<StreamHeader>,
}

impl ProgramHeader {
    /// Create a program with no streams.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a stream. Returns its assigned id.
    ///
    /// Caller-supplied metadata is copied with derived keys stripped; those
    /// fields are recomputed by footer finalization and must not survive
    /// from input.
    pub fn add_stream(&mut self, format: StreamFormat, mut metadata: Metadata) -> u32 {
        metadata.strip_derived();
        let id = self.streams.len() as u32 + 1;
        let default_duration = match &format {
            StreamFormat::Audio(_, af) => i64::from(af.samples_per_frame),
            StreamFormat::Video(_, vf) | StreamFormat::Overlay(_, vf) => {
                match vf.rate_mode {
                    RateMode::Constant => i64::from(vf.frame_duration),
                    RateMode::Variable => 0,
                }
            }
            StreamFormat::Text { .. } | StreamFormat::Message => 0,
        };
        self.streams.push(StreamHeader {
            id,
            format,
            metadata,
            default_duration,
            stats: StreamStats::default(),
        });
        id
    }

    /// Declare an audio stream.
    pub fn add_audio_stream(
        &mut self,
        compression: Compression,
        format: AudioFormat,
        metadata: Metadata,
    ) -> u32 {
        self.add_stream(StreamFormat::Audio(compression, format), metadata)
    }

    /// Declare a video stream.
    pub fn add_video_stream(
        &mut self,
        compression: Compression,
        format: VideoFormat,
        metadata: Metadata,
    ) -> u32 {
        self.add_stream(StreamFormat::Video(compression, format), metadata)
    }

    /// Declare an overlay stream. Overlays share the video descriptor but
    /// force variable frame rate and no frame-size alignment.
    pub fn add_overlay_stream(
        &mut self,
        compression: Compression,
        mut format: VideoFormat,
        metadata: Metadata,
    ) -> u32 {
        format.rate_mode = RateMode::Variable;
        format.frame_align = 0;
        self.add_stream(StreamFormat::Overlay(compression, format), metadata)
    }

    /// Declare a text stream with the given timescale.
    pub fn add_text_stream(&mut self, timescale: u32, metadata: Metadata) -> u32 {
        self.add_stream(StreamFormat::Text { timescale }, metadata)
    }

    /// Declare a message stream.
    pub fn add_message_stream(&mut self, metadata: Metadata) -> u32 {
        self.add_stream(StreamFormat::Message, metadata)
    }

    /// All stream headers, in id order.
    pub fn streams(&self) -> &[StreamHeader] {
        &self.streams
    }

    /// Mutable stream headers, in id order.
    pub(crate) fn streams_mut(&mut self) -> &mut [StreamHeader] {
        &mut self.streams
    }

    /// Number of streams.
    pub fn num_streams(&self) -> usize {
        self.streams.len()
    }

    /// Look up a stream by id.
    pub fn stream(&self, id: u32) -> Option<&StreamHeader> {
        self.streams.get(id.checked_sub(1)? as usize)
    }

    /// Number of streams carrying presentable data (everything but message
    /// streams). Decides synchronous vs. interleaved encoding.
    pub fn num_presentable(&self) -> usize {
        self.streams
            .iter()
            .filter(|s| !matches!(s.format, StreamFormat::Message))
            .count()
    }

    /// Write the program header: tag, then the length-prefixed block.
    pub fn write_to<C: Channel + ?Sized>(&self, ch: &mut C) -> Result<()> {
        ch.write_all(&PROGRAM_TAG)?;

        let mut block = BufferChannel::new();
        varint::write_uvarint(&mut block, self.streams.len() as u64)?;
        for stream in &self.streams {
            stream.write_to(&mut block)?;
        }
        self.metadata.write_to(&mut block)?;

        varint::write_bytes(ch, block.data())?;
        ch.flush()?;
        debug!(streams = self.streams.len(), "wrote program header");
        Ok(())
    }

    /// Read a program header.
    ///
    /// The length-prefixed block is read fully into memory and parsed from
    /// there; any nested failure fails the whole read. Trailing bytes in
    /// the block are future fields and are skipped.
    pub fn read_from<C: Channel + ?Sized>(ch: &mut C) -> Result<Self> {
        let mut tag = [0u8; 8];
        ch.read_exact(&mut tag)?;
        if tag != PROGRAM_TAG {
            return Err(Error::invalid_data(format!(
                "bad program header tag {:?}",
                String::from_utf8_lossy(&tag)
            )));
        }

        let block = varint::read_bytes(ch, MAX_HEADER_BLOCK)?;
        let mut sub = BufferChannel::from_vec(block);

        let count = varint::read_uvarint(&mut sub)?;
        if count > MAX_STREAMS {
            return Err(Error::invalid_data(format!(
                "stream count {count} exceeds limit {MAX_STREAMS}"
            )));
        }

        let mut streams = Vec::with_capacity(count as usize);
        for n in 0..count {
            let stream = StreamHeader::read_from(&mut sub)?;
            if u64::from(stream.id) != n + 1 {
                return Err(Error::invalid_data(format!(
                    "stream id {} out of order, expected {}",
                    stream.id,
                    n + 1
                )));
            }
            streams.push(stream);
        }
        let metadata = Metadata::read_from(&mut sub)?;

        debug!(streams = streams.len(), "read program header");
        Ok(Self { metadata, streams })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::SeekFrom;

    fn sample_program() -> ProgramHeader {
        let mut program = ProgramHeader::new();
        program.metadata.set("title", "round trip");
        program.add_audio_stream(
            Compression {
                codec: crate::format::CodecId::OPUS,
                codec_header: vec![9, 9],
                ..Default::default()
            },
            AudioFormat {
                sample_rate: 48_000,
                channels: 2,
                sample_format: 1,
                samples_per_frame: 960,
            },
            [("language", "eng")].into_iter().collect(),
        );
        program.add_video_stream(
            Compression::none(),
            VideoFormat {
                width: 1280,
                height: 720,
                timescale: 90_000,
                frame_duration: 3_600,
                rate_mode: RateMode::Constant,
                ..Default::default()
            },
            Metadata::new(),
        );
        program.add_text_stream(1000, Metadata::new());
        program.add_message_stream(Metadata::new());
        program
    }

    #[test]
    fn test_ids_are_dense_and_one_based() {
        let program = sample_program();
        let ids: Vec<_> = program.streams().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert_eq!(program.stream(1).unwrap().id, 1);
        assert!(program.stream(0).is_none());
        assert!(program.stream(5).is_none());
    }

    #[test]
    fn test_roundtrip() {
        let program = sample_program();
        let mut ch = BufferChannel::new();
        program.write_to(&mut ch).unwrap();
        ch.seek(SeekFrom::Start(0)).unwrap();
        let back = ProgramHeader::read_from(&mut ch).unwrap();
        assert_eq!(program, back);
    }

    #[test]
    fn test_empty_program_roundtrip() {
        let program = ProgramHeader::new();
        let mut ch = BufferChannel::new();
        program.write_to(&mut ch).unwrap();
        ch.seek(SeekFrom::Start(0)).unwrap();
        let back = ProgramHeader::read_from(&mut ch).unwrap();
        assert_eq!(back.num_streams(), 0);
    }

    #[test]
    fn test_bad_tag_rejected() {
        let mut ch = BufferChannel::from_vec(b"NOTGAVF!\x00".to_vec());
        assert!(ProgramHeader::read_from(&mut ch).is_err());
    }

    #[test]
    fn test_truncated_block_rejected() {
        let program = sample_program();
        let mut ch = BufferChannel::new();
        program.write_to(&mut ch).unwrap();
        let mut bytes = ch.into_inner();
        bytes.truncate(bytes.len() - 3);
        let mut ch = BufferChannel::from_vec(bytes);
        assert!(ProgramHeader::read_from(&mut ch).is_err());
    }

    #[test]
    fn test_derived_metadata_stripped() {
        let mut program = ProgramHeader::new();
        let id = program.add_message_stream(
            [("name", "events"), ("bitrate", "1"), ("gavf.x", "y")]
                .into_iter()
                .collect(),
        );
        let stream = program.stream(id).unwrap();
        assert_eq!(stream.metadata.get("name"), Some("events"));
        assert!(stream.metadata.get("bitrate").is_none());
        assert!(stream.metadata.get("gavf.x").is_none());
    }

    #[test]
    fn test_overlay_forces_variable_rate() {
        let mut program = ProgramHeader::new();
        let id = program.add_overlay_stream(
            Compression::none(),
            VideoFormat {
                timescale: 1000,
                frame_duration: 40,
                rate_mode: RateMode::Constant,
                frame_align: 16,
                ..Default::default()
            },
            Metadata::new(),
        );
        let StreamFormat::Overlay(_, vf) = &program.stream(id).unwrap().format else {
            panic!("not an overlay stream");
        };
        assert_eq!(vf.rate_mode, RateMode::Variable);
        assert_eq!(vf.frame_align, 0);
    }

    #[test]
    fn test_presentable_count_excludes_messages() {
        let mut program = ProgramHeader::new();
        program.add_message_stream(Metadata::new());
        program.add_text_stream(1000, Metadata::new());
        assert_eq!(program.num_presentable(), 1);
    }

    #[test]
    fn test_future_fields_in_block_are_skipped() {
        let program = sample_program();
        let mut inner = BufferChannel::new();
        varint::write_uvarint(&mut inner, program.streams.len() as u64).unwrap();
        for s in &program.streams {
            s.write_to(&mut inner).unwrap();
        }
        program.metadata.write_to(&mut inner).unwrap();
        // A future revision appends fields this version does not know.
        inner.write_all(&[0xFF; 13]).unwrap();

        let mut ch = BufferChannel::new();
        ch.write_all(&PROGRAM_TAG).unwrap();
        varint::write_bytes(&mut ch, inner.data()).unwrap();
        ch.write_all(b"after").unwrap();

        ch.seek(SeekFrom::Start(0)).unwrap();
        let back = ProgramHeader::read_from(&mut ch).unwrap();
        assert_eq!(back.num_streams(), program.num_streams());

        // The channel is positioned after the block, at the next segment.
        let mut rest = [0u8; 5];
        ch.read_exact(&mut rest).unwrap();
        assert_eq!(&rest, b"after");
    }
}
