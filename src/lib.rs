//! GAVF: a self-describing binary container for multiplexed packet streams.
//!
//! This crate implements the GAVF container format: independently-timed
//! audio/video/overlay/text/message packet streams interleaved into one
//! byte stream, with enough structural metadata to reconstruct per-stream
//! formats and trailing indices for backward seeking without a full scan.
//!
//! # Modules
//!
//! - `io` - pluggable byte channels (memory, file, TLS socket) and the
//!   integer codecs
//! - `header` - program/stream header model and codec
//! - `packet` - packet records and the flag-driven packet codec
//! - `cache` - bounded PTS-reordering cache
//! - `stats` - per-stream running statistics and finalization
//! - `index` - sync and packet seek tables
//! - `footer` - trailing footer block
//! - `demux` - read-side session
//! - `mux` - write-side session
//!
//! # Architecture
//!
//! Write path: packets flow through [`Muxer::put_packet`], which updates
//! footer statistics, interleaves around synchronization markers, and
//! encodes through the per-stream packet coder onto the channel. At close
//! the footer (statistics plus optional indices) is appended with a
//! fixed-width back-pointer in the file's last 16 bytes.
//!
//! Read path: [`Demuxer::open`] parses the program header, probes the
//! footer when the channel is seekable, and exposes per-stream pulls that
//! delegate to one shared fill step routing each record to its owning
//! stream's queue.
//!
//! # Example
//!
//! ```
//! use gavf::{
//!     AudioFormat, BufferChannel, Channel, Compression, Demuxer, Metadata, Muxer,
//!     MuxOptions, Packet, ProgramHeader, ReadOptions, SeekFrom,
//! };
//!
//! # fn main() -> gavf::Result<()> {
//! let mut program = ProgramHeader::new();
//! let stream = program.add_audio_stream(
//!     Compression::none(),
//!     AudioFormat { sample_rate: 48_000, channels: 2, ..Default::default() },
//!     Metadata::new(),
//! );
//!
//! let mut muxer = Muxer::new(BufferChannel::new(), MuxOptions::default());
//! muxer.write_header(program)?;
//! muxer.put_packet(Packet::new(stream, 0, 960, vec![0u8; 16]))?;
//! let mut channel = muxer.close()?;
//!
//! channel.seek(SeekFrom::Start(0))?;
//! let mut demuxer = Demuxer::open(channel, ReadOptions::default())?;
//! let packet = demuxer.read_packet(stream)?;
//! assert_eq!(packet.duration, 960);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod demux;
pub mod error;
pub mod footer;
pub mod format;
pub mod header;
pub mod index;
pub mod io;
pub mod meta;
pub mod mux;
pub mod packet;
pub mod stats;

pub use cache::PtsCache;
pub use demux::{Demuxer, ReadLock, ReadOptions};
pub use error::{Error, Result};
pub use format::{
    AudioFormat, CodecId, Compression, RateMode, StreamFormat, VideoFormat, MESSAGE_TIMESCALE,
};
pub use header::{ProgramHeader, StreamHeader, StructureHooks};
pub use index::{PacketEntry, PacketIndex, SyncEntry, SyncIndex};
pub use io::{
    ensure_crypto_initialized, BufferChannel, Channel, FileChannel, SeekFrom, TlsChannel,
};
pub use meta::Metadata;
pub use mux::{MuxOptions, Muxer, SessionMode};
pub use packet::{flags, Packet};
pub use stats::{StreamStats, UNDEFINED};
