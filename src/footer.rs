//! Trailing footer block.
//!
//! Written append-only at normal close: a fixed tag, per-stream raw
//! statistics, the optional index blocks, then a closing instance of the
//! same tag followed by the fixed-width absolute offset of the footer's
//! start. A reader can always fetch the last 16 bytes of a seekable file
//! to locate the footer without scanning.
//!
//! Absence or corruption of the footer is not an error; it only means no
//! fast-seek indices and un-finalized format fields are available.

use crate::header::StreamHeader;
use crate::index::{PacketIndex, SyncIndex, PACKET_INDEX_TAG, SYNC_INDEX_TAG};
use crate::io::{varint, Channel, SeekFrom};
use crate::stats::StreamStats;
use crate::{Error, Result};

use tracing::{debug, trace};

/// Tag opening and closing the footer.
pub const FOOTER_TAG: [u8; 8] = *b"GAVFFOOT";

/// Bytes of the trailer: closing tag plus fixed-width start offset.
const TRAILER_LEN: u64 = 16;

/// Indices recovered from a footer.
#[derive(Debug, Default)]
pub struct FooterInfo {
    /// Coarse multi-stream seek table, when present.
    pub sync_index: Option<SyncIndex>,
    /// Per-packet seek table, when present.
    pub packet_index: Option<PacketIndex>,
}

/// Write the footer at the channel's current position.
///
/// Returns the footer's start offset.
pub fn write_footer<C: Channel + ?Sized>(
    ch: &mut C,
    streams: &[StreamHeader],
    sync_index: Option<&SyncIndex>,
    packet_index: Option<&PacketIndex>,
) -> Result<u64> {
    let start = ch.position();
    ch.write_all(&FOOTER_TAG)?;

    for stream in streams {
        stream.stats.write_to(ch)?;
    }

    if let Some(index) = sync_index.filter(|i| !i.is_empty()) {
        trace!(checkpoints = index.len(), "writing sync index");
        index.write_to(ch)?;
    }
    if let Some(index) = packet_index.filter(|i| !i.is_empty()) {
        trace!(entries = index.len(), "writing packet index");
        index.write_to(ch)?;
    }

    ch.write_all(&FOOTER_TAG)?;
    varint::write_u64_fixed(ch, start)?;
    ch.flush()?;
    debug!(start, streams = streams.len(), "wrote footer");
    Ok(start)
}

/// Locate and parse the footer of a seekable channel, applying recovered
/// statistics to the stream headers.
///
/// Returns `Ok(None)` when no parseable footer exists (non-seekable
/// channel, missing tag, truncated file); the file is still readable
/// sequentially. The channel's original position is restored whether this
/// succeeds or fails.
pub fn read_footer<C: Channel + ?Sized>(
    ch: &mut C,
    streams: &mut [StreamHeader],
) -> Result<Option<FooterInfo>> {
    if !ch.is_seekable() {
        return Ok(None);
    }

    let original = ch.position();
    let outcome = probe(ch, streams);
    let restore = ch.seek(SeekFrom::Start(original));

    match outcome {
        Ok(info) => {
            restore?;
            Ok(info)
        }
        // Structural damage downgrades to sequential access.
        Err(Error::InvalidData(msg)) => {
            debug!(reason = %msg, "footer unusable, sequential access only");
            restore?;
            Ok(None)
        }
        Err(Error::Eof) | Err(Error::ShortRead { .. }) => {
            debug!("truncated footer, sequential access only");
            restore?;
            Ok(None)
        }
        Err(e) => {
            let _ = restore;
            Err(e)
        }
    }
}

fn probe<C: Channel + ?Sized>(
    ch: &mut C,
    streams: &mut [StreamHeader],
) -> Result<Option<FooterInfo>> {
    let end = ch.seek(SeekFrom::End(0))?;
    if end < TRAILER_LEN {
        return Ok(None);
    }

    let trailer_at = end - TRAILER_LEN;
    ch.seek(SeekFrom::Start(trailer_at))?;
    let mut tag = [0u8; 8];
    ch.read_exact(&mut tag)?;
    if tag != FOOTER_TAG {
        debug!("no footer trailer tag");
        return Ok(None);
    }

    let start = varint::read_u64_fixed(ch)?;
    if start >= trailer_at {
        return Err(Error::invalid_data(format!(
            "footer back-pointer {start} beyond trailer at {trailer_at}"
        )));
    }

    ch.seek(SeekFrom::Start(start))?;
    ch.read_exact(&mut tag)?;
    if tag != FOOTER_TAG {
        return Err(Error::invalid_data(
            "footer back-pointer does not land on the footer tag",
        ));
    }

    // Stats appear in the same order streams appear in the program header.
    for stream in streams.iter_mut() {
        stream.stats = StreamStats::read_from(ch)?;
    }

    let mut info = FooterInfo::default();
    while ch.position() < trailer_at {
        ch.read_exact(&mut tag)?;
        match tag {
            SYNC_INDEX_TAG => {
                info.sync_index = Some(SyncIndex::read_from(ch, streams.len())?);
            }
            PACKET_INDEX_TAG => {
                info.packet_index = Some(PacketIndex::read_from(ch)?);
            }
            FOOTER_TAG => break,
            _ => {
                // Unknown future block; length-prefixed, skip it whole.
                let skipped = varint::read_bytes(ch, crate::index::MAX_INDEX_BLOCK)?;
                trace!(len = skipped.len(), "skipped unknown footer block");
            }
        }
    }

    debug!(
        start,
        sync = info.sync_index.as_ref().map(|i| i.len()).unwrap_or(0),
        packets = info.packet_index.as_ref().map(|i| i.len()).unwrap_or(0),
        "read footer"
    );
    Ok(Some(info))
}
