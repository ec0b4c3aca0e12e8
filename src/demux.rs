//! Read-side session.
//!
//! One demultiplexer owns the channel and every per-stream queue; the
//! per-stream pull calls delegate to a single shared fill step, so one
//! physical read serves all logical streams. Three pull policies exist,
//! selected per stream at open time:
//!
//! - direct: unbuffered, one record per pull, cross-talk is dropped and
//!   reported as try-again
//! - buffered continuous: pulls fill every queue until the requested one
//!   has data
//! - buffered discontinuous: pulls only drain; filling happens through the
//!   shared step, and an empty queue before end-of-data is try-again

use crate::cache::PtsCache;
use crate::footer::read_footer;
use crate::header::{ProgramHeader, StreamHeader, StructureHooks};
use crate::index::{PacketIndex, SyncIndex};
use crate::io::{varint, Channel, SeekFrom};
use crate::mux::{SessionMode, SYNC_TAG};
use crate::packet::{Packet, PacketCoder, PACKET_TAG};
use crate::{Error, Result};

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

use tracing::debug;

/// Caller-supplied locking hooks wrapped around the single shared record
/// read, so interleaved pulls from different consumer threads do not
/// interleave their underlying byte reads. The engine never locks on its
/// own.
pub trait ReadLock: Send + Sync {
    fn lock(&self);
    fn unlock(&self);
}

/// Options for opening a read session.
pub struct ReadOptions {
    /// Buffer reads per stream. When false every stream uses the direct
    /// policy and must be pulled in strict file order.
    pub buffered: bool,
    /// Capacity of the reordering cache backing each discontinuous stream.
    pub reorder_capacity: usize,
    /// Locking hooks around the shared record read.
    pub lock: Option<Arc<dyn ReadLock>>,
    /// Structural event hooks, invoked around program-header parsing.
    pub hooks: Option<Box<dyn StructureHooks>>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            buffered: true,
            reorder_capacity: 32,
            lock: None,
            hooks: None,
        }
    }
}

/// Pull policy of one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamMode {
    Direct,
    Buffered,
    BufferedDiscont,
}

struct StreamState {
    mode: StreamMode,
    coder: PacketCoder,
    queue: VecDeque<Packet>,
    /// Reordering cache; discontinuous streams only.
    cache: Option<PtsCache>,
    /// Surfaced packet, reused across pulls for this stream.
    slot: Packet,
}

impl StreamState {
    fn has_data(&self) -> bool {
        match &self.cache {
            Some(cache) => !cache.is_empty(),
            None => !self.queue.is_empty(),
        }
    }

    fn take_next(&mut self) -> Option<Packet> {
        match &mut self.cache {
            Some(cache) => cache.pop_minimum(),
            None => self.queue.pop_front(),
        }
    }

    fn clear(&mut self) {
        self.queue.clear();
        if let Some(cache) = &mut self.cache {
            cache.clear();
        }
    }
}

/// Read session over one channel.
pub struct Demuxer<C: Channel> {
    channel: C,
    program: ProgramHeader,
    states: Vec<StreamState>,
    mode: SessionMode,
    eof: Arc<Mutex<bool>>,
    lock: Option<Arc<dyn ReadLock>>,
    sync_index: Option<SyncIndex>,
    packet_index: Option<PacketIndex>,
}

impl<C: Channel> Demuxer<C> {
    /// Open a session: parse the program header, probe the footer when the
    /// channel is seekable, and fix the per-stream pull policies.
    pub fn open(mut channel: C, mut options: ReadOptions) -> Result<Self> {
        let mut hooks = options.hooks.take();
        if let Some(h) = hooks.as_mut() {
            h.on_header_start();
        }
        let mut program = ProgramHeader::read_from(&mut channel)?;
        if let Some(h) = hooks.as_mut() {
            h.on_header_end(&program);
        }

        let mut sync_index = None;
        let mut packet_index = None;
        match read_footer(&mut channel, program.streams_mut())? {
            Some(info) => {
                sync_index = info.sync_index;
                packet_index = info.packet_index;
                for stream in program.streams_mut() {
                    let stats = stream.stats;
                    stats.finalize_into(&mut stream.format);
                }
            }
            None => debug!("no footer, sequential access only"),
        }

        let mut states: Vec<StreamState> = program
            .streams()
            .iter()
            .map(|stream| Self::stream_state(stream, &options))
            .collect();

        // With footer statistics the true stream start times are known; pin
        // the PTS offsets now so a later seek cannot mistake a mid-file
        // packet for the stream start.
        for (state, stream) in states.iter_mut().zip(program.streams()) {
            if stream.stats.pts_start != crate::stats::UNDEFINED {
                state.coder.set_pts_offset(stream.stats.pts_start);
            }
        }

        let mode = if program.num_presentable() == 1 {
            SessionMode::Synchronous
        } else {
            SessionMode::Interleaved
        };

        Ok(Self {
            channel,
            program,
            states,
            mode,
            eof: Arc::new(Mutex::new(false)),
            lock: options.lock,
            sync_index,
            packet_index,
        })
    }

    fn stream_state(stream: &StreamHeader, options: &ReadOptions) -> StreamState {
        let mode = if !options.buffered {
            StreamMode::Direct
        } else if stream.is_discontinuous() {
            StreamMode::BufferedDiscont
        } else {
            StreamMode::Buffered
        };
        StreamState {
            mode,
            coder: PacketCoder::new(stream.id, stream.default_duration),
            queue: VecDeque::new(),
            cache: (mode == StreamMode::BufferedDiscont)
                .then(|| PtsCache::new(options.reorder_capacity)),
            slot: Packet::default(),
        }
    }

    /// The parsed program header, with footer statistics applied when a
    /// footer was found.
    pub fn program(&self) -> &ProgramHeader {
        &self.program
    }

    /// Session encoding mode recovered from the stream set.
    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    /// Coarse seek table, when the footer carried one.
    pub fn sync_index(&self) -> Option<&SyncIndex> {
        self.sync_index.as_ref()
    }

    /// Per-packet seek table, when the footer carried one.
    pub fn packet_index(&self) -> Option<&PacketIndex> {
        self.packet_index.as_ref()
    }

    /// Whether the session has reached end of data.
    pub fn is_eof(&self) -> bool {
        *self.eof.lock()
    }

    /// Pull the next packet of `stream_id`.
    ///
    /// The returned reference is reused on the next pull for the same
    /// stream; use [`Self::read_packet_into`] to keep a copy. Returns
    /// [`Error::Eof`] at end of data and [`Error::TryAgain`] when nothing
    /// is available yet (direct-mode cross-talk, or an empty discontinuous
    /// queue before end of data).
    pub fn read_packet(&mut self, stream_id: u32) -> Result<&Packet> {
        let idx = self.stream_index(stream_id)?;
        match self.states[idx].mode {
            StreamMode::Direct => {
                if *self.eof.lock() {
                    return Err(Error::Eof);
                }
                match self.locked_step(Some(idx))? {
                    true => Ok(&self.states[idx].slot),
                    false => Err(Error::TryAgain),
                }
            }
            StreamMode::Buffered => {
                while !self.states[idx].has_data() {
                    if *self.eof.lock() {
                        return Err(Error::Eof);
                    }
                    match self.locked_step(None) {
                        Ok(_) => {}
                        Err(e) if e.is_eof() => {}
                        Err(e) => return Err(e),
                    }
                }
                self.surface(idx)
            }
            StreamMode::BufferedDiscont => {
                if !self.states[idx].has_data() {
                    if *self.eof.lock() {
                        return Err(Error::Eof);
                    }
                    return Err(Error::TryAgain);
                }
                self.surface(idx)
            }
        }
    }

    /// Pull the next packet of `stream_id` into a caller-owned packet,
    /// copying the payload.
    pub fn read_packet_into(&mut self, stream_id: u32, dst: &mut Packet) -> Result<()> {
        let packet = self.read_packet(stream_id)?;
        packet.clone_into(dst);
        Ok(())
    }

    /// Pull the cached packet of a discontinuous stream whose PTS equals
    /// `pts` exactly.
    ///
    /// Cached entries below `pts` are stale and are discarded; entries at
    /// or above it stay cached. Without a match this is
    /// [`Error::TryAgain`] before end of data and [`Error::Eof`] after.
    pub fn read_packet_at_pts(&mut self, stream_id: u32, pts: i64) -> Result<&Packet> {
        let idx = self.stream_index(stream_id)?;
        let eof = *self.eof.lock();
        let state = &mut self.states[idx];
        let Some(cache) = &mut state.cache else {
            return Err(Error::invalid_data(format!(
                "stream {stream_id} is not reorder-buffered"
            )));
        };
        match cache.pop_by_pts(pts) {
            Some(packet) => {
                state.slot = packet;
                Ok(&state.slot)
            }
            None if eof => Err(Error::Eof),
            None => Err(Error::TryAgain),
        }
    }

    /// Advance the shared fill step by one record, routing it to its
    /// owning stream's queue. Drives discontinuous streams, whose pulls
    /// never read the channel themselves.
    pub fn fill(&mut self) -> Result<()> {
        if *self.eof.lock() {
            return Err(Error::Eof);
        }
        self.locked_step(None)?;
        Ok(())
    }

    /// Pull `stream_id` to end of data, discarding packets. No observable
    /// effect beyond advancing the channel.
    pub fn drain(&mut self, stream_id: u32) -> Result<()> {
        let idx = self.stream_index(stream_id)?;
        let direct = self.states[idx].mode == StreamMode::Direct;
        loop {
            match self.read_packet(stream_id) {
                Ok(_) => {}
                Err(e) if e.is_eof() => return Ok(()),
                Err(e) if e.is_try_again() => {
                    if !direct {
                        match self.fill() {
                            Ok(()) => {}
                            Err(e) if e.is_eof() => {}
                            Err(e) => return Err(e),
                        }
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Reposition a seekable session to the latest sync checkpoint at or
    /// before `pts` on `stream_id`, clearing all queues and codec state.
    ///
    /// Returns the checkpoint's PTS for the stream. Requires a loaded sync
    /// index.
    pub fn seek_to_pts(&mut self, stream_id: u32, pts: i64) -> Result<i64> {
        if !self.channel.is_seekable() {
            return Err(Error::NotSeekable);
        }
        let idx = self.stream_index(stream_id)?;
        let offset = self.states[idx].coder.pts_offset().unwrap_or(0);
        let index = self
            .sync_index
            .as_ref()
            .ok_or_else(|| Error::invalid_data("no sync index loaded"))?;
        let entry = index
            .checkpoint_before(idx, pts + offset)
            .ok_or_else(|| Error::invalid_data(format!("no checkpoint at or before pts {pts}")))?;
        let position = entry.position;
        let target = entry.pts[idx];

        self.channel.seek(SeekFrom::Start(position))?;
        for state in &mut self.states {
            state.clear();
            state.coder.resync();
        }
        *self.eof.lock() = false;
        debug!(stream_id, pts, position, "seeked to checkpoint");
        Ok(target - offset)
    }

    /// Consume the session, returning the channel.
    pub fn into_channel(self) -> C {
        self.channel
    }

    fn stream_index(&self, stream_id: u32) -> Result<usize> {
        (stream_id as usize)
            .checked_sub(1)
            .filter(|&i| i < self.states.len())
            .ok_or(Error::Desync { stream_id })
    }

    fn surface(&mut self, idx: usize) -> Result<&Packet> {
        let state = &mut self.states[idx];
        match state.take_next() {
            Some(packet) => {
                state.slot = packet;
                Ok(&state.slot)
            }
            None => Err(Error::Eof),
        }
    }

    /// Run one record step under the caller-supplied lock hooks.
    ///
    /// With `direct_for = Some(idx)`, decodes into that stream's slot and
    /// reports whether the record belonged to it; foreign records are
    /// decoded (keeping their stream's codec state consistent) and
    /// dropped. With `None`, routes the record into its owning queue.
    fn locked_step(&mut self, direct_for: Option<usize>) -> Result<bool> {
        let lock = self.lock.clone();
        if let Some(l) = &lock {
            l.lock();
        }
        let outcome = self.step(direct_for);
        if let Some(l) = &lock {
            l.unlock();
        }
        outcome
    }

    fn step(&mut self, direct_for: Option<usize>) -> Result<bool> {
        let mut tag = [0u8; 1];
        let n = self.channel.read(&mut tag)?;
        if n == 0 {
            self.set_eof();
            return Err(Error::Eof);
        }

        match tag[0] {
            PACKET_TAG => {
                let id = varint::read_uvarint(&mut self.channel)?;
                let id = u32::try_from(id)
                    .map_err(|_| Error::invalid_data(format!("stream id {id} out of range")))?;
                let idx = self.stream_index(id)?;

                let state = &mut self.states[idx];
                let mut packet = std::mem::take(&mut state.slot);
                state.coder.read_packet(&mut self.channel, &mut packet)?;

                match direct_for {
                    Some(want) if want == idx => {
                        state.slot = packet;
                        Ok(true)
                    }
                    Some(_) => {
                        // Cross-talk: another stream's datum, dropped.
                        state.slot = packet;
                        Ok(false)
                    }
                    None => {
                        state.slot = Packet::default();
                        match &mut state.cache {
                            Some(cache) => cache.push(packet),
                            None => state.queue.push_back(packet),
                        }
                        Ok(true)
                    }
                }
            }
            b'G' => {
                let mut rest = [0u8; 7];
                self.channel.read_exact(&mut rest)?;
                let mut full = [0u8; 8];
                full[0] = b'G';
                full[1..].copy_from_slice(&rest);

                if full == SYNC_TAG {
                    for _ in 0..self.states.len() {
                        let _ = varint::read_svarint(&mut self.channel)?;
                    }
                    for state in &mut self.states {
                        state.coder.resync();
                    }
                    Ok(false)
                } else if full == crate::footer::FOOTER_TAG {
                    self.set_eof();
                    Err(Error::Eof)
                } else {
                    Err(Error::invalid_data(format!(
                        "unknown segment tag {:?}",
                        String::from_utf8_lossy(&full)
                    )))
                }
            }
            other => Err(Error::invalid_data(format!(
                "unknown record tag {other:#04x}"
            ))),
        }
    }

    fn set_eof(&self) {
        let mut eof = self.eof.lock();
        if !*eof {
            *eof = true;
            debug!("end of data");
        }
    }
}
