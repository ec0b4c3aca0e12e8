//! Write-side session.
//!
//! Packets enter through `put_packet`, which feeds the footer statistics
//! unconditionally and then hands the packet to the interleaving step. In
//! synchronous mode (exactly one presentable stream) packets are written
//! immediately; in interleaved mode they accumulate per stream until every
//! stream has reached the next synchronization boundary, at which point a
//! sync marker and one packet per stream are emitted.

use crate::footer::write_footer;
use crate::header::{ProgramHeader, StructureHooks};
use crate::index::{PacketIndex, SyncIndex};
use crate::io::{varint, Channel};
use crate::packet::{Packet, PacketCoder};
use crate::stats::UNDEFINED;
use crate::{Error, Result};

use std::collections::VecDeque;

use tracing::trace;

/// Tag opening a synchronization marker.
pub const SYNC_TAG: [u8; 8] = *b"GAVFSYNC";

/// Scale of the common clock boundaries are computed on (microseconds).
const CLOCK_SCALE: i64 = 1_000_000;

/// Session encoding mode.
///
/// Decided once the program header is finalized: synchronous when exactly
/// one elementary stream carries presentable data, interleaved otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// Header not yet finalized.
    Starting,
    /// Single presentable stream; packets are written as they arrive.
    Synchronous,
    /// Multiple presentable streams; packets are interleaved around
    /// synchronization markers.
    Interleaved,
}

/// Options for opening a write session.
pub struct MuxOptions {
    /// Target spacing between synchronization markers, in microseconds of
    /// the common clock.
    pub sync_distance: i64,
    /// Record emitted sync markers into a sync index, written with the
    /// footer.
    pub sync_index: bool,
    /// Record every packet into a packet index, written with the footer.
    pub packet_index: bool,
    /// Structural event hooks, invoked around program-header writing.
    pub hooks: Option<Box<dyn StructureHooks>>,
}

impl Default for MuxOptions {
    fn default() -> Self {
        Self {
            sync_distance: 2 * CLOCK_SCALE,
            sync_index: true,
            packet_index: false,
            hooks: None,
        }
    }
}

/// Write session over one channel.
pub struct Muxer<C: Channel> {
    channel: C,
    program: Option<ProgramHeader>,
    mode: SessionMode,
    coders: Vec<PacketCoder>,
    pending: Vec<VecDeque<Packet>>,
    finished: Vec<bool>,
    timescales: Vec<u32>,
    sync_index: SyncIndex,
    packet_index: PacketIndex,
    next_sync_time: Option<i64>,
    sync_distance: i64,
    record_sync_index: bool,
    record_packet_index: bool,
    hooks: Option<Box<dyn StructureHooks>>,
}

impl<C: Channel> Muxer<C> {
    /// Create a write session. No bytes are emitted until
    /// [`Self::write_header`].
    pub fn new(channel: C, options: MuxOptions) -> Self {
        Self {
            channel,
            program: None,
            mode: SessionMode::Starting,
            coders: Vec::new(),
            pending: Vec::new(),
            finished: Vec::new(),
            timescales: Vec::new(),
            sync_index: SyncIndex::new(0),
            packet_index: PacketIndex::new(),
            next_sync_time: None,
            sync_distance: options.sync_distance.max(1),
            record_sync_index: options.sync_index,
            record_packet_index: options.packet_index,
            hooks: options.hooks,
        }
    }

    /// Write the program header and finalize the stream set.
    ///
    /// Decides the encoding mode; streams cannot be added afterwards.
    pub fn write_header(&mut self, program: ProgramHeader) -> Result<()> {
        if self.program.is_some() {
            return Err(Error::invalid_data("program header already written"));
        }

        if let Some(h) = self.hooks.as_mut() {
            h.on_header_start();
        }
        program.write_to(&mut self.channel)?;
        if let Some(h) = self.hooks.as_mut() {
            h.on_header_end(&program);
        }

        let streams = program.streams();
        self.coders = streams
            .iter()
            .map(|s| PacketCoder::new(s.id, s.default_duration))
            .collect();
        self.pending = streams.iter().map(|_| VecDeque::new()).collect();
        self.finished = vec![false; streams.len()];
        self.timescales = streams.iter().map(|s| s.timescale()).collect();
        self.sync_index = SyncIndex::new(streams.len());

        self.mode = if program.num_presentable() == 1 {
            SessionMode::Synchronous
        } else {
            SessionMode::Interleaved
        };
        self.program = Some(program);
        Ok(())
    }

    /// The program header, once written.
    pub fn program(&self) -> Option<&ProgramHeader> {
        self.program.as_ref()
    }

    /// Session encoding mode.
    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    /// Submit one packet.
    ///
    /// Statistics are updated unconditionally; the packet is then written
    /// immediately (synchronous mode) or queued for the next
    /// synchronization boundary (interleaved mode). A packet with
    /// negative duration is the end-of-stream sentinel and is equivalent
    /// to [`Self::end_stream`].
    pub fn put_packet(&mut self, packet: Packet) -> Result<()> {
        let idx = self.stream_index(packet.stream_id)?;
        if self.finished[idx] {
            return Err(Error::invalid_data(format!(
                "stream {} already ended",
                packet.stream_id
            )));
        }
        if packet.is_end_of_stream() {
            return self.end_stream(packet.stream_id);
        }

        let Some(program) = self.program.as_mut() else {
            return Err(Error::invalid_data("program header not written"));
        };
        program.streams_mut()[idx].stats.update(&packet);

        match self.mode {
            SessionMode::Starting => Err(Error::invalid_data("program header not written")),
            SessionMode::Synchronous => self.write_one(idx, &packet),
            SessionMode::Interleaved => {
                if self.next_sync_time.is_none() {
                    self.next_sync_time =
                        Some(self.scaled(idx, packet.pts) + self.sync_distance);
                }
                self.pending[idx].push_back(packet);
                self.flush_boundaries()
            }
        }
    }

    /// Mark a stream finished. Interleaving stops waiting for it; no bytes
    /// are emitted.
    pub fn end_stream(&mut self, stream_id: u32) -> Result<()> {
        let idx = self.stream_index(stream_id)?;
        if self.finished[idx] {
            return Ok(());
        }
        self.finished[idx] = true;
        if self.mode == SessionMode::Interleaved {
            self.flush_boundaries()?;
        }
        Ok(())
    }

    /// Close the session: drain pending packets, finalize statistics into
    /// each stream's format, write the footer and flush. Returns the
    /// channel.
    pub fn close(mut self) -> Result<C> {
        let Some(mut program) = self.program.take() else {
            return Err(Error::invalid_data("close before program header"));
        };

        if self.mode == SessionMode::Interleaved {
            while self.pending.iter().any(|q| !q.is_empty()) {
                self.emit_sync_round()?;
            }
        }

        for stream in program.streams_mut() {
            let stats = stream.stats;
            stats.finalize_into(&mut stream.format);
        }

        write_footer(
            &mut self.channel,
            program.streams(),
            self.record_sync_index.then_some(&self.sync_index),
            self.record_packet_index.then_some(&self.packet_index),
        )?;
        self.channel.close()?;
        Ok(self.channel)
    }

    fn stream_index(&self, stream_id: u32) -> Result<usize> {
        (stream_id as usize)
            .checked_sub(1)
            .filter(|&i| i < self.coders.len())
            .ok_or(Error::Desync { stream_id })
    }

    /// Packet PTS on the common clock.
    fn scaled(&self, idx: usize, pts: i64) -> i64 {
        let timescale = i64::from(self.timescales[idx].max(1));
        (i128::from(pts) * i128::from(CLOCK_SCALE) / i128::from(timescale)) as i64
    }

    fn write_one(&mut self, idx: usize, packet: &Packet) -> Result<()> {
        if self.record_packet_index {
            self.packet_index.add(
                packet.stream_id,
                packet.flags,
                self.channel.position(),
                packet.pts,
            );
        }
        self.coders[idx].write_packet(&mut self.channel, packet)
    }

    /// Emit sync rounds while every unfinished stream has accumulated up
    /// to the current boundary, advancing the boundary each round.
    fn flush_boundaries(&mut self) -> Result<()> {
        loop {
            let Some(boundary) = self.next_sync_time else {
                return Ok(());
            };
            if self.pending.iter().all(|q| q.is_empty()) {
                return Ok(());
            }
            let ready = self.pending.iter().enumerate().all(|(idx, queue)| {
                if self.finished[idx] {
                    return true;
                }
                queue
                    .back()
                    .is_some_and(|p| self.scaled(idx, p.pts) >= boundary)
            });
            if !ready {
                return Ok(());
            }
            self.emit_sync_round()?;
            self.next_sync_time = Some(boundary + self.sync_distance);
        }
    }

    /// Emit one synchronization marker followed by one packet per stream
    /// in ascending stream-id order.
    fn emit_sync_round(&mut self) -> Result<()> {
        let position = self.channel.position();

        let pts: Vec<i64> = self
            .pending
            .iter()
            .enumerate()
            .map(|(idx, queue)| {
                queue
                    .front()
                    .map(|p| p.pts)
                    .or_else(|| self.coders[idx].next_pts())
                    .unwrap_or(UNDEFINED)
            })
            .collect();

        self.channel.write_all(&SYNC_TAG)?;
        for &p in &pts {
            varint::write_svarint(&mut self.channel, p)?;
        }
        trace!(position, "emitted sync marker");

        if self.record_sync_index {
            self.sync_index.add(position, pts);
        }

        // Sync markers are decodable entry points: every stream's next
        // packet carries an explicit PTS.
        for coder in &mut self.coders {
            coder.resync();
        }

        for idx in 0..self.pending.len() {
            if let Some(packet) = self.pending[idx].pop_front() {
                self.write_one(idx, &packet)?;
            }
        }
        Ok(())
    }
}
