//! End-to-end container scenarios: write, close, reopen, read back.

use gavf::{
    AudioFormat, BufferChannel, Channel, Compression, Demuxer, FileChannel, Metadata, MuxOptions,
    Muxer, Packet, ProgramHeader, ReadOptions, SeekFrom, VideoFormat,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn audio_video_program() -> ProgramHeader {
    let mut program = ProgramHeader::new();
    program.add_audio_stream(
        Compression::none(),
        AudioFormat {
            sample_rate: 48_000,
            channels: 2,
            ..Default::default()
        },
        [("language", "eng")].into_iter().collect(),
    );
    program.add_video_stream(
        Compression::none(),
        VideoFormat {
            width: 1280,
            height: 720,
            timescale: 90_000,
            ..Default::default()
        },
        Metadata::new(),
    );
    program
}

#[test]
fn write_close_reopen_reproduces_streams() {
    init_tracing();

    // Five interleaved packets alternating streams with increasing PTS.
    let audio = [(0i64, 960i64, 3u8), (960, 960, 4), (1920, 960, 5)];
    let video = [(0i64, 3600i64, 6u8), (3600, 3600, 7)];

    let mut muxer = Muxer::new(BufferChannel::new(), MuxOptions::default());
    muxer.write_header(audio_video_program()).unwrap();
    for i in 0..3 {
        let (pts, dur, fill) = audio[i];
        muxer
            .put_packet(Packet::new(1, pts, dur, vec![fill; 10 + i]))
            .unwrap();
        if i < 2 {
            let (pts, dur, fill) = video[i];
            muxer
                .put_packet(Packet::new(2, pts, dur, vec![fill; 100 + i]))
                .unwrap();
        }
    }
    let mut channel = muxer.close().unwrap();

    channel.seek(SeekFrom::Start(0)).unwrap();
    let mut demuxer = Demuxer::open(channel, ReadOptions::default()).unwrap();

    // Program header round-trips the stream set.
    assert_eq!(demuxer.program().num_streams(), 2);
    assert_eq!(
        demuxer.program().streams()[0].metadata.get("language"),
        Some("eng")
    );

    // Footer-derived statistics match the written extremes.
    let audio_stats = demuxer.program().streams()[0].stats;
    assert_eq!(audio_stats.pts_start, 0);
    assert_eq!(audio_stats.pts_end, 2880);
    assert_eq!(audio_stats.total_packets, 3);
    let video_stats = demuxer.program().streams()[1].stats;
    assert_eq!(video_stats.pts_start, 0);
    assert_eq!(video_stats.pts_end, 7200);
    assert_eq!(video_stats.total_packets, 2);

    // Sequential reads reproduce both streams in original per-stream order.
    for (i, &(pts, dur, fill)) in audio.iter().enumerate() {
        let p = demuxer.read_packet(1).unwrap();
        assert_eq!((p.pts, p.duration), (pts, dur));
        assert_eq!(p.data, vec![fill; 10 + i]);
    }
    for (i, &(pts, dur, fill)) in video.iter().enumerate() {
        let p = demuxer.read_packet(2).unwrap();
        assert_eq!((p.pts, p.duration), (pts, dur));
        assert_eq!(p.data, vec![fill; 100 + i]);
    }
    assert!(demuxer.read_packet(1).unwrap_err().is_eof());
    assert!(demuxer.read_packet(2).unwrap_err().is_eof());
}

#[test]
fn footer_is_locatable_from_file_end() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("two_streams.gavf");

    let mut muxer = Muxer::new(FileChannel::create(&path).unwrap(), MuxOptions::default());
    muxer.write_header(audio_video_program()).unwrap();
    muxer
        .put_packet(Packet::new(1, 0, 960, vec![1; 32]))
        .unwrap();
    muxer
        .put_packet(Packet::new(2, 0, 3600, vec![2; 64]))
        .unwrap();
    muxer.close().unwrap();

    // The last 16 bytes are the footer tag plus a fixed-width offset that
    // lands exactly on a second instance of the same tag.
    let mut ch = FileChannel::open(&path).unwrap();
    let end = ch.seek(SeekFrom::End(0)).unwrap();
    ch.seek(SeekFrom::Start(end - 16)).unwrap();

    let mut tag = [0u8; 8];
    ch.read_exact(&mut tag).unwrap();
    assert_eq!(&tag, b"GAVFFOOT");

    let mut offset_bytes = [0u8; 8];
    ch.read_exact(&mut offset_bytes).unwrap();
    let start = u64::from_be_bytes(offset_bytes);
    assert!(start < end - 16);

    ch.seek(SeekFrom::Start(start)).unwrap();
    ch.read_exact(&mut tag).unwrap();
    assert_eq!(&tag, b"GAVFFOOT");

    // And the full session reopens from the file.
    let mut ch = FileChannel::open(&path).unwrap();
    ch.seek(SeekFrom::Start(0)).unwrap();
    let demuxer = Demuxer::open(ch, ReadOptions::default()).unwrap();
    assert_eq!(demuxer.program().num_streams(), 2);
    assert!(demuxer.sync_index().is_some());
}

#[test]
fn seek_resumes_at_checkpoint() {
    init_tracing();

    let mut program = ProgramHeader::new();
    program.add_audio_stream(
        Compression::none(),
        AudioFormat {
            sample_rate: 1000,
            ..Default::default()
        },
        Metadata::new(),
    );
    program.add_video_stream(
        Compression::none(),
        VideoFormat {
            timescale: 1000,
            ..Default::default()
        },
        Metadata::new(),
    );

    // One-second sync distance over 3 seconds of data on both streams.
    let options = MuxOptions {
        sync_distance: 1_000_000,
        ..Default::default()
    };
    let mut muxer = Muxer::new(BufferChannel::new(), options);
    muxer.write_header(program).unwrap();
    for i in 0..30i64 {
        muxer
            .put_packet(Packet::new(1, i * 100, 100, vec![1; 8]))
            .unwrap();
        muxer
            .put_packet(Packet::new(2, i * 100, 100, vec![2; 8]))
            .unwrap();
    }
    let mut channel = muxer.close().unwrap();

    channel.seek(SeekFrom::Start(0)).unwrap();
    let mut demuxer = Demuxer::open(channel, ReadOptions::default()).unwrap();
    assert!(demuxer.sync_index().is_some());

    let landed = demuxer.seek_to_pts(1, 1500).unwrap();
    assert!(landed <= 1500);

    let p = demuxer.read_packet(1).unwrap();
    assert_eq!(p.pts, landed);
    let next = demuxer.read_packet(1).unwrap();
    assert_eq!(next.pts, landed + 100);

    // The other stream resumes from the same checkpoint.
    let v = demuxer.read_packet(2).unwrap();
    assert!(v.pts >= landed);
}

#[test]
fn sequential_read_works_without_footer() {
    init_tracing();

    let mut muxer = Muxer::new(BufferChannel::new(), MuxOptions::default());
    muxer.write_header(audio_video_program()).unwrap();
    muxer
        .put_packet(Packet::new(1, 0, 960, vec![9; 24]))
        .unwrap();
    muxer
        .put_packet(Packet::new(2, 0, 3600, vec![8; 48]))
        .unwrap();
    let mut channel = muxer.close().unwrap();

    // Chop the footer off: the file degrades to sequential access.
    channel.seek(SeekFrom::Start(0)).unwrap();
    let mut bytes = channel.into_inner();
    let keep = bytes.len() - 40;
    bytes.truncate(keep);

    let mut demuxer =
        Demuxer::open(BufferChannel::from_vec(bytes), ReadOptions::default()).unwrap();
    assert!(demuxer.sync_index().is_none());
    // Stats were never finalized.
    assert!(demuxer.program().streams()[0].stats.is_empty());

    let p = demuxer.read_packet(1).unwrap();
    assert_eq!(p.data, vec![9; 24]);
    let v = demuxer.read_packet(2).unwrap();
    assert_eq!(v.data, vec![8; 48]);
}
