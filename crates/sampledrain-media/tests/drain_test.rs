//! Integration tests for parsing and draining synthetic MP4 files.

mod common;

use common::{av_tracks, build_mp4, build_mp4_with, write_fixture, Corruption, TrackSpec};
use sampledrain_media::mp4::{HandlerType, SampleSizes};
use sampledrain_media::{
    drain_file, DrainOptions, DrainStats, Error, InterleaveStrategy, MovieIndex, Result, Sample,
    Session,
};
use std::path::Path;

fn collect(path: &Path, options: &DrainOptions) -> (Vec<Sample>, Result<DrainStats>) {
    let mut samples = Vec::new();
    let mut consumer = |s: Sample| {
        samples.push(s);
        Ok::<(), Error>(())
    };
    let result = drain_file(path, &mut consumer, options);
    (samples, result)
}

#[test]
fn test_parse_movie_index() {
    let bytes = build_mp4(1000, 100, &av_tracks());
    let index = MovieIndex::parse(&mut std::io::Cursor::new(bytes)).unwrap();

    assert_eq!(index.header.time_scale, 1000);
    assert!((index.duration_ms() - 100.0).abs() < 1e-9);
    assert_eq!(index.tracks.len(), 2);

    let video = &index.tracks[0];
    assert_eq!(video.track_id, 1);
    assert_eq!(video.handler_type, HandlerType::Video);
    assert_eq!(video.time_scale(), 1000);
    assert_eq!(video.sync_samples, Some(vec![1]));
    assert_eq!(video.sample_sizes, Some(SampleSizes::PerSample(vec![5, 6, 7])));

    let audio = &index.tracks[1];
    assert_eq!(audio.handler_type, HandlerType::Audio);
    assert_eq!(audio.sync_samples, None);
    assert_eq!(audio.sample_sizes, Some(SampleSizes::Uniform(4)));
    assert_eq!(audio.chunk_offsets.as_ref().map(|c| c.len()), Some(2));
}

#[test]
fn test_sample_tables_match_file_layout() {
    let bytes = build_mp4(1000, 100, &av_tracks());
    let index = MovieIndex::parse(&mut std::io::Cursor::new(bytes.clone())).unwrap();
    let tables = index.sample_tables().unwrap();

    // Every expanded offset points at the sample's fill byte.
    for (table, spec) in tables.iter().zip(av_tracks()) {
        assert_eq!(table.sample_count(), spec.durations.len());
        for (i, offset) in table.offsets().iter().enumerate() {
            let size = spec.size_of(i) as usize;
            let start = *offset as usize;
            let expected = spec.fill.wrapping_add(i as u8);
            assert!(bytes[start..start + size].iter().all(|b| *b == expected));
        }
    }
}

#[test]
fn test_drain_file_interleaves_and_removes() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(dir.path(), "finished.mp4", &build_mp4(1000, 100, &av_tracks()));

    let (samples, result) = collect(&path, &DrainOptions::default());
    let stats = result.unwrap();

    let order: Vec<usize> = samples.iter().map(|s| s.track_index).collect();
    assert_eq!(order, vec![1, 1, 0, 1, 1, 0, 1, 0]);

    assert_eq!(stats.tracks[0].bytes, 18);
    assert_eq!(stats.tracks[1].bytes, 20);
    assert_eq!(stats.tracks[0].keyframes, 1);
    assert_eq!(stats.tracks[1].keyframes, 0);
    assert!(!path.exists(), "drained container should be removed");

    for sample in &samples {
        let fill = if sample.track_index == 0 { 0x10 } else { 0xA0 };
        let expected = fill + sample.sample_index as u8;
        assert!(sample.payload.iter().all(|b| *b == expected));
    }
}

#[test]
fn test_drain_file_keep_container() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(dir.path(), "keep.mp4", &build_mp4(1000, 100, &av_tracks()));
    let options = DrainOptions {
        remove_after_drain: false,
        strategy: InterleaveStrategy::Chronological,
        ..Default::default()
    };

    let (samples, result) = collect(&path, &options);
    assert_eq!(result.unwrap().total_samples(), 8);
    assert_eq!(samples.len(), 8);
    assert!(path.exists());
}

#[test]
fn test_failed_removal_still_returns_stats() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(dir.path(), "busy.mp4", &build_mp4(1000, 100, &av_tracks()));

    // Swap the container for a directory mid-drain so the final removal
    // fails; the open handle keeps the unlinked file readable.
    let mut samples = Vec::new();
    let mut consumer = |s: Sample| {
        if samples.is_empty() {
            std::fs::remove_file(&path).unwrap();
            std::fs::create_dir(&path).unwrap();
        }
        samples.push(s);
        Ok::<(), Error>(())
    };
    let stats = drain_file(&path, &mut consumer, &DrainOptions::default()).unwrap();

    assert_eq!(stats.total_samples(), 8);
    assert_eq!(samples.len(), 8);
    assert!(path.is_dir(), "cleanup failure leaves the path in place");
}

#[test]
fn test_chunk_beyond_offsets_is_malformed() {
    let dir = tempfile::tempdir().unwrap();
    let corruption = Corruption {
        stsc: Some((1, vec![(1, 3), (3, 2)])),
        ..Default::default()
    };
    let bytes = build_mp4_with(1000, 100, &av_tracks(), &corruption);
    let path = write_fixture(dir.path(), "broken.mp4", &bytes);

    let (samples, result) = collect(&path, &DrainOptions::default());
    assert!(matches!(result, Err(Error::MalformedIndex(_))));
    assert!(samples.is_empty(), "nothing may be emitted for a malformed index");
    assert!(path.exists(), "failed drains keep the container");
}

#[test]
fn test_missing_chunk_offsets_is_malformed() {
    let corruption = Corruption {
        drop_stco: Some(0),
        ..Default::default()
    };
    let bytes = build_mp4_with(1000, 100, &av_tracks(), &corruption);
    let index = MovieIndex::parse(&mut std::io::Cursor::new(bytes)).unwrap();

    assert!(matches!(
        Session::from_index(&index),
        Err(Error::MalformedIndex(_))
    ));
}

#[test]
fn test_single_track_file() {
    let dir = tempfile::tempdir().unwrap();
    let track = TrackSpec {
        handler: *b"soun",
        time_scale: 48000,
        durations: vec![1024; 7],
        sizes: vec![3, 1, 4, 1, 5, 9, 2],
        chunks: vec![4, 3],
        sync_samples: None,
        fill: 0x40,
    };
    let path = write_fixture(dir.path(), "audio.m4a", &build_mp4(48000, 7168, &[track]));

    let (samples, result) = collect(&path, &DrainOptions::default());
    assert_eq!(result.unwrap().tracks[0].bytes, 25);

    let indices: Vec<usize> = samples.iter().map(|s| s.sample_index).collect();
    assert_eq!(indices, (0..7).collect::<Vec<_>>());
    let expected_ms = 1024.0 * 1000.0 / 48000.0;
    assert!(samples.iter().all(|s| (s.duration_ms - expected_ms).abs() < 1e-9));
}

#[test]
fn test_missing_moov_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(dir.path(), "empty.mp4", b"\0\0\0\x08free");

    let (_, result) = collect(&path, &DrainOptions::default());
    assert!(matches!(result, Err(Error::MissingAtom("moov"))));
}
