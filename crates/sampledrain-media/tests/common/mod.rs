//! Synthetic MP4 fixtures for integration tests.
//!
//! Builds `ftyp + mdat + moov` files with hand-laid chunks so tests know the
//! exact offset and content of every sample.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

/// Description of one track in a fixture.
pub struct TrackSpec {
    pub handler: [u8; 4],
    pub time_scale: u32,
    pub durations: Vec<u32>,
    /// Per-sample sizes, or a single uniform size.
    pub sizes: Vec<u32>,
    /// Samples per chunk, in chunk order. Must sum to the sample count.
    pub chunks: Vec<u32>,
    /// 1-based sync sample numbers; `None` omits stss.
    pub sync_samples: Option<Vec<u32>>,
    /// Fill byte base: sample `i` is filled with `fill + i`.
    pub fill: u8,
}

impl TrackSpec {
    pub fn size_of(&self, sample: usize) -> u32 {
        if self.sizes.len() == 1 {
            self.sizes[0]
        } else {
            self.sizes[sample]
        }
    }
}

/// Overrides used to produce broken index tables.
#[derive(Default)]
pub struct Corruption {
    /// Replace the stsc runs of this track.
    pub stsc: Option<(usize, Vec<(u32, u32)>)>,
    /// Drop the chunk offset box of this track.
    pub drop_stco: Option<usize>,
}

const FTYP_LEN: usize = 16;

fn bx(kind: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + body.len());
    out.extend_from_slice(&((8 + body.len()) as u32).to_be_bytes());
    out.extend_from_slice(kind);
    out.extend_from_slice(body);
    out
}

fn full(kind: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut data = vec![0, 0, 0, 0];
    data.extend_from_slice(body);
    bx(kind, &data)
}

fn words(values: &[u32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}

fn time_header(kind: &[u8; 4], time_scale: u32, duration: u32) -> Vec<u8> {
    let mut body = words(&[0, 0, time_scale, duration]);
    body.resize(body.len() + 80, 0);
    full(kind, &body)
}

/// Build an MP4 file and return its bytes.
pub fn build_mp4(movie_time_scale: u32, movie_duration: u32, tracks: &[TrackSpec]) -> Vec<u8> {
    build_mp4_with(movie_time_scale, movie_duration, tracks, &Corruption::default())
}

/// Build an MP4 file with corrupted index tables.
pub fn build_mp4_with(
    movie_time_scale: u32,
    movie_duration: u32,
    tracks: &[TrackSpec],
    corruption: &Corruption,
) -> Vec<u8> {
    // Chunks are interleaved round-robin across tracks inside mdat.
    let mdat_start = (FTYP_LEN + 8) as u64;
    let mut mdat = Vec::new();
    let mut chunk_offsets: Vec<Vec<u32>> = vec![Vec::new(); tracks.len()];
    let mut next_sample = vec![0usize; tracks.len()];
    let max_chunks = tracks.iter().map(|t| t.chunks.len()).max().unwrap_or(0);

    for chunk in 0..max_chunks {
        for (t, track) in tracks.iter().enumerate() {
            let Some(count) = track.chunks.get(chunk) else {
                continue;
            };
            chunk_offsets[t].push((mdat_start + mdat.len() as u64) as u32);
            for _ in 0..*count {
                let i = next_sample[t];
                let fill = track.fill.wrapping_add(i as u8);
                mdat.extend(std::iter::repeat(fill).take(track.size_of(i) as usize));
                next_sample[t] += 1;
            }
        }
    }

    let mut moov_body = time_header(b"mvhd", movie_time_scale, movie_duration);
    for (t, track) in tracks.iter().enumerate() {
        let mut stbl = Vec::new();

        let stts: Vec<u32> = std::iter::once(track.durations.len() as u32)
            .chain(track.durations.iter().flat_map(|d| [1, *d]))
            .collect();
        stbl.extend(full(b"stts", &words(&stts)));

        if let Some(sync) = &track.sync_samples {
            let mut body = words(&[sync.len() as u32]);
            body.extend(words(sync));
            stbl.extend(full(b"stss", &body));
        }

        let runs: Vec<(u32, u32)> = match &corruption.stsc {
            Some((target, runs)) if *target == t => runs.clone(),
            _ => track
                .chunks
                .iter()
                .enumerate()
                .map(|(i, count)| (i as u32 + 1, *count))
                .collect(),
        };
        let mut stsc = words(&[runs.len() as u32]);
        for (first, per_chunk) in runs {
            stsc.extend(words(&[first, per_chunk, 1]));
        }
        stbl.extend(full(b"stsc", &stsc));

        let stsz = if track.sizes.len() == 1 {
            words(&[track.sizes[0], track.durations.len() as u32])
        } else {
            let mut body = words(&[0, track.sizes.len() as u32]);
            body.extend(words(&track.sizes));
            body
        };
        stbl.extend(full(b"stsz", &stsz));

        if corruption.drop_stco != Some(t) {
            let mut stco = words(&[chunk_offsets[t].len() as u32]);
            stco.extend(words(&chunk_offsets[t]));
            stbl.extend(full(b"stco", &stco));
        }

        let minf = bx(b"minf", &bx(b"stbl", &stbl));
        let media_duration: u32 = track.durations.iter().sum();
        let mut hdlr = words(&[0]);
        hdlr.extend_from_slice(&track.handler);
        hdlr.extend(words(&[0, 0, 0]));
        hdlr.push(0);

        let mut mdia = time_header(b"mdhd", track.time_scale, media_duration);
        mdia.extend(full(b"hdlr", &hdlr));
        mdia.extend(minf);

        let mut tkhd = words(&[0, 0, t as u32 + 1]);
        tkhd.resize(80, 0);

        let mut trak = full(b"tkhd", &tkhd);
        trak.extend(bx(b"mdia", &mdia));
        moov_body.extend(bx(b"trak", &trak));
    }

    let mut file = Vec::new();
    file.extend(bx(b"ftyp", b"isom\0\0\0\x01"));
    assert_eq!(file.len(), FTYP_LEN);
    file.extend(bx(b"mdat", &mdat));
    file.extend(bx(b"moov", &moov_body));
    file
}

/// Write `bytes` to `name` inside `dir`.
pub fn write_fixture(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

/// Video track of 33ms samples and audio track of 20ms samples.
pub fn av_tracks() -> Vec<TrackSpec> {
    vec![
        TrackSpec {
            handler: *b"vide",
            time_scale: 1000,
            durations: vec![33, 33, 33],
            sizes: vec![5, 6, 7],
            chunks: vec![3],
            sync_samples: Some(vec![1]),
            fill: 0x10,
        },
        TrackSpec {
            handler: *b"soun",
            time_scale: 1000,
            durations: vec![20; 5],
            sizes: vec![4],
            chunks: vec![3, 2],
            sync_samples: None,
            fill: 0xA0,
        },
    ]
}
