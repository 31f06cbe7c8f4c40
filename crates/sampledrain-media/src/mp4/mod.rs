//! MP4 container parsing.
//!
//! This module locates the index boxes of a finished MP4 file and expands
//! them into per-track sample tables.

mod atoms;
mod reader;
mod sample_table;

pub use atoms::{Atom, AtomType, HandlerType, MediaHeader, SampleToChunkEntry, TrackIndex};
pub use reader::Mp4Reader;
pub use sample_table::{SampleSizes, SampleTable, SampleTableBuilder};

use crate::Result;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

/// Index boxes of a parsed MP4 file.
#[derive(Debug, Clone, Default)]
pub struct MovieIndex {
    /// Movie header (`mvhd`) time scale and duration.
    pub header: MediaHeader,
    /// Tracks in file order; index 0 is the anchor when interleaving.
    pub tracks: Vec<TrackIndex>,
}

impl MovieIndex {
    /// Parse the index of an MP4 file at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        Self::parse(&mut reader)
    }

    /// Parse the index from a reader.
    pub fn parse<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        let mut mp4_reader = Mp4Reader::new(reader)?;
        mp4_reader.parse()
    }

    /// Container duration in milliseconds.
    pub fn duration_ms(&self) -> f64 {
        self.header.duration_ms()
    }

    /// Get the duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.duration_ms() / 1000.0
    }

    /// Expand every track into a sample table, in track order.
    ///
    /// Fails on the first track whose index is malformed.
    pub fn sample_tables(&self) -> Result<Vec<SampleTable>> {
        self.tracks
            .iter()
            .enumerate()
            .map(|(index, track)| {
                track.sample_table().map_err(|e| {
                    tracing::error!(
                        track = index,
                        track_id = track.track_id,
                        "Failed to build sample table: {}",
                        e
                    );
                    e
                })
            })
            .collect()
    }
}
