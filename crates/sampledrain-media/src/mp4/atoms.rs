//! MP4 atom definitions and the per-track index boxes.

use super::{SampleSizes, SampleTable, SampleTableBuilder};
use crate::Result;

/// Four-character atom type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AtomType(pub [u8; 4]);

impl AtomType {
    pub const MOOV: Self = Self(*b"moov");
    pub const MVHD: Self = Self(*b"mvhd");
    pub const TRAK: Self = Self(*b"trak");
    pub const TKHD: Self = Self(*b"tkhd");
    pub const MDIA: Self = Self(*b"mdia");
    pub const MDHD: Self = Self(*b"mdhd");
    pub const HDLR: Self = Self(*b"hdlr");
    pub const MINF: Self = Self(*b"minf");
    pub const STBL: Self = Self(*b"stbl");
    pub const STTS: Self = Self(*b"stts");
    pub const STSS: Self = Self(*b"stss");
    pub const STSC: Self = Self(*b"stsc");
    pub const STSZ: Self = Self(*b"stsz");
    pub const STCO: Self = Self(*b"stco");
    pub const CO64: Self = Self(*b"co64");

    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Get the 4-char code as a string.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("????")
    }
}

impl std::fmt::Display for AtomType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parsed atom header.
#[derive(Debug, Clone)]
pub struct Atom {
    /// Atom type code.
    pub atom_type: AtomType,
    /// Atom size including header.
    pub size: u64,
    /// File offset where atom data starts (after header).
    pub data_offset: u64,
    /// Size of the header (8 or 16 bytes).
    pub header_size: u8,
}

impl Atom {
    /// Get the data size (size - header).
    pub fn data_size(&self) -> u64 {
        self.size.saturating_sub(self.header_size as u64)
    }

    /// File offset of the first byte after this atom.
    pub fn end(&self) -> u64 {
        self.data_offset.saturating_add(self.data_size())
    }
}

/// Handler type for a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerType {
    Video,
    Audio,
    Hint,
    Meta,
    Text,
    Unknown([u8; 4]),
}

impl HandlerType {
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        match &bytes {
            b"vide" => Self::Video,
            b"soun" => Self::Audio,
            b"hint" => Self::Hint,
            b"meta" => Self::Meta,
            b"text" => Self::Text,
            _ => Self::Unknown(bytes),
        }
    }

    /// Short label used in logs and CLI output.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Hint => "hint",
            Self::Meta => "meta",
            Self::Text => "text",
            Self::Unknown(_) => "unknown",
        }
    }
}

/// Time scale and duration from an `mdhd` or `mvhd` box.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MediaHeader {
    /// Time units per second.
    pub time_scale: u32,
    /// Duration in `time_scale` units.
    pub duration: u64,
}

impl MediaHeader {
    /// Duration in milliseconds, 0 when the time scale is unusable.
    pub fn duration_ms(&self) -> f64 {
        if self.time_scale == 0 {
            0.0
        } else {
            self.duration as f64 * 1000.0 / self.time_scale as f64
        }
    }
}

/// One `stsc` run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleToChunkEntry {
    /// First chunk (1-based) this run applies to.
    pub first_chunk: u32,
    /// Samples stored in each chunk of the run.
    pub samples_per_chunk: u32,
    /// Sample description index (1-based), carried but unused.
    pub sample_description_index: u32,
}

/// Index boxes found under one `trak`, each present at most once.
#[derive(Debug, Clone)]
pub struct TrackIndex {
    /// Track ID from `tkhd`.
    pub track_id: u32,
    /// Handler type from `hdlr`.
    pub handler_type: HandlerType,
    /// `mdhd`.
    pub media_header: Option<MediaHeader>,
    /// `stss` sample numbers (1-based).
    pub sync_samples: Option<Vec<u32>>,
    /// `stts` runs as `(sample_count, sample_delta)`.
    pub time_to_sample: Option<Vec<(u32, u32)>>,
    /// `stsz`.
    pub sample_sizes: Option<SampleSizes>,
    /// Sample count declared in `stsz`.
    pub sample_count: Option<u32>,
    /// `stco` or `co64`.
    pub chunk_offsets: Option<Vec<u64>>,
    /// `stsc`.
    pub sample_to_chunk: Option<Vec<SampleToChunkEntry>>,
}

impl TrackIndex {
    /// Create an empty track index.
    pub fn new(track_id: u32) -> Self {
        Self {
            track_id,
            handler_type: HandlerType::Unknown([0; 4]),
            media_header: None,
            sync_samples: None,
            time_to_sample: None,
            sample_sizes: None,
            sample_count: None,
            chunk_offsets: None,
            sample_to_chunk: None,
        }
    }

    /// Media time scale, 0 if `mdhd` was absent.
    pub fn time_scale(&self) -> u32 {
        self.media_header.map(|h| h.time_scale).unwrap_or(0)
    }

    /// Expand this track's boxes into a sample table.
    pub fn sample_table(&self) -> Result<SampleTable> {
        let mut builder = SampleTableBuilder::new();
        if let Some(header) = self.media_header {
            builder.set_media_header(header);
        }
        if let Some(sync) = &self.sync_samples {
            builder.set_sync_samples(sync.clone());
        }
        if let Some(stts) = &self.time_to_sample {
            builder.set_stts(stts.clone());
        }
        if let Some(sizes) = &self.sample_sizes {
            builder.set_sample_sizes(sizes.clone());
        }
        if let Some(count) = self.sample_count {
            builder.set_sample_count(count);
        }
        if let Some(offsets) = &self.chunk_offsets {
            builder.set_chunk_offsets(offsets.clone());
        }
        if let Some(stsc) = &self.sample_to_chunk {
            builder.set_stsc(stsc.clone());
        }
        builder.build()
    }
}
