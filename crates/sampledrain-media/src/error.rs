//! Error types for sampledrain-media.

use std::io;
use thiserror::Error;

/// Result type for sampledrain-media operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for sampledrain-media operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error while opening or parsing the container.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid MP4 file structure.
    #[error("Invalid MP4: {0}")]
    InvalidMp4(String),

    /// Missing required atom in MP4 file.
    #[error("Missing required atom: {0}")]
    MissingAtom(&'static str),

    /// Sample index tables are missing or internally inconsistent.
    #[error("Malformed sample index: {0}")]
    MalformedIndex(String),

    /// Seek or read against the container failed during a drain.
    #[error("Read failure at offset {offset} (track {track}): {source}")]
    ReadFailure {
        track: usize,
        offset: u64,
        #[source]
        source: io::Error,
    },

    /// The sample consumer stopped accepting samples.
    #[error("Sample consumer closed")]
    ConsumerClosed,

    /// The drain was cancelled between samples.
    #[error("Drain cancelled after {emitted} samples")]
    Cancelled { emitted: u64 },
}

impl Error {
    /// Create an invalid MP4 error.
    pub fn invalid_mp4(msg: impl Into<String>) -> Self {
        Self::InvalidMp4(msg.into())
    }

    /// Create a malformed index error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedIndex(msg.into())
    }

    /// Whether this error came from bad index data rather than I/O.
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::MalformedIndex(_) | Self::MissingAtom(_))
    }
}
