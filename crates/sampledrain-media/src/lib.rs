//! Sampledrain-Media: sample table expansion and interleaved draining for MP4
//!
//! Given a finished ISO-BMFF container, this crate reconstructs the byte
//! offset, size, duration and keyframe flag of every sample in every track,
//! then emits the samples across tracks in approximately chronological order
//! so they can be re-streamed or re-packaged one by one.
//!
//! # Modules
//!
//! - `mp4` - Box parsing (moov, stbl) and sample table expansion
//! - `interleave` - Cross-track scheduling of samples
//! - `source` - Random-access readers over the container
//! - `consumer` - Sample delivery (callbacks, channels)
//! - `drain` - End-to-end drain of a container file
//!
//! # Architecture
//!
//! Draining a container happens in three steps:
//!
//! 1. Parse the moov atom and collect each track's stts/stss/stsz/stco/stsc
//! 2. Expand the run-length tables into one offset/size/duration per sample
//! 3. Walk all tables in lock-step, seeking and reading each sample from the
//!    file and handing it to the consumer
//!
//! ```no_run
//! use sampledrain_media::{drain_file, DrainOptions, Sample};
//!
//! let mut consumer = |sample: Sample| {
//!     println!("track {} {} bytes", sample.track_index, sample.payload.len());
//!     Ok(())
//! };
//! drain_file("recording.mp4", &mut consumer, &DrainOptions::default())?;
//! # Ok::<(), sampledrain_media::Error>(())
//! ```

pub mod consumer;
pub mod drain;
pub mod error;
pub mod interleave;
pub mod mp4;
pub mod source;

pub use consumer::{ChannelConsumer, Sample, SampleConsumer};
pub use drain::{drain_file, DrainOptions};
pub use error::{Error, Result};
pub use interleave::{DrainStats, InterleaveStrategy, Session, TrackStats};
pub use mp4::{MovieIndex, SampleTable};
pub use source::{FileSource, ReaderSource, SampleSource};
