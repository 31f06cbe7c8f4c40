//! Draining a finished container file end to end.

use crate::consumer::SampleConsumer;
use crate::interleave::{DrainStats, InterleaveStrategy, Session};
use crate::mp4::MovieIndex;
use crate::source::{FileSource, SampleSource};
use crate::Result;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Options for [`drain_file`].
#[derive(Debug, Clone)]
pub struct DrainOptions {
    /// Sample ordering across tracks.
    pub strategy: InterleaveStrategy,
    /// Delete the container once every sample has been delivered.
    pub remove_after_drain: bool,
    /// Checked between samples; set to stop the drain early.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for DrainOptions {
    fn default() -> Self {
        Self {
            strategy: InterleaveStrategy::default(),
            remove_after_drain: true,
            cancel: None,
        }
    }
}

/// Parse, drain and clean up the container at `path`.
///
/// All sample tables are built before the first read, so a malformed track
/// fails without emitting anything. Removal of the file after a successful
/// drain is best effort: failures are logged and the stats still returned.
pub fn drain_file<P, C>(path: P, consumer: &mut C, options: &DrainOptions) -> Result<DrainStats>
where
    P: AsRef<Path>,
    C: SampleConsumer + ?Sized,
{
    let path = path.as_ref();

    let index = MovieIndex::open(path)?;
    let session = Session::from_index(&index)?.with_strategy(options.strategy);
    tracing::info!(
        path = %path.display(),
        tracks = session.track_count(),
        duration_ms = session.total_duration_ms(),
        strategy = %options.strategy,
        "Draining container"
    );

    let mut source = FileSource::open(path)?;
    let stats = session.drain(&mut source, consumer, options.cancel.as_deref())?;

    if options.remove_after_drain {
        if let Err(e) = source.remove() {
            tracing::warn!(path = %path.display(), "Failed to remove drained container: {}", e);
        }
    } else if let Err(e) = source.close() {
        tracing::warn!(path = %path.display(), "Failed to close container: {}", e);
    }

    tracing::info!(
        path = %path.display(),
        samples = stats.total_samples(),
        bytes = stats.total_bytes(),
        "Drain finished"
    );

    Ok(stats)
}
