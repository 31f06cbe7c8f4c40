//! Cross-track sample scheduling.
//!
//! A [`Session`] owns one [`SampleTable`] per track and drains them into a
//! single stream of samples. Two orderings are available:
//!
//! - [`InterleaveStrategy::Anchor`]: track 0 is the timing reference. Each
//!   secondary track publishes its cumulative time into a shared threshold,
//!   and the anchor only emits once the threshold has reached the end of its
//!   current sample. Cheap, and close to chronological for one video track
//!   plus one audio track.
//! - [`InterleaveStrategy::Chronological`]: k-way merge on each track's next
//!   decode start time, ties broken by track index.

mod merge;

use crate::consumer::{Sample, SampleConsumer};
use crate::mp4::{MovieIndex, SampleTable};
use crate::source::SampleSource;
use crate::{Error, Result};
use merge::NextSample;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering};

/// How samples from different tracks are ordered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "serialize",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum InterleaveStrategy {
    /// Gate track 0 on the progress of the other tracks.
    #[default]
    Anchor,
    /// Exact merge by decode time across all tracks.
    Chronological,
}

impl std::str::FromStr for InterleaveStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "anchor" => Ok(Self::Anchor),
            "chronological" => Ok(Self::Chronological),
            other => Err(format!("unknown interleave strategy: {}", other)),
        }
    }
}

impl std::fmt::Display for InterleaveStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Anchor => write!(f, "anchor"),
            Self::Chronological => write!(f, "chronological"),
        }
    }
}

/// Per-track totals for a finished drain.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct TrackStats {
    pub samples: u64,
    pub bytes: u64,
    pub duration_ms: f64,
    pub keyframes: u64,
}

/// Result of a completed drain.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct DrainStats {
    pub tracks: Vec<TrackStats>,
}

impl DrainStats {
    fn new(track_count: usize) -> Self {
        Self {
            tracks: vec![TrackStats::default(); track_count],
        }
    }

    /// Samples emitted across all tracks.
    pub fn total_samples(&self) -> u64 {
        self.tracks.iter().map(|t| t.samples).sum()
    }

    /// Payload bytes emitted across all tracks.
    pub fn total_bytes(&self) -> u64 {
        self.tracks.iter().map(|t| t.bytes).sum()
    }
}

struct Lane {
    table: SampleTable,
    // Set once the last sample has been emitted.
    finished: bool,
}

/// Drain state for one container.
pub struct Session {
    lanes: Vec<Lane>,
    total_duration_ms: f64,
    strategy: InterleaveStrategy,
}

impl Session {
    /// Create a session over already-built tables.
    pub fn new(tables: Vec<SampleTable>, total_duration_ms: f64) -> Self {
        let lanes = tables
            .into_iter()
            .map(|table| Lane {
                table,
                finished: false,
            })
            .collect();
        Self {
            lanes,
            total_duration_ms,
            strategy: InterleaveStrategy::default(),
        }
    }

    /// Build every track's table from a parsed index.
    ///
    /// Any malformed track fails the whole session before a sample is read.
    pub fn from_index(index: &MovieIndex) -> Result<Self> {
        let tables = index.sample_tables()?;
        Ok(Self::new(tables, index.duration_ms()))
    }

    /// Select the interleave strategy.
    pub fn with_strategy(mut self, strategy: InterleaveStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn strategy(&self) -> InterleaveStrategy {
        self.strategy
    }

    pub fn track_count(&self) -> usize {
        self.lanes.len()
    }

    /// Container duration in milliseconds.
    pub fn total_duration_ms(&self) -> f64 {
        self.total_duration_ms
    }

    /// Whether any track still has a sample to emit.
    pub fn has_pending(&self) -> bool {
        self.lanes.iter().any(|lane| !lane.finished)
    }

    /// Emit every sample of every track into `consumer`.
    ///
    /// Each sample is a seek, a read of exactly its size, and one synchronous
    /// `consume` call. `cancel` is checked before every sample. Read and
    /// consumer failures abort the drain.
    pub fn drain<S, C>(
        mut self,
        source: &mut S,
        consumer: &mut C,
        cancel: Option<&AtomicBool>,
    ) -> Result<DrainStats>
    where
        S: SampleSource + ?Sized,
        C: SampleConsumer + ?Sized,
    {
        let mut stats = DrainStats::new(self.lanes.len());
        let mut emitter = Emitter {
            source,
            consumer,
            cancel,
            stats: &mut stats,
        };

        tracing::debug!(
            tracks = self.lanes.len(),
            strategy = %self.strategy,
            total_duration_ms = self.total_duration_ms,
            "Starting drain"
        );

        match self.strategy {
            InterleaveStrategy::Anchor => self.drain_anchor(&mut emitter)?,
            InterleaveStrategy::Chronological => self.drain_chronological(&mut emitter)?,
        }

        tracing::debug!(
            samples = stats.total_samples(),
            bytes = stats.total_bytes(),
            "Drain complete"
        );

        Ok(stats)
    }

    fn drain_anchor<S, C>(&mut self, emitter: &mut Emitter<'_, S, C>) -> Result<()>
    where
        S: SampleSource + ?Sized,
        C: SampleConsumer + ?Sized,
    {
        if self.lanes.is_empty() {
            return Ok(());
        }

        // A lone track is never gated.
        let single = self.lanes.len() == 1;
        let mut threshold = if single {
            self.lanes[0].table.cumulative_duration_ms()
        } else {
            0.0
        };
        let mut stall_logged = false;

        while self.has_pending() {
            let mut emitted = false;

            for index in 0..self.lanes.len() {
                let lane = &self.lanes[index];
                if index == 0 {
                    if lane.finished {
                        continue;
                    }
                    if !single && threshold < lane.table.cumulative_duration_ms() {
                        continue;
                    }
                } else {
                    if lane.finished {
                        threshold = self.total_duration_ms;
                        continue;
                    }
                    threshold = lane.table.cumulative_duration_ms();
                }

                emitter.emit(index, &mut self.lanes[index])?;
                emitted = true;
            }

            // Only the anchor is left and its time lies beyond the container
            // duration; release it so the drain terminates.
            if !emitted {
                if !stall_logged {
                    tracing::debug!(
                        anchor_ms = self.lanes[0].table.cumulative_duration_ms(),
                        threshold,
                        "Anchor track past container duration; releasing"
                    );
                    stall_logged = true;
                }
                emitter.emit(0, &mut self.lanes[0])?;
            }
        }

        Ok(())
    }

    fn drain_chronological<S, C>(&mut self, emitter: &mut Emitter<'_, S, C>) -> Result<()>
    where
        S: SampleSource + ?Sized,
        C: SampleConsumer + ?Sized,
    {
        let mut queue: BinaryHeap<Reverse<NextSample>> = self
            .lanes
            .iter()
            .enumerate()
            .filter(|(_, lane)| !lane.finished)
            .map(|(index, lane)| Reverse(next_sample(index, &lane.table)))
            .collect();

        while let Some(Reverse(next)) = queue.pop() {
            let lane = &mut self.lanes[next.track];
            emitter.emit(next.track, lane)?;
            if !lane.finished {
                queue.push(Reverse(next_sample(next.track, &lane.table)));
            }
        }

        Ok(())
    }
}

fn next_sample(track: usize, table: &SampleTable) -> NextSample {
    NextSample::new(track, table.start_time(), table.time_scale())
}

struct Emitter<'a, S: ?Sized, C: ?Sized> {
    source: &'a mut S,
    consumer: &'a mut C,
    cancel: Option<&'a AtomicBool>,
    stats: &'a mut DrainStats,
}

impl<S, C> Emitter<'_, S, C>
where
    S: SampleSource + ?Sized,
    C: SampleConsumer + ?Sized,
{
    /// Read the lane's current sample, hand it to the consumer, advance.
    fn emit(&mut self, track: usize, lane: &mut Lane) -> Result<()> {
        if self.cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            return Err(Error::Cancelled {
                emitted: self.stats.total_samples(),
            });
        }

        let table = &lane.table;
        let offset = table.offset();
        let size = table.size();

        self.source
            .seek(offset)
            .map_err(|source| Error::ReadFailure {
                track,
                offset,
                source,
            })?;
        let payload = self
            .source
            .read(size as usize)
            .map_err(|source| Error::ReadFailure {
                track,
                offset,
                source,
            })?;

        let sample = Sample {
            track_index: track,
            sample_index: table.cursor(),
            payload,
            duration_ms: table.duration_ms(),
            decode_time_ms: table.start_time_ms(),
            is_keyframe: table.is_keyframe(),
        };

        tracing::trace!(
            track,
            sample = sample.sample_index,
            offset,
            size,
            keyframe = sample.is_keyframe,
            "Emitting sample"
        );

        let entry = &mut self.stats.tracks[track];
        entry.samples += 1;
        entry.bytes += size as u64;
        entry.duration_ms += sample.duration_ms;
        if sample.is_keyframe {
            entry.keyframes += 1;
        }

        self.consumer.consume(sample)?;

        if !lane.table.advance() {
            lane.finished = true;
        }
        Ok(())
    }
}
