//! MP4 sample table expansion.
//!
//! The sample table boxes describe samples in a compact, run-length form:
//! - stts: sample durations as `(count, delta)` runs
//! - stss: sync sample numbers (keyframes), 1-based
//! - stsc: sample-to-chunk runs
//! - stsz: sample sizes, uniform or per sample
//! - stco/co64: chunk base offsets
//!
//! [`SampleTableBuilder`] expands these into one concrete offset, size and
//! duration per sample. The resulting [`SampleTable`] carries a forward-only
//! cursor used while draining.

use super::atoms::{MediaHeader, SampleToChunkEntry};
use crate::{Error, Result};
use std::collections::HashSet;

/// Sample sizes from `stsz`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleSizes {
    /// Every sample has the same size (constant bit-rate formats).
    Uniform(u32),
    /// One size per sample.
    PerSample(Vec<u32>),
}

impl SampleSizes {
    /// Interpret a raw size list; a single entry is a uniform size.
    pub fn from_entries(mut entries: Vec<u32>) -> Self {
        if entries.len() == 1 {
            Self::Uniform(entries.remove(0))
        } else {
            Self::PerSample(entries)
        }
    }

    /// Size of the sample at `index`, if the table covers it.
    pub fn get(&self, index: usize) -> Option<u32> {
        match self {
            Self::Uniform(size) => Some(*size),
            Self::PerSample(sizes) => sizes.get(index).copied(),
        }
    }

    pub fn is_uniform(&self) -> bool {
        matches!(self, Self::Uniform(_))
    }
}

/// Fully expanded sample table for one track, with a drain cursor.
#[derive(Debug, Clone)]
pub struct SampleTable {
    time_scale: u32,
    offsets: Vec<u64>,
    sizes: SampleSizes,
    durations: Vec<u32>,
    keyframes: HashSet<u32>,
    has_sync_table: bool,
    cursor: usize,
    cumulative_duration: u64,
}

impl SampleTable {
    /// Create a new sample table builder.
    pub fn builder() -> SampleTableBuilder {
        SampleTableBuilder::new()
    }

    /// Media time scale (ticks per second). 0 means durations are unusable.
    pub fn time_scale(&self) -> u32 {
        self.time_scale
    }

    /// Number of samples in the track.
    pub fn sample_count(&self) -> usize {
        self.durations.len()
    }

    /// Current cursor position.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Byte offset of the current sample.
    pub fn offset(&self) -> u64 {
        self.offsets[self.cursor]
    }

    /// Size in bytes of the current sample.
    pub fn size(&self) -> u32 {
        self.size_at(self.cursor)
    }

    /// Duration of the current sample in track ticks.
    pub fn duration(&self) -> u32 {
        self.durations[self.cursor]
    }

    /// Duration of the current sample in milliseconds.
    pub fn duration_ms(&self) -> f64 {
        self.ticks_to_ms(self.duration() as u64)
    }

    /// Sum of durations up to and including the current sample, in ticks.
    pub fn cumulative_duration(&self) -> u64 {
        self.cumulative_duration
    }

    /// Cumulative duration in milliseconds.
    pub fn cumulative_duration_ms(&self) -> f64 {
        self.ticks_to_ms(self.cumulative_duration)
    }

    /// Decode time of the current sample in ticks (sum of earlier durations).
    pub fn start_time(&self) -> u64 {
        self.cumulative_duration - self.duration() as u64
    }

    /// Decode time of the current sample in milliseconds.
    pub fn start_time_ms(&self) -> f64 {
        self.ticks_to_ms(self.start_time())
    }

    /// Whether the current sample is listed in `stss`.
    pub fn is_keyframe(&self) -> bool {
        self.keyframes.contains(&(self.cursor as u32))
    }

    /// Whether the track carried a sync sample table at all.
    ///
    /// Without one every sample is a sync point, yet [`is_keyframe`]
    /// reports `false`; callers wanting the former must check this.
    ///
    /// [`is_keyframe`]: SampleTable::is_keyframe
    pub fn has_sync_table(&self) -> bool {
        self.has_sync_table
    }

    /// True while the cursor is below the last sample.
    pub fn has_more(&self) -> bool {
        self.cursor + 1 < self.durations.len()
    }

    /// Move to the next sample.
    ///
    /// Returns `false` without touching any state when the cursor already
    /// sits on the last sample.
    pub fn advance(&mut self) -> bool {
        if !self.has_more() {
            return false;
        }
        self.cursor += 1;
        self.cumulative_duration += self.durations[self.cursor] as u64;
        true
    }

    /// Expanded sample offsets.
    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    /// Expanded sample durations in ticks.
    pub fn durations(&self) -> &[u32] {
        &self.durations
    }

    /// Sample sizes as stored.
    pub fn sizes(&self) -> &SampleSizes {
        &self.sizes
    }

    /// Size of the sample at `index`.
    pub fn size_at(&self, index: usize) -> u32 {
        self.sizes.get(index).unwrap_or(0)
    }

    /// Sum of all sample sizes in bytes.
    pub fn total_size(&self) -> u64 {
        (0..self.sample_count())
            .map(|i| self.size_at(i) as u64)
            .sum()
    }

    /// Sum of all sample durations in ticks.
    pub fn total_duration(&self) -> u64 {
        self.durations.iter().map(|d| *d as u64).sum()
    }

    /// Sorted keyframe sample indices (0-based).
    pub fn keyframe_indices(&self) -> Vec<u32> {
        let mut indices: Vec<u32> = self.keyframes.iter().copied().collect();
        indices.sort_unstable();
        indices
    }

    fn ticks_to_ms(&self, ticks: u64) -> f64 {
        if self.time_scale == 0 {
            0.0
        } else {
            ticks as f64 * 1000.0 / self.time_scale as f64
        }
    }
}

/// Builder for expanding raw box data into a [`SampleTable`].
#[derive(Debug, Default)]
pub struct SampleTableBuilder {
    media_header: Option<MediaHeader>,
    // stss: sync sample numbers (1-based)
    sync_samples: Option<Vec<u32>>,
    // stts: (count, delta)
    stts_entries: Vec<(u32, u32)>,
    sample_sizes: Option<SampleSizes>,
    declared_sample_count: Option<u32>,
    chunk_offsets: Option<Vec<u64>>,
    stsc_entries: Option<Vec<SampleToChunkEntry>>,
}

impl SampleTableBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the media header (`mdhd`).
    pub fn set_media_header(&mut self, header: MediaHeader) {
        self.media_header = Some(header);
    }

    /// Set stss (sync sample) entries.
    pub fn set_sync_samples(&mut self, samples: Vec<u32>) {
        self.sync_samples = Some(samples);
    }

    /// Set stts (decoding time to sample) entries.
    pub fn set_stts(&mut self, entries: Vec<(u32, u32)>) {
        self.stts_entries = entries;
    }

    /// Set stsz (sample size) data.
    pub fn set_sample_sizes(&mut self, sizes: SampleSizes) {
        self.sample_sizes = Some(sizes);
    }

    /// Set chunk offsets (from stco or co64).
    pub fn set_chunk_offsets(&mut self, offsets: Vec<u64>) {
        self.chunk_offsets = Some(offsets);
    }

    /// Set stsc (sample to chunk) entries.
    pub fn set_stsc(&mut self, entries: Vec<SampleToChunkEntry>) {
        self.stsc_entries = Some(entries);
    }

    /// Set the sample count declared in `stsz`.
    pub fn set_sample_count(&mut self, count: u32) {
        self.declared_sample_count = Some(count);
    }

    /// Build the sample table.
    ///
    /// Fails with [`Error::MalformedIndex`] when `stco`/`stsc` are missing or
    /// when the time-to-sample, chunk layout and size tables disagree on the
    /// number of samples. All counts are reconciled before anything is
    /// expanded.
    pub fn build(self) -> Result<SampleTable> {
        let chunk_offsets = self
            .chunk_offsets
            .ok_or_else(|| Error::malformed("missing chunk offset box (stco/co64)"))?;
        let stsc = self
            .stsc_entries
            .ok_or_else(|| Error::malformed("missing sample-to-chunk box (stsc)"))?;

        let declared = stts_sample_count(&self.stts_entries)?;
        if declared == 0 {
            return Err(Error::malformed("time-to-sample table declares no samples"));
        }

        let runs = chunk_runs(&stsc, chunk_offsets.len() as u64)?;
        let laid_out = layout_sample_count(&runs)?;
        if laid_out != declared {
            return Err(Error::malformed(format!(
                "chunk layout describes {} samples but time-to-sample declares {}",
                laid_out, declared
            )));
        }

        if let Some(count) = self.declared_sample_count {
            if count as u64 != declared {
                return Err(Error::malformed(format!(
                    "sample size box declares {} samples but time-to-sample declares {}",
                    count, declared
                )));
            }
        }

        let sizes = self
            .sample_sizes
            .unwrap_or_else(|| SampleSizes::PerSample(Vec::new()));
        if let SampleSizes::PerSample(list) = &sizes {
            if list.len() as u64 != declared {
                return Err(Error::malformed(format!(
                    "sample size table has {} entries but time-to-sample declares {} samples",
                    list.len(),
                    declared
                )));
            }
        }

        let sample_count = usize::try_from(declared)
            .map_err(|_| Error::malformed(format!("{} samples do not fit in memory", declared)))?;
        let durations = expand_durations(&self.stts_entries, sample_count);
        let offsets = expand_offsets(&runs, &chunk_offsets, &sizes, sample_count)?;

        let has_sync_table = self.sync_samples.is_some();
        let keyframes: HashSet<u32> = self
            .sync_samples
            .unwrap_or_default()
            .into_iter()
            .filter_map(|number| number.checked_sub(1))
            .filter(|index| (*index as usize) < sample_count)
            .collect();

        let time_scale = self.media_header.map(|h| h.time_scale).unwrap_or(0);
        if time_scale == 0 {
            tracing::warn!("Track has no usable time scale; durations will report as zero");
        }

        let cumulative_duration = durations[0] as u64;

        Ok(SampleTable {
            time_scale,
            offsets,
            sizes,
            durations,
            keyframes,
            has_sync_table,
            cursor: 0,
            cumulative_duration,
        })
    }
}

/// Total sample count of the `(count, delta)` runs.
fn stts_sample_count(entries: &[(u32, u32)]) -> Result<u64> {
    entries.iter().try_fold(0u64, |total, (count, _)| {
        total
            .checked_add(*count as u64)
            .ok_or_else(|| Error::malformed("time-to-sample sample count overflows"))
    })
}

/// Expand `(count, delta)` runs into one duration per sample.
///
/// `sample_count` must equal the runs' total.
fn expand_durations(entries: &[(u32, u32)], sample_count: usize) -> Vec<u32> {
    let mut durations = Vec::with_capacity(sample_count);
    for (count, delta) in entries {
        durations.extend(std::iter::repeat(*delta).take(*count as usize));
    }
    durations
}

/// A validated sample-to-chunk run over chunks `first..end` (1-based).
#[derive(Debug, Clone, Copy)]
struct ChunkRun {
    first: u64,
    end: u64,
    samples_per_chunk: u32,
}

/// Resolve each stsc run to the chunk range it covers.
fn chunk_runs(runs: &[SampleToChunkEntry], chunk_count: u64) -> Result<Vec<ChunkRun>> {
    let mut resolved = Vec::with_capacity(runs.len());

    for (run_index, run) in runs.iter().enumerate() {
        let first = run.first_chunk as u64;
        if first == 0 {
            return Err(Error::malformed(format!(
                "sample-to-chunk run {} starts at chunk 0 (chunks are 1-based)",
                run_index
            )));
        }
        if first > chunk_count {
            return Err(Error::malformed(format!(
                "sample-to-chunk run {} references chunk {} but only {} chunk offsets exist",
                run_index, first, chunk_count
            )));
        }

        // Exclusive end; the final run extends through the last chunk.
        let end = match runs.get(run_index + 1) {
            Some(next) if (next.first_chunk as u64) <= first => {
                return Err(Error::malformed(format!(
                    "sample-to-chunk run {} first chunk {} does not follow {}",
                    run_index + 1,
                    next.first_chunk,
                    first
                )));
            }
            Some(next) => next.first_chunk as u64,
            None => chunk_count + 1,
        };
        if end > chunk_count + 1 {
            return Err(Error::malformed(format!(
                "sample-to-chunk run {} references chunk {} but only {} chunk offsets exist",
                run_index + 1,
                end,
                chunk_count
            )));
        }

        resolved.push(ChunkRun {
            first,
            end,
            samples_per_chunk: run.samples_per_chunk,
        });
    }

    Ok(resolved)
}

/// Number of samples the chunk runs lay out.
fn layout_sample_count(runs: &[ChunkRun]) -> Result<u64> {
    runs.iter().try_fold(0u64, |total, run| {
        (run.end - run.first)
            .checked_mul(run.samples_per_chunk as u64)
            .and_then(|samples| total.checked_add(samples))
            .ok_or_else(|| Error::malformed("chunk layout sample count overflows"))
    })
}

/// Lay out every sample's byte offset from the chunk runs.
///
/// `sample_index` is the single running counter shared by the run, chunk and
/// per-chunk loops; it selects the size of each emitted sample. The runs must
/// lay out exactly `sample_count` samples.
fn expand_offsets(
    runs: &[ChunkRun],
    chunk_offsets: &[u64],
    sizes: &SampleSizes,
    sample_count: usize,
) -> Result<Vec<u64>> {
    let mut offsets = Vec::with_capacity(sample_count);
    let mut sample_index = 0usize;

    for run in runs {
        for chunk in run.first..run.end {
            let base = chunk_offsets
                .get((chunk - 1) as usize)
                .copied()
                .ok_or_else(|| Error::malformed(format!("no offset for chunk {}", chunk)))?;

            let mut position = base;
            for _ in 0..run.samples_per_chunk {
                let size = sizes.get(sample_index).ok_or_else(|| {
                    Error::malformed(format!("no size for sample {}", sample_index))
                })?;

                offsets.push(position);
                position = position.checked_add(size as u64).ok_or_else(|| {
                    Error::malformed(format!("sample {} offset overflows", sample_index))
                })?;
                sample_index += 1;
            }
        }
    }

    Ok(offsets)
}
