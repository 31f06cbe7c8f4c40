//! Destinations for drained samples.

use anyhow::{Context, Result};
use sampledrain_media::Sample;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Receives samples on the async side of a drain.
pub trait SampleSink: Send {
    /// Handle one sample.
    fn write(&mut self, sample: &Sample) -> Result<()>;

    /// Flush buffered output and report what was written.
    fn finish(&mut self) -> Result<SinkSummary>;
}

/// What a sink wrote.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SinkSummary {
    pub samples: u64,
    pub bytes: u64,
    /// Files created by the sink, if any.
    pub files: Vec<PathBuf>,
}

impl SinkSummary {
    fn record(&mut self, sample: &Sample) {
        self.samples += 1;
        self.bytes += sample.payload.len() as u64;
    }
}

/// Appends each track's payloads to its own file.
///
/// Track `n` of `movie.mp4` lands in `movie.track-n.bin`; the result is the
/// track's raw elementary stream in drain order.
pub struct TrackFileSink {
    dir: PathBuf,
    stem: String,
    writers: BTreeMap<usize, (PathBuf, BufWriter<File>)>,
    summary: SinkSummary,
}

impl TrackFileSink {
    /// Create a sink writing into `dir` for the container at `source`.
    pub fn new(dir: &Path, source: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory: {:?}", dir))?;
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "container".to_string());

        Ok(Self {
            dir: dir.to_path_buf(),
            stem,
            writers: BTreeMap::new(),
            summary: SinkSummary::default(),
        })
    }

    /// Path used for a track.
    pub fn track_path(&self, track: usize) -> PathBuf {
        self.dir.join(format!("{}.track-{}.bin", self.stem, track))
    }
}

impl SampleSink for TrackFileSink {
    fn write(&mut self, sample: &Sample) -> Result<()> {
        if !self.writers.contains_key(&sample.track_index) {
            let path = self.track_path(sample.track_index);
            let file = File::create(&path)
                .with_context(|| format!("Failed to create track file: {:?}", path))?;
            tracing::debug!("Writing track {} to {:?}", sample.track_index, path);
            self.writers
                .insert(sample.track_index, (path, BufWriter::new(file)));
        }

        if let Some((path, writer)) = self.writers.get_mut(&sample.track_index) {
            writer
                .write_all(&sample.payload)
                .with_context(|| format!("Failed to write to {:?}", path))?;
        }
        self.summary.record(sample);
        Ok(())
    }

    fn finish(&mut self) -> Result<SinkSummary> {
        for (path, writer) in self.writers.values_mut() {
            writer
                .flush()
                .with_context(|| format!("Failed to flush {:?}", path))?;
        }
        let mut summary = self.summary.clone();
        summary.files = self.writers.values().map(|(p, _)| p.clone()).collect();
        Ok(summary)
    }
}

#[derive(Serialize)]
struct SampleRecord {
    track: usize,
    sample: usize,
    size: usize,
    duration_ms: f64,
    decode_time_ms: f64,
    keyframe: bool,
}

impl From<&Sample> for SampleRecord {
    fn from(sample: &Sample) -> Self {
        Self {
            track: sample.track_index,
            sample: sample.sample_index,
            size: sample.payload.len(),
            duration_ms: sample.duration_ms,
            decode_time_ms: sample.decode_time_ms,
            keyframe: sample.is_keyframe,
        }
    }
}

/// Writes one line per sample, as text or JSON.
pub struct LogSink {
    out: Box<dyn Write + Send>,
    json: bool,
    summary: SinkSummary,
}

impl LogSink {
    pub fn new(out: Box<dyn Write + Send>, json: bool) -> Self {
        Self {
            out,
            json,
            summary: SinkSummary::default(),
        }
    }

    /// Sink printing to stdout.
    pub fn stdout(json: bool) -> Self {
        Self::new(Box::new(std::io::stdout()), json)
    }
}

impl SampleSink for LogSink {
    fn write(&mut self, sample: &Sample) -> Result<()> {
        let record = SampleRecord::from(sample);
        if self.json {
            serde_json::to_writer(&mut self.out, &record)?;
            writeln!(self.out)?;
        } else {
            writeln!(
                self.out,
                "track={} sample={} size={} duration_ms={:.3} decode_ms={:.3}{}",
                record.track,
                record.sample,
                record.size,
                record.duration_ms,
                record.decode_time_ms,
                if record.keyframe { " key" } else { "" }
            )?;
        }
        self.summary.record(sample);
        Ok(())
    }

    fn finish(&mut self) -> Result<SinkSummary> {
        self.out.flush()?;
        Ok(self.summary.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::sync::{Arc, Mutex};

    fn sample(track_index: usize, sample_index: usize, payload: &'static [u8]) -> Sample {
        Sample {
            track_index,
            sample_index,
            payload: Bytes::from_static(payload),
            duration_ms: 20.0,
            decode_time_ms: sample_index as f64 * 20.0,
            is_keyframe: sample_index == 0,
        }
    }

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_track_file_sink_splits_tracks() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = TrackFileSink::new(dir.path(), Path::new("/in/movie.mp4")).unwrap();

        sink.write(&sample(1, 0, b"aa")).unwrap();
        sink.write(&sample(0, 0, b"V")).unwrap();
        sink.write(&sample(1, 1, b"bb")).unwrap();
        let summary = sink.finish().unwrap();

        assert_eq!(summary.samples, 3);
        assert_eq!(summary.bytes, 5);
        assert_eq!(summary.files.len(), 2);
        assert_eq!(
            std::fs::read(dir.path().join("movie.track-1.bin")).unwrap(),
            b"aabb"
        );
        assert_eq!(
            std::fs::read(dir.path().join("movie.track-0.bin")).unwrap(),
            b"V"
        );
    }

    #[test]
    fn test_log_sink_text() {
        let buf = SharedBuf::default();
        let mut sink = LogSink::new(Box::new(buf.clone()), false);
        sink.write(&sample(0, 0, b"abc")).unwrap();
        sink.finish().unwrap();

        let out = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        assert_eq!(
            out,
            "track=0 sample=0 size=3 duration_ms=20.000 decode_ms=0.000 key\n"
        );
    }

    #[test]
    fn test_log_sink_json_lines() {
        let buf = SharedBuf::default();
        let mut sink = LogSink::new(Box::new(buf.clone()), true);
        sink.write(&sample(2, 1, b"xy")).unwrap();
        let summary = sink.finish().unwrap();

        let out = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        let value: serde_json::Value = serde_json::from_str(out.trim()).unwrap();
        assert_eq!(value["track"], 2);
        assert_eq!(value["size"], 2);
        assert_eq!(value["keyframe"], false);
        assert_eq!(summary.bytes, 2);
    }
}
