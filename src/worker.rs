//! Runs drains off the async runtime.
//!
//! The drain itself is synchronous: it owns its session and reader for the
//! whole pass and runs on a blocking thread. Samples cross back to the async
//! side over a bounded channel and are written to a [`SampleSink`] there.
//! The container is only removed after the sink has finished.

use crate::sink::{SampleSink, SinkSummary};
use anyhow::{Context, Result};
use parking_lot::Mutex;
use sampledrain_media::{drain_file, ChannelConsumer, DrainOptions, DrainStats, InterleaveStrategy};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Outcome of one drained container.
#[derive(Debug, Clone, Serialize)]
pub struct DrainReport {
    pub path: PathBuf,
    pub stats: DrainStats,
    pub sink: SinkSummary,
}

/// Drains containers, at most one at a time per path.
#[derive(Clone)]
pub struct DrainWorker {
    strategy: InterleaveStrategy,
    remove_after_drain: bool,
    channel_capacity: usize,
    stop_signal: Arc<AtomicBool>,
    in_flight: Arc<Mutex<HashSet<PathBuf>>>,
}

impl DrainWorker {
    pub fn new(strategy: InterleaveStrategy, remove_after_drain: bool, channel_capacity: usize) -> Self {
        Self {
            strategy,
            remove_after_drain,
            channel_capacity: channel_capacity.max(1),
            stop_signal: Arc::new(AtomicBool::new(false)),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Build a worker from the `[drain]` config section.
    pub fn from_config(config: &crate::config::DrainConfig) -> Self {
        Self::new(
            config.strategy,
            config.remove_after_drain,
            config.channel_capacity,
        )
    }

    /// Flag that stops running drains before their next sample.
    pub fn stop_signal(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop_signal)
    }

    /// Whether a drain of `path` is currently running.
    pub fn is_draining(&self, path: &Path) -> bool {
        self.in_flight.lock().contains(&in_flight_key(path))
    }

    /// Drain the container at `path` into `sink`.
    pub async fn drain(&self, path: &Path, sink: &mut dyn SampleSink) -> Result<DrainReport> {
        let key = in_flight_key(path);
        if !self.in_flight.lock().insert(key.clone()) {
            anyhow::bail!("Container is already being drained: {:?}", path);
        }
        let _guard = InFlightGuard {
            set: Arc::clone(&self.in_flight),
            key,
        };

        if self.stop_signal.load(Ordering::Relaxed) {
            anyhow::bail!("Worker is stopped");
        }

        // The container is removed here, once the sink has taken every sample.
        let options = DrainOptions {
            strategy: self.strategy,
            remove_after_drain: false,
            cancel: Some(self.stop_signal()),
        };
        let (mut consumer, mut rx) = ChannelConsumer::channel(self.channel_capacity);
        let drain_path = path.to_path_buf();
        let handle = tokio::task::spawn_blocking(move || {
            drain_file(&drain_path, &mut consumer, &options)
        });

        while let Some(sample) = rx.recv().await {
            if let Err(e) = sink.write(&sample) {
                // Dropping the receiver makes the drain fail on its next sample.
                drop(rx);
                let _ = handle.await;
                return Err(e.context(format!("Sink failed while draining {:?}", path)));
            }
        }

        let stats = handle
            .await
            .context("Drain task panicked")?
            .with_context(|| format!("Failed to drain {:?}", path))?;
        let summary = sink.finish()?;

        if self.remove_after_drain {
            if let Err(e) = std::fs::remove_file(path) {
                tracing::warn!("Failed to remove drained container {:?}: {}", path, e);
            }
        }

        tracing::info!(
            "Drained {:?}: {} samples, {} bytes",
            path,
            stats.total_samples(),
            stats.total_bytes()
        );

        Ok(DrainReport {
            path: path.to_path_buf(),
            stats,
            sink: summary,
        })
    }
}

fn in_flight_key(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

struct InFlightGuard {
    set: Arc<Mutex<HashSet<PathBuf>>>,
    key: PathBuf,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.lock().remove(&self.key);
    }
}
