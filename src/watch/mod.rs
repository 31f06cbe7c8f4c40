//! Completion trigger: watch directories for finished containers.

pub mod settle;

pub use settle::FileSettleTracker;

use crate::config::WatchConfig;
use anyhow::{Context, Result};
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

/// Watches directories and reports containers once they stop changing
pub struct FileWatcher {
    config: WatchConfig,
    watcher: Option<RecommendedWatcher>,
}

impl FileWatcher {
    pub fn new(config: WatchConfig) -> Self {
        Self {
            config,
            watcher: None,
        }
    }

    /// Start watching configured directories.
    ///
    /// Settled container paths are sent on `finished_tx`.
    pub fn start(&mut self, finished_tx: mpsc::Sender<PathBuf>) -> Result<()> {
        if self.config.paths.is_empty() {
            tracing::warn!("No watch paths configured");
            return Ok(());
        }

        let (event_tx, mut event_rx) = mpsc::channel::<PathBuf>(100);
        let extensions = self.config.extensions.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| {
                if let Ok(event) = res {
                    // Only care about creates and modifications
                    if event.kind.is_create() || event.kind.is_modify() {
                        for path in event.paths {
                            if is_container_file(&path, &extensions) {
                                let _ = event_tx.blocking_send(path);
                            }
                        }
                    }
                }
            },
            Config::default(),
        )
        .context("Failed to create file watcher")?;

        for path in &self.config.paths {
            if path.exists() {
                watcher
                    .watch(path, RecursiveMode::Recursive)
                    .with_context(|| format!("Failed to watch path: {:?}", path))?;
                tracing::info!("Watching directory: {:?}", path);
            } else {
                tracing::warn!("Watch path does not exist: {:?}", path);
            }
        }

        self.watcher = Some(watcher);

        let mut tracker =
            FileSettleTracker::new(Duration::from_secs(self.config.settle_time_secs));
        let poll = Duration::from_secs(self.config.settle_time_secs.clamp(1, 5));

        tokio::spawn(async move {
            let mut check_interval = tokio::time::interval(poll);

            loop {
                tokio::select! {
                    event = event_rx.recv() => {
                        match event {
                            Some(path) => {
                                tracing::debug!("File event: {:?}", path);
                                tracker.file_changed(path);
                            }
                            None => break,
                        }
                    }

                    _ = check_interval.tick() => {
                        for path in tracker.take_settled() {
                            if finished_tx.send(path).await.is_err() {
                                tracing::debug!("Finished-container receiver dropped");
                                return;
                            }
                        }
                    }
                }
            }
        });

        Ok(())
    }

    /// Stop watching
    pub fn stop(&mut self) {
        self.watcher = None;
        tracing::info!("File watcher stopped");
    }
}

/// Check if a file has one of the container extensions
pub fn is_container_file(path: &Path, extensions: &[String]) -> bool {
    match path.extension() {
        Some(ext) => {
            let ext = ext.to_string_lossy().to_lowercase();
            extensions.iter().any(|e| e.to_lowercase() == ext)
        }
        None => false,
    }
}
