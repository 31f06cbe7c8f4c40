use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Decides when a container has finished being written.
///
/// A file is settled once neither a change event nor a size change has been
/// observed for the settle duration.
pub struct FileSettleTracker {
    /// Last change time and size per pending file
    pending: HashMap<PathBuf, (Instant, Option<u64>)>,
    settle_duration: Duration,
}

impl FileSettleTracker {
    pub fn new(settle_duration: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            settle_duration,
        }
    }

    /// Record that a file was created or modified
    pub fn file_changed(&mut self, path: PathBuf) {
        let size = file_size(&path);
        self.pending.insert(path, (Instant::now(), size));
    }

    /// Number of files still settling
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Remove and return every settled file.
    ///
    /// Files that vanished are dropped; files whose size moved since the last
    /// look restart their settle window.
    pub fn take_settled(&mut self) -> Vec<PathBuf> {
        let now = Instant::now();
        let mut settled = Vec::new();

        self.pending.retain(|path, (last_change, last_size)| {
            let size = file_size(path);
            if size.is_none() {
                tracing::debug!("Pending file disappeared: {:?}", path);
                return false;
            }
            if size != *last_size {
                *last_change = now;
                *last_size = size;
                return true;
            }
            if now.duration_since(*last_change) >= self.settle_duration {
                settled.push(path.clone());
                return false;
            }
            true
        });

        for path in &settled {
            tracing::info!("File settled: {:?}", path);
        }
        settled.sort();
        settled
    }
}

fn file_size(path: &Path) -> Option<u64> {
    std::fs::metadata(path)
        .ok()
        .filter(|m| m.is_file())
        .map(|m| m.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_unchanged_file_settles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.mp4");
        std::fs::write(&path, b"moov").unwrap();

        let mut tracker = FileSettleTracker::new(Duration::ZERO);
        tracker.file_changed(path.clone());
        assert_eq!(tracker.take_settled(), vec![path]);
        assert_eq!(tracker.pending_count(), 0);
    }

    #[test]
    fn test_growing_file_restarts_window() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b.mp4");
        std::fs::write(&path, b"ftyp").unwrap();

        let mut tracker = FileSettleTracker::new(Duration::ZERO);
        tracker.file_changed(path.clone());

        std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap()
            .write_all(b"mdat")
            .unwrap();

        assert!(tracker.take_settled().is_empty());
        assert_eq!(tracker.take_settled(), vec![path]);
    }

    #[test]
    fn test_vanished_file_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.mp4");
        std::fs::write(&path, b"x").unwrap();

        let mut tracker = FileSettleTracker::new(Duration::from_secs(60));
        tracker.file_changed(path.clone());
        std::fs::remove_file(&path).unwrap();

        assert!(tracker.take_settled().is_empty());
        assert_eq!(tracker.pending_count(), 0);
    }

    #[test]
    fn test_recent_file_not_settled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("d.mp4");
        std::fs::write(&path, b"x").unwrap();

        let mut tracker = FileSettleTracker::new(Duration::from_secs(60));
        tracker.file_changed(path);
        assert!(tracker.take_settled().is_empty());
        assert_eq!(tracker.pending_count(), 1);
    }
}
