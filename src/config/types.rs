use sampledrain_media::InterleaveStrategy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub drain: DrainConfig,

    #[serde(default)]
    pub watch: WatchConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DrainConfig {
    /// Cross-track ordering: "anchor" (track 0 gated on the others) or
    /// "chronological" (merge by decode time)
    #[serde(default)]
    pub strategy: InterleaveStrategy,

    /// Delete each container once all of its samples were delivered
    #[serde(default = "default_remove_after_drain")]
    pub remove_after_drain: bool,

    /// Directory for per-track sample dumps (none = log samples only)
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    /// Samples buffered between the drain thread and the writer
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_remove_after_drain() -> bool {
    true
}

fn default_channel_capacity() -> usize {
    64
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            strategy: InterleaveStrategy::default(),
            remove_after_drain: default_remove_after_drain(),
            output_dir: None,
            channel_capacity: default_channel_capacity(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WatchConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub paths: Vec<PathBuf>,

    /// Seconds a file must stay unchanged before it counts as finished
    #[serde(default = "default_settle_time")]
    pub settle_time_secs: u64,

    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

fn default_settle_time() -> u64 {
    5
}

fn default_extensions() -> Vec<String> {
    ["mp4", "m4v", "m4a", "mov"]
        .iter()
        .map(|e| e.to_string())
        .collect()
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            paths: Vec::new(),
            settle_time_secs: default_settle_time(),
            extensions: default_extensions(),
        }
    }
}
