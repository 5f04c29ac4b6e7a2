use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for snapshot manager
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Enable periodic snapshots and restore on startup
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Interval between snapshots (seconds)
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,

    /// Directory to store snapshots
    #[serde(default = "default_directory")]
    pub directory: PathBuf,

    /// Number of snapshots to keep (delete oldest)
    #[serde(default = "default_keep_count")]
    pub keep_count: usize,
}

fn default_enabled() -> bool {
    true
}

fn default_interval_seconds() -> u64 {
    60
}

fn default_directory() -> PathBuf {
    PathBuf::from("/var/lib/cabtrack/snapshots")
}

fn default_keep_count() -> usize {
    10
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            interval_seconds: default_interval_seconds(),
            directory: default_directory(),
            keep_count: default_keep_count(),
        }
    }
}
