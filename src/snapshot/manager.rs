use crate::snapshot::{config::SnapshotConfig, list_snapshots, Snapshot};
use crate::store::MemoryStore;
use anyhow::{Context, Result};
use chrono::Utc;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{error, info};


/// Periodically persists the cab store to disk
pub struct SnapshotManager {
    store: Arc<MemoryStore>,
    config: SnapshotConfig,
}

impl SnapshotManager {
    pub fn new(store: Arc<MemoryStore>, config: SnapshotConfig) -> Self {
        Self { store, config }
    }

    /// Run background snapshot loop
    ///
    /// Runs until the task is aborted. The first snapshot is taken one full
    /// interval after start.
    pub async fn run_snapshot_loop(&self) -> Result<()> {
        if !self.config.enabled {
            info!("Snapshot manager disabled, exiting loop");
            return Ok(());
        }

        info!(
            interval_seconds = self.config.interval_seconds,
            directory = %self.config.directory.display(),
            keep_count = self.config.keep_count,
            "Starting snapshot manager"
        );

        fs::create_dir_all(&self.config.directory)
            .context("Failed to create snapshot directory")?;

        let mut timer = interval(Duration::from_secs(self.config.interval_seconds.max(1)));
        // First tick completes immediately
        timer.tick().await;

        loop {
            timer.tick().await;

            if let Err(e) = self.create_and_save_snapshot() {
                error!(error = %e, "Failed to create snapshot");
            }
        }
    }

    /// Write a snapshot immediately (used on shutdown)
    pub fn save_now(&self) -> Result<Option<PathBuf>> {
        if !self.config.enabled {
            return Ok(None);
        }
        fs::create_dir_all(&self.config.directory)
            .context("Failed to create snapshot directory")?;
        self.create_and_save_snapshot().map(Some)
    }

    fn create_and_save_snapshot(&self) -> Result<PathBuf> {
        let snapshot = Snapshot::from_store(&self.store);
        let cab_count = snapshot.cab_count();

        let path = self.snapshot_path();
        snapshot.save_to_file(&path)?;

        info!(cabs = cab_count, path = %path.display(), "Snapshot saved");

        self.cleanup_old_snapshots()?;

        Ok(path)
    }

    /// Format: snapshot-{timestamp}.json.gz, e.g. snapshot-20260212T153045.123Z.json.gz
    fn snapshot_path(&self) -> PathBuf {
        let timestamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
        let filename = format!("snapshot-{}.json.gz", timestamp);
        self.config.directory.join(filename)
    }

    /// Delete old snapshots, keeping only the most recent N
    fn cleanup_old_snapshots(&self) -> Result<()> {
        let mut snapshots = list_snapshots(&self.config.directory)?;

        if snapshots.len() <= self.config.keep_count {
            return Ok(());
        }

        // Timestamped names sort chronologically
        snapshots.sort();

        let delete_count = snapshots.len() - self.config.keep_count;
        for path in &snapshots[..delete_count] {
            if let Err(e) = fs::remove_file(path) {
                error!(error = %e, path = %path.display(), "Failed to delete old snapshot");
            } else {
                info!(path = %path.display(), "Deleted old snapshot");
            }
        }

        Ok(())
    }
}
