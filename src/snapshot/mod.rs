use crate::cab::CabRecord;
use crate::store::MemoryStore;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

pub mod config;
pub mod manager;
pub mod recovery;

pub use manager::SnapshotManager;
pub use recovery::load_latest_snapshot;


/// Current cab state at a point in time
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Snapshot {
    /// Snapshot format version
    pub snapshot_version: String,

    /// Timestamp when snapshot was created
    pub created_at: DateTime<Utc>,

    /// All cab records at snapshot time (cab id -> record)
    pub cabs: HashMap<String, CabRecord>,
}

impl Snapshot {
    /// Capture every record currently held by `store`
    pub fn from_store(store: &MemoryStore) -> Self {
        let cabs: HashMap<String, CabRecord> = store
            .all_records()
            .into_iter()
            .map(|record| (record.id.clone(), record))
            .collect();

        Self {
            snapshot_version: "1".to_string(),
            created_at: Utc::now(),
            cabs,
        }
    }

    /// Consume the snapshot into the record map expected by `MemoryStore::load_records`
    pub fn into_records(self) -> HashMap<String, CabRecord> {
        self.cabs
    }

    /// Save snapshot to filesystem as compressed JSON (gzip)
    ///
    /// Uses atomic write: writes to .tmp file, fsyncs, then renames.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json =
            serde_json::to_vec(self).context("Failed to serialize snapshot to JSON")?;

        let tmp_path = path.with_extension("tmp");

        {
            let tmp_file = File::create(&tmp_path)
                .context("Failed to create temporary snapshot file")?;

            let mut encoder = GzEncoder::new(tmp_file, Compression::default());
            encoder
                .write_all(&json)
                .context("Failed to write compressed snapshot data")?;

            let file = encoder.finish().context("Failed to finish compression")?;

            file.sync_all()
                .context("Failed to sync snapshot file to disk")?;
        }

        fs::rename(&tmp_path, path).context("Failed to rename temporary snapshot file")?;

        Ok(())
    }

    /// Load snapshot from a `.json.gz` file, or a plain `.json` seed file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let file = File::open(path).context("Failed to open snapshot file")?;

        let is_compressed = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext == "gz")
            .unwrap_or(false);

        let mut json = String::new();
        if is_compressed {
            GzDecoder::new(file)
                .read_to_string(&mut json)
                .context("Failed to decompress snapshot file")?;
        } else {
            let mut file = file;
            file.read_to_string(&mut json)
                .context("Failed to read snapshot file")?;
        }

        serde_json::from_str(&json).context("Failed to deserialize snapshot JSON")
    }

    /// Get cab count (for logging/display)
    pub fn cab_count(&self) -> usize {
        self.cabs.len()
    }
}

/// List all snapshot files in directory
pub(crate) fn list_snapshots(directory: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(directory).context("Failed to read snapshot directory")?;

    let mut snapshots = Vec::new();

    for entry in entries {
        let entry = entry.context("Failed to read directory entry")?;
        let path = entry.path();

        if path.is_file() {
            if let Some(filename) = path.file_name().and_then(|n| n.to_str()) {
                if filename.starts_with("snapshot-")
                    && (filename.ends_with(".json.gz") || filename.ends_with(".json"))
                {
                    snapshots.push(path);
                }
            }
        }
    }

    Ok(snapshots)
}
