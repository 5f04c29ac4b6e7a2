use crate::snapshot::{list_snapshots, Snapshot};
use anyhow::Result;
use std::path::Path;
use tracing::{error, info, warn};

/// Load the most recent valid snapshot from directory
///
/// Returns None if no snapshots exist or all are corrupt.
/// Tries snapshots from newest to oldest until one loads successfully.
pub fn load_latest_snapshot(snapshot_dir: &Path) -> Result<Option<Snapshot>> {
    if !snapshot_dir.exists() {
        info!(
            directory = %snapshot_dir.display(),
            "Snapshot directory does not exist, starting with an empty fleet"
        );
        return Ok(None);
    }

    let mut snapshots = list_snapshots(snapshot_dir)?;

    if snapshots.is_empty() {
        info!("No snapshots found, starting with an empty fleet");
        return Ok(None);
    }

    // Newest first
    snapshots.sort_by(|a, b| b.cmp(a));

    info!(
        count = snapshots.len(),
        directory = %snapshot_dir.display(),
        "Found snapshot(s), attempting to load newest"
    );

    for path in snapshots {
        match Snapshot::load_from_file(&path) {
            Ok(snapshot) => {
                info!(
                    path = %path.display(),
                    cabs = snapshot.cab_count(),
                    created_at = %snapshot.created_at,
                    "Loaded snapshot successfully"
                );
                return Ok(Some(snapshot));
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Corrupt snapshot, trying next oldest"
                );
            }
        }
    }

    error!("All snapshots are corrupt, starting with an empty fleet");
    Ok(None)
}
