// ABOUTME: Optional snapshot seam: persisted projection checkpoints per entity stream.
// ABOUTME: FsSnapshotStore writes state_<sequence>.json atomically and loads the latest.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::paths::{fs_name, sync_parent};

/// Errors that can occur during snapshot operations.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A projection checkpoint: entity state as of `last_sequence`. Snapshots
/// are purely an acceleration; replay from sequence 1 must produce the same
/// state, and a missing or stale snapshot only costs replay time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub entity_type: String,
    pub entity_id: String,
    pub last_sequence: u64,
    pub state: serde_json::Value,
    pub saved_at: DateTime<Utc>,
}

/// Persistence seam for snapshots. The store treats this as optional: when
/// absent, every load is a full replay.
pub trait SnapshotStore: Send + Sync {
    fn save(&self, record: &SnapshotRecord) -> Result<(), SnapshotError>;

    /// The snapshot with the highest covered sequence for a stream, if any.
    fn load_latest(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Option<SnapshotRecord>, SnapshotError>;
}

/// Filesystem snapshot store: one directory per stream under
/// `root/<entity_type>/<entity_id>/`, holding `state_<sequence>.json`
/// files written with atomic rename.
pub struct FsSnapshotStore {
    root: PathBuf,
}

impl FsSnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn stream_dir(&self, entity_type: &str, entity_id: &str) -> PathBuf {
        self.root.join(fs_name(entity_type)).join(fs_name(entity_id))
    }
}

impl SnapshotStore for FsSnapshotStore {
    fn save(&self, record: &SnapshotRecord) -> Result<(), SnapshotError> {
        let dir = self.stream_dir(&record.entity_type, &record.entity_id);
        fs::create_dir_all(&dir)?;

        let tmp_path = dir.join(format!("state_{}.tmp", record.last_sequence));
        let final_path = dir.join(format!("state_{}.json", record.last_sequence));

        let json = serde_json::to_string_pretty(record)?;

        let mut file = File::create(&tmp_path)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp_path, &final_path)?;
        sync_parent(&final_path);

        Ok(())
    }

    fn load_latest(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Option<SnapshotRecord>, SnapshotError> {
        let dir = self.stream_dir(entity_type, entity_id);
        if !dir.exists() {
            return Ok(None);
        }

        let mut best: Option<(u64, PathBuf)> = None;

        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name_str = name.to_string_lossy();

            // Match pattern: state_<sequence>.json
            if let Some(rest) = name_str.strip_prefix("state_")
                && let Some(seq_str) = rest.strip_suffix(".json")
                && let Ok(sequence) = seq_str.parse::<u64>()
            {
                match &best {
                    Some((current_best, _)) if sequence <= *current_best => {}
                    _ => best = Some((sequence, entry.path())),
                }
            }
        }

        match best {
            Some((_, path)) => {
                let contents = fs::read_to_string(&path)?;
                let record: SnapshotRecord = serde_json::from_str(&contents)?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }
}
